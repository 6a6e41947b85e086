//! The `lifecycle` module ties a connection to the scope that uses it.
//!
//! A [`ConnectionScope`] is a guard: the connection opens when the scope is
//! entered and is closed exactly once when the scope ends, on every exit
//! path.

pub mod scope;

pub use scope::{ConnectionParams, ConnectionScope};
