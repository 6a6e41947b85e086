//! The `client` module holds the connection manager: the one component with
//! real state in `popstomp`.
//!
//! A [`ConnectionManager`] owns a transport session, the reconnect timer and
//! the subscription registry. All of its state changes happen inside its own
//! methods, on the task that owns it; transport callbacks reach it as events
//! that the owner pumps with [`ConnectionManager::process_next`].

pub mod manager;
pub mod observer;
pub mod state;

pub use manager::{ConnectionManager, ConnectionOptions};
pub use observer::Observer;
pub use state::ConnectionState;

#[cfg(test)]
mod tests;
