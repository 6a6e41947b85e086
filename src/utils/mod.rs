//! The `utils` module provides the pieces shared by every other module of
//! `popstomp`: the error taxonomy reported to observers and the logging
//! bootstrap.

pub mod error;
pub mod logging;
