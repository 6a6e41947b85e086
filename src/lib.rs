//! # PopStomp
//!
//! `popstomp` is a connection manager for topic-based publish/subscribe
//! messaging over a single persistent STOMP-over-WebSocket connection.
//! Calling code gets a small surface (connect, subscribe, publish,
//! disconnect) while reconnection, subscription bookkeeping and message
//! (de)serialization happen underneath.
//!
//! ## Core Modules
//!
//! The library is structured into several modules, each with a distinct responsibility:
//!
//! - `codec`: Encodes and validates the JSON chat messages carried in frame bodies.
//! - `registry`: Tracks topics of interest and their handlers, and replays them after every reconnect.
//! - `client`: The connection manager: state machine, reconnect policy and event handling.
//! - `lifecycle`: Binds a connection to a scope so it is always closed on exit.
//! - `transport`: The transport seam and its STOMP 1.2 over WebSocket implementation.
//! - `config`: Handles loading and managing connection configuration.
//! - `utils`: Contains shared utilities, such as error types and logging.
//!
//! ## Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use popstomp::client::ConnectionManager;
//! use popstomp::codec::ChatMessage;
//! use popstomp::config::load_config;
//! use popstomp::lifecycle::{ConnectionParams, ConnectionScope};
//! use popstomp::transport::StompConnector;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let settings = load_config()?;
//! popstomp::utils::logging::init(&settings.logging.level);
//!
//! let connection = &settings.connection;
//! let manager = ConnectionManager::new(
//!     StompConnector::new(connection.stomp_config()),
//!     connection.connection_options(),
//! );
//! let params = ConnectionParams::new(
//!     connection.url.clone(),
//!     connection.topics.clone(),
//!     Arc::new(|msg: ChatMessage| println!("{}: {}", msg.sender, msg.content)),
//! );
//!
//! let mut scope = ConnectionScope::enter(manager, params, connection.auto_connect);
//! scope.run_until(tokio::time::sleep(std::time::Duration::from_secs(1))).await;
//! scope.send_message(&ChatMessage::chat("Joe", "hello"));
//! scope.run_until(tokio::signal::ctrl_c()).await?;
//! scope.exit();
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod codec;
pub mod config;
pub mod lifecycle;
pub mod registry;
pub mod transport;
pub mod utils;
