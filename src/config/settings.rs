use std::time::Duration;

use serde::Deserialize;

use crate::client::ConnectionOptions;
use crate::transport::{Heartbeat, StompConfig};

/// Top-level configuration settings for a `popstomp` connection.
///
/// Includes settings for the connection itself and for logging.
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct Settings {
    pub connection: ConnectionSettings,
    pub logging: LoggingSettings,
}

/// Configuration settings for the connection.
///
/// Defines where to connect, what to subscribe to, where to publish, and
/// the reconnect and heartbeat timings.
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct ConnectionSettings {
    pub url: String,
    pub topics: Vec<String>,
    pub send_destination: String,
    pub reconnect_delay_ms: u64,
    pub heartbeat_outgoing_ms: u64,
    pub heartbeat_incoming_ms: u64,
    pub connect_timeout_ms: u64,
    pub auto_connect: bool,
}

/// Configuration settings for logging.
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct LoggingSettings {
    pub level: String,
}

/// Partial configuration settings loaded from files or environment.
///
/// Allows partial specification of settings. Missing values can be filled using defaults.
#[derive(Debug, Deserialize, Default)]
pub struct PartialSettings {
    pub connection: Option<PartialConnectionSettings>,
    pub logging: Option<PartialLoggingSettings>,
}

/// Partial connection settings.
#[derive(Debug, Deserialize, Default)]
pub struct PartialConnectionSettings {
    pub url: Option<String>,
    pub topics: Option<Vec<String>>,
    pub send_destination: Option<String>,
    pub reconnect_delay_ms: Option<u64>,
    pub heartbeat_outgoing_ms: Option<u64>,
    pub heartbeat_incoming_ms: Option<u64>,
    pub connect_timeout_ms: Option<u64>,
    pub auto_connect: Option<bool>,
}

/// Partial logging settings.
#[derive(Debug, Deserialize, Default)]
pub struct PartialLoggingSettings {
    pub level: Option<String>,
}

/// Provides default values for `Settings`.
///
/// Matches a local chat server: SockJS-style `http` endpoint, the public
/// broadcast topic and a five second reconnect delay.
impl Default for Settings {
    fn default() -> Self {
        Self {
            connection: ConnectionSettings {
                url: "http://localhost:8080/ws".to_string(),
                topics: vec!["/topic/public".to_string()],
                send_destination: "/app/chat.send".to_string(),
                reconnect_delay_ms: 5000,
                heartbeat_outgoing_ms: 10_000,
                heartbeat_incoming_ms: 10_000,
                connect_timeout_ms: 10_000,
                auto_connect: true,
            },
            logging: LoggingSettings {
                level: "info".to_string(),
            },
        }
    }
}

impl Settings {
    /// Fills every value missing from `partial` with its default.
    pub fn merge(partial: PartialSettings) -> Self {
        let default = Settings::default();
        let connection = partial.connection.unwrap_or_default();
        let logging = partial.logging.unwrap_or_default();

        Settings {
            connection: ConnectionSettings {
                url: connection.url.unwrap_or(default.connection.url),
                topics: connection.topics.unwrap_or(default.connection.topics),
                send_destination: connection
                    .send_destination
                    .unwrap_or(default.connection.send_destination),
                reconnect_delay_ms: connection
                    .reconnect_delay_ms
                    .unwrap_or(default.connection.reconnect_delay_ms),
                heartbeat_outgoing_ms: connection
                    .heartbeat_outgoing_ms
                    .unwrap_or(default.connection.heartbeat_outgoing_ms),
                heartbeat_incoming_ms: connection
                    .heartbeat_incoming_ms
                    .unwrap_or(default.connection.heartbeat_incoming_ms),
                connect_timeout_ms: connection
                    .connect_timeout_ms
                    .unwrap_or(default.connection.connect_timeout_ms),
                auto_connect: connection
                    .auto_connect
                    .unwrap_or(default.connection.auto_connect),
            },
            logging: LoggingSettings {
                level: logging.level.unwrap_or(default.logging.level),
            },
        }
    }
}

impl ConnectionSettings {
    pub fn connection_options(&self) -> ConnectionOptions {
        ConnectionOptions {
            reconnect_delay: Duration::from_millis(self.reconnect_delay_ms),
            send_destination: self.send_destination.clone(),
        }
    }

    pub fn stomp_config(&self) -> StompConfig {
        StompConfig {
            heartbeat: Heartbeat {
                outgoing: Duration::from_millis(self.heartbeat_outgoing_ms),
                incoming: Duration::from_millis(self.heartbeat_incoming_ms),
            },
            connect_timeout: Duration::from_millis(self.connect_timeout_ms),
        }
    }
}
