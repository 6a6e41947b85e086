//! The `error` module defines the error taxonomy used within `popstomp`.
//!
//! None of these errors are returned from `connect`, `publish` or
//! `disconnect`. They are delivered to the connection's observer and logged,
//! so transient network conditions cannot crash the calling scope.

use thiserror::Error;

use crate::client::ConnectionState;

/// Socket or network level failure. Recovered by reconnecting.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("invalid endpoint url '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("endpoint unreachable: {0}")]
    Unreachable(String),

    #[error("connection closed: {0}")]
    Closed(String),

    #[error("socket error: {0}")]
    Socket(String),

    #[error("no data from server for {0} ms")]
    HeartbeatTimeout(u64),

    #[error("no CONNECTED reply within {0} ms")]
    HandshakeTimeout(u64),
}

impl TransportError {
    pub fn closed(reason: impl Into<String>) -> Self {
        Self::Closed(reason.into())
    }

    pub fn socket(reason: impl Into<String>) -> Self {
        Self::Socket(reason.into())
    }
}

impl From<tungstenite::Error> for TransportError {
    fn from(err: tungstenite::Error) -> Self {
        match err {
            tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed => {
                Self::Closed(err.to_string())
            }
            other => Self::Socket(other.to_string()),
        }
    }
}

/// Malformed or rejected control-level frame from the peer.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// The server answered with an `ERROR` frame.
    #[error("server error: {message}")]
    ServerError {
        message: String,
        details: Option<String>,
    },

    #[error("malformed frame: {0}")]
    MalformedFrame(String),

    #[error("unexpected {command} frame")]
    UnexpectedFrame { command: String },
}

/// An inbound application payload failed validation.
#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("payload is not valid JSON: {0}")]
    Syntax(#[source] serde_json::Error),

    #[error("payload is not a JSON object")]
    NotAnObject,

    #[error("unknown message kind '{0}'")]
    UnknownKind(String),

    /// A required field is missing or carries the wrong type.
    #[error("invalid message shape: {0}")]
    Shape(#[source] serde_json::Error),
}

/// The caller asked for something the connection cannot do right now.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum UsageError {
    #[error("cannot publish to '{destination}' while {state}")]
    NotConnected {
        destination: String,
        state: ConnectionState,
    },

    #[error("failed to encode outbound message: {0}")]
    Encode(String),
}

/// Everything an observer can be told about.
#[derive(Error, Debug)]
pub enum ClientError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error("dropped message on '{topic}': {source}")]
    Decode {
        topic: String,
        #[source]
        source: DecodeError,
    },

    #[error(transparent)]
    Usage(#[from] UsageError),
}
