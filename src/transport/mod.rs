//! The `transport` module is the seam between the connection manager and
//! the wire.
//!
//! A [`Connector`] opens one [`TransportSession`] per connection attempt.
//! The session is callback driven: everything it learns (connected, failed,
//! an inbound frame, a protocol error) is pushed through the [`EventSink`] it
//! was opened with. The sink stamps each event with the [`SessionToken`] of
//! the attempt, which lets the manager drop callbacks from superseded
//! sessions.
//!
//! [`websocket`] implements the seam with STOMP 1.2 over `tokio-tungstenite`.

pub mod frame;
pub mod websocket;

#[cfg(test)]
pub(crate) mod mock;

use std::fmt;
use std::time::Duration;

use tokio::sync::mpsc::UnboundedSender;

use crate::utils::error::{ProtocolError, TransportError};

pub use frame::Frame;
pub use websocket::{StompConfig, StompConnector, StompSession};

/// Identifies one transport attempt within one explicit connect.
///
/// `generation` changes only on an explicit `connect`/`disconnect`;
/// `attempt` changes every time a transport instance is opened, including
/// automatic retries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct SessionToken {
    pub generation: u64,
    pub attempt: u64,
}

/// Opaque transport-side subscription id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionHandle(String);

impl SubscriptionHandle {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SubscriptionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// What happened, as reported by a transport session or the retry timer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventKind {
    /// Protocol handshake completed.
    Connected,
    /// The transport failed or closed; the session is dead.
    Failed(TransportError),
    /// The peer sent something invalid; the session may still be alive.
    Protocol(ProtocolError),
    /// An application frame delivered for a subscription.
    Message {
        subscription: SubscriptionHandle,
        body: String,
    },
    /// The reconnect delay elapsed.
    RetryElapsed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    pub token: SessionToken,
    pub kind: EventKind,
}

/// Callback handle a session uses to report back to its manager.
///
/// Sending never blocks. Once the manager is gone every send is a silent
/// no-op, which is what a torn-down session wants.
#[derive(Debug, Clone)]
pub struct EventSink {
    token: SessionToken,
    tx: UnboundedSender<Event>,
}

impl EventSink {
    pub(crate) fn new(token: SessionToken, tx: UnboundedSender<Event>) -> Self {
        Self { token, tx }
    }

    pub fn token(&self) -> SessionToken {
        self.token
    }

    pub fn connected(&self) {
        self.emit(EventKind::Connected);
    }

    pub fn failed(&self, error: TransportError) {
        self.emit(EventKind::Failed(error));
    }

    pub fn protocol_error(&self, error: ProtocolError) {
        self.emit(EventKind::Protocol(error));
    }

    pub fn message(&self, subscription: SubscriptionHandle, body: impl Into<String>) {
        self.emit(EventKind::Message {
            subscription,
            body: body.into(),
        });
    }

    pub(crate) fn emit(&self, kind: EventKind) {
        let _ = self.tx.send(Event {
            token: self.token,
            kind,
        });
    }
}

/// Liveness intervals requested from the server. Zero disables a direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Heartbeat {
    pub outgoing: Duration,
    pub incoming: Duration,
}

impl Default for Heartbeat {
    fn default() -> Self {
        Self {
            outgoing: Duration::from_millis(10_000),
            incoming: Duration::from_millis(10_000),
        }
    }
}

/// One live transport instance. Dropping it must release the connection.
pub trait TransportSession: Send {
    /// Issues a subscribe and returns the handle inbound frames will carry.
    fn subscribe(&mut self, destination: &str) -> Result<SubscriptionHandle, TransportError>;

    fn unsubscribe(&mut self, handle: &SubscriptionHandle) -> Result<(), TransportError>;

    fn send(&mut self, destination: &str, body: &str) -> Result<(), TransportError>;

    /// Starts an orderly shutdown. May complete asynchronously.
    fn close(&mut self);
}

/// Factory for transport sessions.
pub trait Connector: Send {
    type Session: TransportSession + 'static;

    /// Starts opening a session to `url`. Returns as soon as the attempt is
    /// underway; the outcome arrives later through `sink`.
    fn open(&mut self, url: &str, sink: EventSink) -> Result<Self::Session, TransportError>;
}
