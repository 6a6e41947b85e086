use std::fmt;
use std::future::Future;
use std::sync::Arc;

use tracing::debug;

use crate::client::{ConnectionManager, ConnectionState};
use crate::codec::ChatMessage;
use crate::registry::MessageHandler;
use crate::transport::Connector;

/// What a scope connects to.
#[derive(Clone)]
pub struct ConnectionParams {
    pub url: String,
    pub topics: Vec<String>,
    pub handler: MessageHandler,
}

impl ConnectionParams {
    pub fn new<I, S>(url: impl Into<String>, topics: I, handler: MessageHandler) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            url: url.into(),
            topics: topics.into_iter().map(Into::into).collect(),
            handler,
        }
    }

    /// True when switching from `self` to `other` needs a new connection.
    /// Handlers are compared by identity.
    pub fn differs_from(&self, other: &ConnectionParams) -> bool {
        self.url != other.url
            || self.topics != other.topics
            || !Arc::ptr_eq(&self.handler, &other.handler)
    }
}

impl fmt::Debug for ConnectionParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionParams")
            .field("url", &self.url)
            .field("topics", &self.topics)
            .finish_non_exhaustive()
    }
}

/// Binds a [`ConnectionManager`] to the lifetime of a scope.
///
/// Entering connects (unless auto-connect is off). Leaving disconnects
/// exactly once, whichever way the scope ends: [`exit`](Self::exit),
/// dropping the guard, or unwinding out of it. Reconfiguring with new
/// parameters closes the old connection completely before opening the new
/// one.
pub struct ConnectionScope<C: Connector> {
    manager: ConnectionManager<C>,
    params: ConnectionParams,
    closed: bool,
}

impl<C: Connector> ConnectionScope<C> {
    pub fn enter(manager: ConnectionManager<C>, params: ConnectionParams, auto_connect: bool) -> Self {
        let mut scope = Self {
            manager,
            params,
            closed: false,
        };
        if auto_connect {
            scope.connect();
        }
        scope
    }

    /// Connects with the scope's current parameters. A no-op if already
    /// connected or connecting.
    pub fn connect(&mut self) {
        let ConnectionParams {
            url,
            topics,
            handler,
        } = &self.params;
        self.manager.connect(url, topics, handler.clone());
    }

    /// Swaps the connection parameters.
    ///
    /// If anything changed, the current connection is closed in full (its
    /// subscriptions cleared, transport torn down, generation bumped) and
    /// the old topics forgotten before the new connection opens. A scope
    /// that was not connected stays unconnected.
    pub fn reconfigure(&mut self, params: ConnectionParams) {
        if !params.differs_from(&self.params) {
            return;
        }
        let was_active = self.manager.state().is_active();
        debug!("reconfiguring scope: {:?} -> {:?}", self.params, params);

        self.manager.disconnect();
        for topic in &self.params.topics {
            self.manager.unsubscribe(topic);
        }
        self.params = params;

        if was_active {
            self.connect();
        }
    }

    pub fn params(&self) -> &ConnectionParams {
        &self.params
    }

    pub fn manager(&self) -> &ConnectionManager<C> {
        &self.manager
    }

    pub fn state(&self) -> ConnectionState {
        self.manager.state()
    }

    pub fn is_connected(&self) -> bool {
        self.manager.is_connected()
    }

    pub fn publish(&mut self, destination: &str, message: &ChatMessage) {
        self.manager.publish(destination, message);
    }

    pub fn send_message(&mut self, message: &ChatMessage) {
        self.manager.send_message(message);
    }

    pub fn subscribe(&mut self, topic: &str, handler: MessageHandler) {
        self.manager.subscribe(topic, handler);
    }

    pub fn unsubscribe(&mut self, topic: &str) {
        self.manager.unsubscribe(topic);
    }

    pub async fn process_next(&mut self) {
        self.manager.process_next().await;
    }

    pub fn process_pending(&mut self) -> usize {
        self.manager.process_pending()
    }

    /// Pumps connection events until `shutdown` completes.
    pub async fn run_until<F: Future>(&mut self, shutdown: F) -> F::Output {
        tokio::pin!(shutdown);
        loop {
            tokio::select! {
                output = &mut shutdown => return output,
                _ = self.manager.process_next() => {}
            }
        }
    }

    /// Leaves the scope, disconnecting.
    pub fn exit(mut self) {
        self.close();
    }

    fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        self.manager.disconnect();
    }
}

impl<C: Connector> Drop for ConnectionScope<C> {
    fn drop(&mut self) {
        self.close();
    }
}
