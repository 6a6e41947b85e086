use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, trace, warn};

use crate::client::{ConnectionState, Observer};
use crate::codec::{self, ChatMessage};
use crate::registry::{Dispatch, MessageHandler, SubscriptionRegistry};
use crate::transport::{
    Connector, Event, EventKind, EventSink, SessionToken, TransportSession,
};
use crate::utils::error::{ClientError, UsageError};

pub const DEFAULT_SEND_DESTINATION: &str = "/app/chat.send";
pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_millis(5000);

/// Tunables for a connection manager.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionOptions {
    /// Fixed wait between a failure and the next connection attempt.
    pub reconnect_delay: Duration,
    /// Destination used by [`ConnectionManager::send_message`].
    pub send_destination: String,
}

impl Default for ConnectionOptions {
    fn default() -> Self {
        Self {
            reconnect_delay: DEFAULT_RECONNECT_DELAY,
            send_destination: DEFAULT_SEND_DESTINATION.to_string(),
        }
    }
}

/// Owns one transport connection, its reconnect policy and its
/// subscriptions.
///
/// Nothing here returns an error to the caller. Transport, protocol, decode
/// and usage failures are logged and handed to the optional [`Observer`].
///
/// Every callback from the transport or the retry timer carries the
/// [`SessionToken`] that was current when it was scheduled. `connect` and
/// `disconnect` bump the generation, and every newly opened transport bumps
/// the attempt, so anything still in flight from an older session is
/// ignored when it arrives.
pub struct ConnectionManager<C: Connector> {
    connector: C,
    options: ConnectionOptions,
    observer: Option<Arc<dyn Observer>>,
    state: ConnectionState,
    url: Option<String>,
    token: SessionToken,
    session: Option<C::Session>,
    registry: SubscriptionRegistry,
    // topics bound by the last `connect`, as opposed to `subscribe`
    connect_topics: Vec<String>,
    retry_timer: Option<JoinHandle<()>>,
    events_tx: UnboundedSender<Event>,
    events_rx: UnboundedReceiver<Event>,
}

impl<C: Connector> ConnectionManager<C> {
    pub fn new(connector: C, options: ConnectionOptions) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        Self {
            connector,
            options,
            observer: None,
            state: ConnectionState::Idle,
            url: None,
            token: SessionToken::default(),
            session: None,
            registry: SubscriptionRegistry::new(),
            connect_topics: Vec::new(),
            retry_timer: None,
            events_tx,
            events_rx,
        }
    }

    pub fn with_observer(mut self, observer: Arc<dyn Observer>) -> Self {
        self.observer = Some(observer);
        self
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn is_connected(&self) -> bool {
        self.state == ConnectionState::Connected
    }

    pub fn generation(&self) -> u64 {
        self.token.generation
    }

    pub fn token(&self) -> SessionToken {
        self.token
    }

    pub fn url(&self) -> Option<&str> {
        self.url.as_deref()
    }

    pub fn options(&self) -> &ConnectionOptions {
        &self.options
    }

    pub fn registry(&self) -> &SubscriptionRegistry {
        &self.registry
    }

    /// Topics holding a subscription on the live transport.
    pub fn active_topics(&self) -> Vec<String> {
        self.registry.active_topics()
    }

    /// Opens a connection to `url` and subscribes `topics` with `handler`
    /// once it is up.
    ///
    /// `topics` replaces the set given to any earlier `connect`. Bindings
    /// made through [`subscribe`](Self::subscribe) are kept.
    ///
    /// A no-op while a connection is already being held open; call
    /// [`disconnect`](Self::disconnect) first to change parameters.
    pub fn connect<I, S>(&mut self, url: &str, topics: I, handler: MessageHandler)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        if self.state.is_active() {
            debug!("connect ignored: already {}", self.state);
            return;
        }

        self.token.generation += 1;
        self.url = Some(url.to_string());
        // no transport yet, so these only touch the bindings
        for topic in std::mem::take(&mut self.connect_topics) {
            let _ = self.registry.unregister(&topic, None);
        }
        for topic in topics {
            let topic = topic.as_ref();
            let _ = self.registry.register(topic, handler.clone(), None);
            if !self.connect_topics.iter().any(|t| t == topic) {
                self.connect_topics.push(topic.to_string());
            }
        }
        info!(
            "connecting to {} (generation {})",
            url, self.token.generation
        );
        self.open_transport();
    }

    /// Tears the connection down. Safe to call in any state, any number of
    /// times.
    ///
    /// When this returns no handler will be invoked again for the old
    /// session, even if the transport is still shutting down in the
    /// background. Registered topics are kept until the next `connect`
    /// replaces them.
    pub fn disconnect(&mut self) {
        self.token.generation += 1;
        self.cancel_retry();
        match self.session.take() {
            Some(mut session) => {
                self.registry.clear(Some(&mut session));
                session.close();
            }
            None => self.registry.clear(None),
        }
        if self.state != ConnectionState::Closed {
            info!("disconnected (generation {})", self.token.generation);
        }
        self.transition(ConnectionState::Closed);
    }

    /// Encodes `message` and sends it to `destination`.
    ///
    /// Only works while connected. Otherwise the message is dropped and a
    /// [`UsageError`] is reported; nothing is queued for later.
    pub fn publish(&mut self, destination: &str, message: &ChatMessage) {
        if self.state != ConnectionState::Connected || self.session.is_none() {
            self.report(ClientError::Usage(UsageError::NotConnected {
                destination: destination.to_string(),
                state: self.state,
            }));
            return;
        }

        let body = match codec::encode(message) {
            Ok(body) => body,
            Err(e) => {
                self.report(e.into());
                return;
            }
        };

        let sent = match self.session.as_mut() {
            Some(session) => session.send(destination, &body),
            None => return,
        };
        match sent {
            Ok(()) => debug!("published to {}", destination),
            Err(e) => self.report(e.into()),
        }
    }

    /// Publishes to the configured send destination.
    pub fn send_message(&mut self, message: &ChatMessage) {
        let destination = self.options.send_destination.clone();
        self.publish(&destination, message);
    }

    /// Adds or replaces a topic binding. Subscribes immediately when
    /// connected, otherwise on the next successful connect.
    pub fn subscribe(&mut self, topic: &str, handler: MessageHandler) {
        self.connect_topics.retain(|t| t != topic);
        let transport = match self.state {
            ConnectionState::Connected => self
                .session
                .as_mut()
                .map(|s| s as &mut dyn TransportSession),
            _ => None,
        };
        if let Err(e) = self.registry.register(topic, handler, transport) {
            self.report(e.into());
        }
    }

    /// Removes a topic binding, unsubscribing it if it is live.
    pub fn unsubscribe(&mut self, topic: &str) {
        self.connect_topics.retain(|t| t != topic);
        let transport = match self.state {
            ConnectionState::Connected => self
                .session
                .as_mut()
                .map(|s| s as &mut dyn TransportSession),
            _ => None,
        };
        if let Err(e) = self.registry.unregister(topic, transport) {
            self.report(e.into());
        }
    }

    /// Waits for the next transport or timer event and applies it.
    pub async fn process_next(&mut self) {
        if let Some(event) = self.events_rx.recv().await {
            self.handle_event(event);
        }
    }

    /// Applies every event already queued, without waiting. Returns how many
    /// were taken off the queue, stale ones included.
    pub fn process_pending(&mut self) -> usize {
        let mut processed = 0;
        while let Ok(event) = self.events_rx.try_recv() {
            self.handle_event(event);
            processed += 1;
        }
        processed
    }

    /// Applies one event. Events from a superseded session are dropped.
    pub fn handle_event(&mut self, event: Event) {
        if event.token != self.token {
            trace!(
                "dropping stale event from {:?} (current {:?})",
                event.token, self.token
            );
            return;
        }

        match event.kind {
            EventKind::Connected => {
                if self.state != ConnectionState::Connecting {
                    return;
                }
                self.transition(ConnectionState::Connected);
                let Some(session) = self.session.as_mut() else {
                    return;
                };
                let failures = self.registry.resubscribe_all(session);
                for (topic, e) in failures {
                    warn!("could not subscribe to {}", topic);
                    self.report(e.into());
                }
            }
            EventKind::Failed(e) => {
                if matches!(
                    self.state,
                    ConnectionState::Connecting | ConnectionState::Connected
                ) {
                    self.report(e.into());
                    self.enter_reconnecting();
                }
            }
            EventKind::Protocol(e) => self.report(e.into()),
            EventKind::Message { subscription, body } => {
                if self.state != ConnectionState::Connected {
                    return;
                }
                match self.registry.dispatch(&subscription, &body) {
                    Dispatch::Delivered { topic } => trace!("delivered message on {}", topic),
                    Dispatch::Unrouted => {
                        debug!("dropping frame for unknown subscription {}", subscription)
                    }
                    Dispatch::Rejected { topic, error } => self.report(ClientError::Decode {
                        topic,
                        source: error,
                    }),
                }
            }
            EventKind::RetryElapsed => {
                if self.state == ConnectionState::Reconnecting {
                    self.retry_timer = None;
                    self.open_transport();
                }
            }
        }
    }

    fn open_transport(&mut self) {
        let Some(url) = self.url.clone() else {
            return;
        };
        self.token.attempt += 1;
        self.transition(ConnectionState::Connecting);
        let sink = EventSink::new(self.token, self.events_tx.clone());
        match self.connector.open(&url, sink) {
            Ok(session) => self.session = Some(session),
            Err(e) => {
                self.report(e.into());
                self.transition(ConnectionState::Reconnecting);
                self.schedule_retry();
            }
        }
    }

    fn enter_reconnecting(&mut self) {
        // the dead session's handles mean nothing to the next one
        self.registry.clear(None);
        if let Some(mut session) = self.session.take() {
            session.close();
        }
        self.transition(ConnectionState::Reconnecting);
        self.schedule_retry();
    }

    fn schedule_retry(&mut self) {
        self.cancel_retry();
        let delay = self.options.reconnect_delay;
        let token = self.token;
        let tx = self.events_tx.clone();
        info!("retrying in {} ms", delay.as_millis());
        self.retry_timer = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = tx.send(Event {
                token,
                kind: EventKind::RetryElapsed,
            });
        }));
    }

    fn cancel_retry(&mut self) {
        if let Some(timer) = self.retry_timer.take() {
            timer.abort();
        }
    }

    fn transition(&mut self, to: ConnectionState) {
        let from = self.state;
        if from == to {
            return;
        }
        self.state = to;
        debug!("connection state {} -> {}", from, to);
        if let Some(observer) = &self.observer {
            observer.on_state_change(from, to);
        }
    }

    fn report(&self, error: ClientError) {
        match &error {
            ClientError::Protocol(_) => error!("{}", error),
            _ => warn!("{}", error),
        }
        if let Some(observer) = &self.observer {
            observer.on_error(&error);
        }
    }
}

impl<C: Connector> Drop for ConnectionManager<C> {
    fn drop(&mut self) {
        self.cancel_retry();
    }
}
