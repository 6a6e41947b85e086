//! The `registry` module keeps the authoritative list of topics a connection
//! is interested in, and which transport handle each one currently has.
//!
//! The transport's own subscription state is disposable: after every
//! (re)connect the registry replays its list from scratch.

pub mod subscription;

pub use subscription::{MessageHandler, Subscription};

use std::collections::{BTreeMap, HashMap};

use tracing::debug;

use crate::codec;
use crate::transport::{SubscriptionHandle, TransportSession};
use crate::utils::error::{DecodeError, TransportError};

/// Outcome of routing one inbound frame.
#[derive(Debug)]
pub enum Dispatch {
    /// Decoded and handed to the topic's handler.
    Delivered { topic: String },
    /// The handle is not (or no longer) ours; the frame was dropped.
    Unrouted,
    /// The payload failed validation; the frame was dropped.
    Rejected { topic: String, error: DecodeError },
}

/// Topic-to-handler bindings plus the handles of the live session.
#[derive(Debug, Default)]
pub struct SubscriptionRegistry {
    subscriptions: BTreeMap<String, Subscription>,
    routes: HashMap<SubscriptionHandle, String>,
}

impl SubscriptionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces the handler for `topic`.
    ///
    /// With a live transport, a topic without a handle is subscribed right
    /// away. A topic that already has a handle keeps it; only the handler
    /// changes.
    pub fn register(
        &mut self,
        topic: &str,
        handler: MessageHandler,
        transport: Option<&mut dyn TransportSession>,
    ) -> Result<(), TransportError> {
        let entry = self
            .subscriptions
            .entry(topic.to_string())
            .and_modify(|s| s.handler = handler.clone())
            .or_insert_with(|| Subscription::new(topic, handler));

        if let Some(transport) = transport {
            if entry.handle.is_none() {
                let handle = transport.subscribe(topic)?;
                debug!("subscribed to {} as {}", topic, handle);
                self.routes.insert(handle.clone(), topic.to_string());
                entry.handle = Some(handle);
            }
        }
        Ok(())
    }

    /// Removes `topic`, unsubscribing its handle if it has one.
    pub fn unregister(
        &mut self,
        topic: &str,
        transport: Option<&mut dyn TransportSession>,
    ) -> Result<(), TransportError> {
        let Some(subscription) = self.subscriptions.remove(topic) else {
            return Ok(());
        };
        if let Some(handle) = subscription.handle {
            self.routes.remove(&handle);
            if let Some(transport) = transport {
                transport.unsubscribe(&handle)?;
                debug!("unsubscribed from {}", topic);
            }
        }
        Ok(())
    }

    /// Subscribes every registered topic on a freshly connected transport.
    ///
    /// Previous handles are discarded first. Topics whose subscribe failed
    /// are returned with their error and stay inactive.
    pub fn resubscribe_all(
        &mut self,
        transport: &mut dyn TransportSession,
    ) -> Vec<(String, TransportError)> {
        self.routes.clear();
        let mut failures = Vec::new();
        for (topic, subscription) in self.subscriptions.iter_mut() {
            subscription.handle = None;
            match transport.subscribe(topic) {
                Ok(handle) => {
                    self.routes.insert(handle.clone(), topic.clone());
                    subscription.handle = Some(handle);
                }
                Err(e) => failures.push((topic.clone(), e)),
            }
        }
        debug!(
            "resubscribed {} of {} topic(s)",
            self.routes.len(),
            self.subscriptions.len()
        );
        failures
    }

    /// Drops every handle, unsubscribing best-effort when a transport is
    /// given. The topic list itself is kept.
    pub fn clear(&mut self, mut transport: Option<&mut dyn TransportSession>) {
        for subscription in self.subscriptions.values_mut() {
            if let Some(handle) = subscription.handle.take() {
                if let Some(transport) = transport.as_deref_mut() {
                    // the transport may already be gone
                    let _ = transport.unsubscribe(&handle);
                }
            }
        }
        self.routes.clear();
    }

    /// Decodes `body` and hands it to the handler registered for the topic
    /// behind `handle`.
    pub fn dispatch(&self, handle: &SubscriptionHandle, body: &str) -> Dispatch {
        let Some(subscription) = self
            .routes
            .get(handle)
            .and_then(|topic| self.subscriptions.get(topic))
        else {
            return Dispatch::Unrouted;
        };
        match codec::decode(body) {
            Ok(message) => {
                (subscription.handler)(message);
                Dispatch::Delivered {
                    topic: subscription.topic.clone(),
                }
            }
            Err(error) => Dispatch::Rejected {
                topic: subscription.topic.clone(),
                error,
            },
        }
    }

    pub fn contains(&self, topic: &str) -> bool {
        self.subscriptions.contains_key(topic)
    }

    pub fn get(&self, topic: &str) -> Option<&Subscription> {
        self.subscriptions.get(topic)
    }

    /// Every registered topic, in order.
    pub fn topics(&self) -> Vec<String> {
        self.subscriptions.keys().cloned().collect()
    }

    /// Topics that currently hold a transport handle.
    pub fn active_topics(&self) -> Vec<String> {
        self.subscriptions
            .values()
            .filter(|s| s.is_active())
            .map(|s| s.topic.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.subscriptions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.subscriptions.is_empty()
    }
}
