use std::fmt;
use std::sync::Arc;

use crate::codec::ChatMessage;
use crate::transport::SubscriptionHandle;

/// Callback invoked with every message decoded for a topic.
pub type MessageHandler = Arc<dyn Fn(ChatMessage) + Send + Sync>;

/// Represents one topic of interest in the registry.
///
/// The topic and handler are authoritative and survive reconnects. The
/// handle belongs to the current transport session only and is dropped
/// whenever that session ends.
#[derive(Clone)]
pub struct Subscription {
    pub topic: String,
    pub handler: MessageHandler,
    pub handle: Option<SubscriptionHandle>,
}

impl Subscription {
    /// Creates a subscription that is not yet active on any transport.
    pub fn new(topic: &str, handler: MessageHandler) -> Self {
        Self {
            topic: topic.to_string(),
            handler,
            handle: None,
        }
    }

    pub fn is_active(&self) -> bool {
        self.handle.is_some()
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("topic", &self.topic)
            .field("handler", &"Fn(ChatMessage)")
            .field("handle", &self.handle)
            .finish()
    }
}
