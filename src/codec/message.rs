use std::fmt;
use std::str::FromStr;

use chrono::Utc;
use serde::{Deserialize, Serialize};

/// The closed set of message kinds a chat room exchanges.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum MessageKind {
    Join,
    Chat,
    Leave,
}

impl MessageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageKind::Join => "JOIN",
            MessageKind::Chat => "CHAT",
            MessageKind::Leave => "LEAVE",
        }
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MessageKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "JOIN" => Ok(MessageKind::Join),
            "CHAT" => Ok(MessageKind::Chat),
            "LEAVE" => Ok(MessageKind::Leave),
            other => Err(other.to_string()),
        }
    }
}

/// Represents one application message exchanged over a topic.
///
/// This structure is used for serialization to and from JSON for
/// communication over the transport.
///
/// # Fields
///
/// - `sender` - Identifier of whoever sent the message.
/// - `content` - Free text.
/// - `timestamp` - Milliseconds since the Unix epoch.
/// - `kind` - One of `JOIN`, `CHAT` or `LEAVE`. Older peers call this
///   field `messageType`, which is accepted on input.
///
/// # Example
///
/// ```rust
/// use popstomp::codec::{ChatMessage, MessageKind};
///
/// let msg = ChatMessage {
///     sender: "Joe".to_string(),
///     content: "hi".to_string(),
///     timestamp: 1_700_000_000_000,
///     kind: MessageKind::Chat,
/// };
/// assert_eq!(msg.kind.as_str(), "CHAT");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub sender: String,
    pub content: String,
    pub timestamp: i64,
    #[serde(alias = "messageType")]
    pub kind: MessageKind,
}

impl ChatMessage {
    /// Builds a message stamped with the current wall-clock time.
    pub fn new(sender: impl Into<String>, content: impl Into<String>, kind: MessageKind) -> Self {
        Self {
            sender: sender.into(),
            content: content.into(),
            timestamp: Utc::now().timestamp_millis(),
            kind,
        }
    }

    pub fn chat(sender: impl Into<String>, content: impl Into<String>) -> Self {
        Self::new(sender, content, MessageKind::Chat)
    }
}
