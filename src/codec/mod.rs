//! The `codec` module converts between [`ChatMessage`] values and the JSON
//! text carried in a frame body.
//!
//! Decoding is strict about the four required fields and lenient about
//! anything else: unknown extra fields are ignored, and the legacy
//! `messageType` name is accepted in place of `kind`.

pub mod message;

pub use message::{ChatMessage, MessageKind};

use serde_json::Value;

use crate::utils::error::{DecodeError, UsageError};

const KIND_FIELDS: [&str; 2] = ["kind", "messageType"];

/// Serializes a message into the wire representation.
pub fn encode(message: &ChatMessage) -> Result<String, UsageError> {
    serde_json::to_string(message).map_err(|e| UsageError::Encode(e.to_string()))
}

/// Parses a frame body into a message, validating its shape.
pub fn decode(frame: &str) -> Result<ChatMessage, DecodeError> {
    let value: Value = serde_json::from_str(frame).map_err(DecodeError::Syntax)?;
    let Value::Object(fields) = &value else {
        return Err(DecodeError::NotAnObject);
    };

    // A string kind outside the closed set gets its own error; any other
    // problem with the field is a shape error reported by serde below.
    for name in KIND_FIELDS {
        if let Some(Value::String(kind)) = fields.get(name) {
            if kind.parse::<MessageKind>().is_err() {
                return Err(DecodeError::UnknownKind(kind.clone()));
            }
        }
    }

    serde_json::from_value(value).map_err(DecodeError::Shape)
}
