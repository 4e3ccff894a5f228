//! Long-poll wire contract for the event-queue capability.

use {
    serde::{Deserialize, Serialize},
    serde_json::Value,
};

use crate::ProtocolError;

/// One event as delivered to the viewer: a message name plus a structured
/// body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueuedEvent {
    pub message: String,
    pub body: Value,
}

impl QueuedEvent {
    pub fn new(message: impl Into<String>, body: Value) -> Self {
        Self {
            message: message.into(),
            body,
        }
    }
}

/// Decoded body of an inbound long-poll request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PollRequest {
    /// Id of the last response the viewer saw (0 on the first round).
    pub ack: i64,
    /// True when the viewer is closing the channel for good.
    pub done: bool,
}

impl PollRequest {
    /// Decode from the structured map the capability carries. A missing or
    /// non-map body is a protocol violation and closes the channel.
    pub fn from_value(v: &Value) -> Result<Self, ProtocolError> {
        let map = v.as_object().ok_or(ProtocolError::MalformedPollBody)?;
        Ok(Self {
            ack: map.get("ack").and_then(Value::as_i64).unwrap_or(0),
            done: map.get("done").and_then(Value::as_bool).unwrap_or(false),
        })
    }
}

/// Body of a long-poll response: the ordered batch and this response's
/// sequence id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PollResponse {
    pub events: Vec<QueuedEvent>,
    pub id: i64,
}

impl PollResponse {
    pub fn to_value(&self) -> Value {
        serde_json::json!({
            "events": self.events.iter().map(|e| serde_json::json!({
                "message": e.message,
                "body": e.body,
            })).collect::<Vec<_>>(),
            "id": self.id,
        })
    }
}
