use serde::{Deserialize, Serialize};
use serde_json::Value;
use snafu::ResultExt;

use crate::link::{EncodePayloadSnafu, TransportResult};

/// Inbound event kind signaling one delivered chat message.
pub const EVENT_MESSAGE: &str = "message";
/// Outbound event kind carrying one send request.
pub const EVENT_SEND: &str = "send";

/// Message content kind as spelled on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PayloadKind {
    PlainText,
}

/// Payload of an inbound `message` frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessagePayload {
    pub id: u64,
    pub from: u64,
    pub to: u64,
    pub kind: PayloadKind,
    pub content: String,
}

/// Payload of an outbound `send` frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendPayload {
    pub to: u64,
    pub kind: PayloadKind,
    pub content: String,
}

/// One event on the bidirectional channel: a kind tag plus an opaque payload.
///
/// Payloads stay opaque JSON at this layer so an undecodable payload is
/// representable, and droppable by the consumer, instead of poisoning the
/// whole stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Frame {
    pub event: String,
    pub payload: Value,
}

impl Frame {
    pub fn new(event: impl Into<String>, payload: Value) -> Self {
        Self {
            event: event.into(),
            payload,
        }
    }

    /// Encodes a send request into an outbound frame.
    pub fn encode_send(payload: &SendPayload) -> TransportResult<Self> {
        let payload = serde_json::to_value(payload).context(EncodePayloadSnafu {
            stage: "encode-send-payload",
        })?;
        Ok(Self::new(EVENT_SEND, payload))
    }

    /// Encodes a delivered message into an inbound frame.
    pub fn encode_message(payload: &MessagePayload) -> TransportResult<Self> {
        let payload = serde_json::to_value(payload).context(EncodePayloadSnafu {
            stage: "encode-message-payload",
        })?;
        Ok(Self::new(EVENT_MESSAGE, payload))
    }
}
