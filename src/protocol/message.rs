//! Typed view of an envelope.
//!
//! [`Message`] is what the dispatch loop works with. Converting an
//! [`Envelope`] into a `Message` checks that the fields its kind requires
//! are present, so the gate never has to deal with half-formed envelopes.

use serde_json::Value;

use super::envelope::{Action, Envelope, MessageType};
use crate::error::{GateError, RemoteError, Result};

/// Validated message, one variant per envelope kind.
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    /// Fire-and-forget.
    Send { action: Action, data: Value },
    /// Correlated request.
    Post { id: u64, action: Action, data: Value },
    /// Correlated request whose answer moves resources back.
    GetTransfer { id: u64, action: Action, data: Value },
    /// Answer to request `id`.
    Answer {
        id: u64,
        outcome: std::result::Result<Value, RemoteError>,
    },
    /// Peer is closing.
    Close,
}

impl Message {
    /// Envelope kind of this message.
    pub fn kind(&self) -> MessageType {
        match self {
            Message::Send { .. } => MessageType::Send,
            Message::Post { .. } => MessageType::Post,
            Message::GetTransfer { .. } => MessageType::GetTransfer,
            Message::Answer { .. } => MessageType::PostAnswer,
            Message::Close => MessageType::Close,
        }
    }
}

impl From<Message> for Envelope {
    fn from(message: Message) -> Self {
        match message {
            Message::Send { action, data } => Envelope::send(action, data),
            Message::Post { id, action, data } => Envelope::post(id, action, data),
            Message::GetTransfer { id, action, data } => Envelope::get_transfer(id, action, data),
            Message::Answer { id, outcome } => match outcome {
                Ok(data) => Envelope::answer(id, data),
                Err(error) => Envelope::failure(id, error),
            },
            Message::Close => Envelope::close(),
        }
    }
}

impl TryFrom<Envelope> for Message {
    type Error = GateError;

    fn try_from(envelope: Envelope) -> Result<Self> {
        let Envelope { meta, data } = envelope;
        let kind = meta.kind;

        let action = || {
            meta.action
                .clone()
                .ok_or_else(|| GateError::Protocol(format!("{:?} envelope without action", kind)))
        };
        let id = match meta.id {
            Some(id) => id,
            None if kind.is_correlated() => {
                return Err(GateError::Protocol(format!("{:?} envelope without id", kind)))
            }
            None => 0,
        };

        let message = match kind {
            MessageType::Close => Message::Close,
            MessageType::Send => Message::Send {
                action: action()?,
                data,
            },
            MessageType::Post => Message::Post {
                id,
                action: action()?,
                data,
            },
            MessageType::GetTransfer => Message::GetTransfer {
                id,
                action: action()?,
                data,
            },
            MessageType::PostAnswer => {
                let outcome = match meta.error {
                    Some(error) => Err(error),
                    None => Ok(data),
                };
                Message::Answer { id, outcome }
            }
            MessageType::Reserved => {
                return Err(GateError::Protocol(
                    "reserved message type 0 is not used".to_string(),
                ))
            }
        };

        Ok(message)
    }
}
