//! Error types for message-gate.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::protocol::Action;

/// Main error type for all gate operations.
#[derive(Debug, Error)]
pub enum GateError {
    /// I/O error on a byte-stream transport.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Payload serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// MsgPack serialization error (byte-stream frames).
    #[error("MsgPack encode error: {0}")]
    MsgPackEncode(#[from] rmp_serde::encode::Error),

    /// MsgPack deserialization error (byte-stream frames).
    #[error("MsgPack decode error: {0}")]
    MsgPackDecode(#[from] rmp_serde::decode::Error),

    /// Malformed envelope or frame.
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// The remote handler failed; carries the value it reported.
    #[error("Remote handler failed: {0}")]
    Remote(RemoteError),

    /// The peer has no handler registered for the requested action.
    #[error("No handler for action {0}")]
    UnhandledAction(Action),

    /// The gate, its port or the bootstrap scope is closed.
    #[error("Channel closed")]
    ChannelClosed,

    /// A request or handshake did not complete in time.
    #[error("Timed out")]
    Timeout,

    /// The transport cannot move this kind of resource.
    #[error("Transfer unsupported: {0}")]
    TransferUnsupported(&'static str),
}

/// Result type alias using GateError.
pub type Result<T> = std::result::Result<T, GateError>;

/// Category of a [`RemoteError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum RemoteErrorKind {
    /// The handler returned an error.
    #[default]
    Handler,
    /// The handler panicked.
    Panicked,
    /// The request payload did not match the handler's input type.
    InvalidPayload,
    /// No handler was registered for the action.
    UnhandledAction,
}

/// Failure value carried in `meta.error` of an answer envelope.
///
/// Handlers return it as their error type; callers receive it inside
/// [`GateError::Remote`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Error)]
#[error("{message}")]
pub struct RemoteError {
    /// What went wrong on the remote side.
    #[serde(default)]
    pub kind: RemoteErrorKind,
    /// Human readable message.
    pub message: String,
    /// Optional structured details.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

impl RemoteError {
    /// Create a handler error with a message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            kind: RemoteErrorKind::Handler,
            message: message.into(),
            details: None,
        }
    }

    /// Create an error of a specific kind.
    pub fn with_kind(kind: RemoteErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            details: None,
        }
    }

    /// Attach structured details.
    pub fn details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }
}

impl From<&str> for RemoteError {
    fn from(message: &str) -> Self {
        Self::new(message)
    }
}

impl From<String> for RemoteError {
    fn from(message: String) -> Self {
        Self::new(message)
    }
}

impl From<serde_json::Error> for RemoteError {
    fn from(err: serde_json::Error) -> Self {
        Self::new(err.to_string())
    }
}

impl From<GateError> for RemoteError {
    fn from(err: GateError) -> Self {
        match err {
            GateError::Remote(remote) => remote,
            other => Self::new(other.to_string()),
        }
    }
}
