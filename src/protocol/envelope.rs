//! Wire envelope: `{ meta: { type, action, id, error }, data }`.
//!
//! Every message exchanged by two gates is one envelope. The `type` field is
//! encoded as a signed integer so that both JSON and MsgPack carry it the
//! same way:
//!
//! ```text
//! Close = -1 | Reserved = 0 | Send = 1 | Post = 2 | PostAnswer = 3 | GetTransfer = 4
//! ```
//!
//! # Example
//!
//! ```
//! use message_gate::protocol::{Envelope, MessageType};
//!
//! let envelope = Envelope::close();
//! let json = serde_json::to_value(&envelope).unwrap();
//! assert_eq!(json["meta"]["type"], -1);
//! assert_eq!(envelope.meta.kind, MessageType::Close);
//! ```

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::RemoteError;

/// Action identifier: a name or an integer code.
///
/// `Action::from("7")` and `Action::from(7i64)` are different actions.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Action {
    /// Integer action code.
    Code(i64),
    /// Named action.
    Name(String),
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Action::Code(code) => write!(f, "#{}", code),
            Action::Name(name) => write!(f, "\"{}\"", name),
        }
    }
}

impl From<&str> for Action {
    fn from(name: &str) -> Self {
        Action::Name(name.to_string())
    }
}

impl From<String> for Action {
    fn from(name: String) -> Self {
        Action::Name(name)
    }
}

impl From<&String> for Action {
    fn from(name: &String) -> Self {
        Action::Name(name.clone())
    }
}

impl From<i64> for Action {
    fn from(code: i64) -> Self {
        Action::Code(code)
    }
}

impl From<i32> for Action {
    fn from(code: i32) -> Self {
        Action::Code(code as i64)
    }
}

impl From<u32> for Action {
    fn from(code: u32) -> Self {
        Action::Code(code as i64)
    }
}

impl From<&Action> for Action {
    fn from(action: &Action) -> Self {
        action.clone()
    }
}

/// Kind of an envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "i8", into = "i8")]
pub enum MessageType {
    /// Reserved error kind (code 0). Never produced, rejected on decode.
    Reserved,
    /// Fire-and-forget message.
    Send,
    /// Request expecting one answer.
    Post,
    /// Answer to a `Post` or `GetTransfer`.
    PostAnswer,
    /// Request whose answer moves resources back to the caller.
    GetTransfer,
    /// The peer is closing the channel.
    Close,
}

impl MessageType {
    /// Integer code used on the wire.
    pub const fn code(self) -> i8 {
        match self {
            MessageType::Close => -1,
            MessageType::Reserved => 0,
            MessageType::Send => 1,
            MessageType::Post => 2,
            MessageType::PostAnswer => 3,
            MessageType::GetTransfer => 4,
        }
    }

    /// Whether envelopes of this kind carry a request id.
    pub const fn is_correlated(self) -> bool {
        matches!(
            self,
            MessageType::Post | MessageType::PostAnswer | MessageType::GetTransfer
        )
    }
}

impl From<MessageType> for i8 {
    fn from(kind: MessageType) -> i8 {
        kind.code()
    }
}

impl TryFrom<i8> for MessageType {
    type Error = String;

    fn try_from(code: i8) -> std::result::Result<Self, String> {
        match code {
            -1 => Ok(MessageType::Close),
            0 => Ok(MessageType::Reserved),
            1 => Ok(MessageType::Send),
            2 => Ok(MessageType::Post),
            3 => Ok(MessageType::PostAnswer),
            4 => Ok(MessageType::GetTransfer),
            other => Err(format!("unknown message type {}", other)),
        }
    }
}

/// Envelope metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Meta {
    /// Envelope kind.
    #[serde(rename = "type")]
    pub kind: MessageType,
    /// Target action (`Send`, `Post`, `GetTransfer`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<Action>,
    /// Request id (`Post`, `GetTransfer`, `PostAnswer`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<u64>,
    /// Failure reported by the remote handler (`PostAnswer` only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<RemoteError>,
}

impl Meta {
    fn new(kind: MessageType) -> Self {
        Self {
            kind,
            action: None,
            id: None,
            error: None,
        }
    }
}

/// A complete wire message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// Routing and correlation metadata.
    pub meta: Meta,
    /// Application payload.
    #[serde(default)]
    pub data: Value,
}

impl Envelope {
    /// `Send` envelope.
    pub fn send(action: Action, data: Value) -> Self {
        let mut meta = Meta::new(MessageType::Send);
        meta.action = Some(action);
        Self { meta, data }
    }

    /// `Post` envelope.
    pub fn post(id: u64, action: Action, data: Value) -> Self {
        Self::request(MessageType::Post, id, action, data)
    }

    /// `GetTransfer` envelope.
    pub fn get_transfer(id: u64, action: Action, data: Value) -> Self {
        Self::request(MessageType::GetTransfer, id, action, data)
    }

    fn request(kind: MessageType, id: u64, action: Action, data: Value) -> Self {
        let mut meta = Meta::new(kind);
        meta.action = Some(action);
        meta.id = Some(id);
        Self { meta, data }
    }

    /// Successful `PostAnswer`.
    pub fn answer(id: u64, data: Value) -> Self {
        let mut meta = Meta::new(MessageType::PostAnswer);
        meta.id = Some(id);
        Self { meta, data }
    }

    /// Failed `PostAnswer`; the payload is left empty.
    pub fn failure(id: u64, error: RemoteError) -> Self {
        let mut meta = Meta::new(MessageType::PostAnswer);
        meta.id = Some(id);
        meta.error = Some(error);
        Self {
            meta,
            data: Value::Null,
        }
    }

    /// `Close` envelope.
    pub fn close() -> Self {
        Self {
            meta: Meta::new(MessageType::Close),
            data: Value::Null,
        }
    }
}
