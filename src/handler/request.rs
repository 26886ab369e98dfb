//! Values passed into and out of handlers.
//!
//! - [`Request`] - what a handler receives: action, payload, transferred resources
//! - [`Reply`] - what a handler returns: payload plus resources to move back
//! - [`Response`] - what a `get_transfer`/`bi_transfer` caller receives
//!
//! # Example
//!
//! ```
//! use bytes::BytesMut;
//! use message_gate::handler::Reply;
//!
//! // Answer with a value and hand a buffer back to the caller.
//! let reply = Reply::value(&"done")
//!     .unwrap()
//!     .with_transfer(BytesMut::from(&b"result"[..]));
//! assert_eq!(reply.transfer.len(), 1);
//! ```

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::error::{RemoteError, RemoteErrorKind, Result};
use crate::protocol::Action;
use crate::transport::{TransferList, Transferable};

/// An inbound message as seen by a handler.
#[derive(Debug)]
pub struct Request {
    action: Action,
    id: Option<u64>,
    data: Value,
    transfer: Vec<Transferable>,
}

impl Request {
    /// Create a request.
    pub fn new(action: Action, id: Option<u64>, data: Value, transfer: Vec<Transferable>) -> Self {
        Self {
            action,
            id,
            data,
            transfer,
        }
    }

    /// Action this request was addressed to.
    #[inline]
    pub fn action(&self) -> &Action {
        &self.action
    }

    /// Request id, `None` for fire-and-forget messages.
    #[inline]
    pub fn id(&self) -> Option<u64> {
        self.id
    }

    /// Raw payload.
    #[inline]
    pub fn data(&self) -> &Value {
        &self.data
    }

    /// Deserialize the payload.
    ///
    /// The error is tagged [`RemoteErrorKind::InvalidPayload`] so it can be
    /// returned from the handler as is.
    pub fn parse<T: DeserializeOwned>(&self) -> std::result::Result<T, RemoteError> {
        serde_json::from_value(self.data.clone()).map_err(|e| {
            RemoteError::with_kind(
                RemoteErrorKind::InvalidPayload,
                format!("invalid payload for {}: {}", self.action, e),
            )
        })
    }

    /// Take ownership of the resources transferred with this request.
    pub fn take_transfer(&mut self) -> Vec<Transferable> {
        std::mem::take(&mut self.transfer)
    }

    /// Number of resources transferred with this request.
    pub fn transfer_len(&self) -> usize {
        self.transfer.len()
    }

    /// Split into payload and transferred resources.
    pub fn into_parts(self) -> (Value, Vec<Transferable>) {
        (self.data, self.transfer)
    }
}

/// A handler's answer: a value plus resources to move back to the caller.
///
/// Resources are only delivered for `GetTransfer` requests
/// (`get_transfer`/`bi_transfer`); a `post` answer carries the value alone.
#[derive(Debug, Default)]
pub struct Reply {
    /// Answer payload.
    pub data: Value,
    /// Resources moving back to the caller.
    pub transfer: Vec<Transferable>,
}

impl Reply {
    /// Reply with a raw payload.
    pub fn new(data: Value) -> Self {
        Self {
            data,
            transfer: Vec::new(),
        }
    }

    /// Reply with a serialized value.
    pub fn value<T: Serialize + ?Sized>(value: &T) -> std::result::Result<Self, RemoteError> {
        Ok(Self::new(serde_json::to_value(value)?))
    }

    /// Empty (`null`) reply.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Attach resources to move back with the answer.
    pub fn with_transfer(mut self, transfer: impl Into<TransferList>) -> Self {
        self.transfer.extend(transfer.into());
        self
    }
}

impl From<Value> for Reply {
    fn from(data: Value) -> Self {
        Reply::new(data)
    }
}

/// Answer received by a `get_transfer`/`bi_transfer` caller.
#[derive(Debug)]
pub struct Response {
    /// Answer payload.
    pub data: Value,
    /// Resources now owned by the caller.
    pub transfer: Vec<Transferable>,
}

impl Response {
    /// Deserialize the payload.
    pub fn parse<T: DeserializeOwned>(&self) -> Result<T> {
        Ok(serde_json::from_value(self.data.clone())?)
    }
}
