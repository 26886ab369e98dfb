//! Pending-request table.
//!
//! Maps each outstanding request id to the sender that completes the
//! caller's future. An entry leaves the table exactly once: when its answer
//! arrives, when the gate closes, or when the caller's timeout fires.

use std::collections::HashMap;
use std::sync::{Mutex, Weak};
use std::time::Duration;

use tokio::sync::oneshot;

use super::{lock, Inner};
use crate::error::{GateError, RemoteError, RemoteErrorKind, Result};
use crate::handler::Response;
use crate::protocol::Action;
use crate::transport::Transferable;

struct PendingEntry {
    action: Action,
    tx: oneshot::Sender<Result<Response>>,
}

/// Outstanding requests of one gate.
#[derive(Default)]
pub(crate) struct PendingTable {
    entries: Mutex<HashMap<u64, PendingEntry>>,
}

impl PendingTable {
    /// Record a request and return the receiver its answer will arrive on.
    pub(crate) fn insert(&self, id: u64, action: Action) -> oneshot::Receiver<Result<Response>> {
        let (tx, rx) = oneshot::channel();
        lock(&self.entries).insert(id, PendingEntry { action, tx });
        rx
    }

    /// Complete request `id` with the answer received for it.
    ///
    /// Returns `false` if no such request is pending (already answered,
    /// timed out, or never issued).
    pub(crate) fn complete(
        &self,
        id: u64,
        outcome: std::result::Result<serde_json::Value, RemoteError>,
        transfer: Vec<Transferable>,
    ) -> bool {
        let entry = match lock(&self.entries).remove(&id) {
            Some(entry) => entry,
            None => return false,
        };

        let result = match outcome {
            Ok(data) => Ok(Response { data, transfer }),
            Err(error) if error.kind == RemoteErrorKind::UnhandledAction => {
                Err(GateError::UnhandledAction(entry.action))
            }
            Err(error) => Err(GateError::Remote(error)),
        };
        // The caller may have stopped waiting; nothing to do then.
        let _ = entry.tx.send(result);
        true
    }

    /// Forget request `id` without completing it.
    pub(crate) fn remove(&self, id: u64) -> bool {
        lock(&self.entries).remove(&id).is_some()
    }

    /// Reject every outstanding request with `ChannelClosed`.
    pub(crate) fn reject_all(&self) -> usize {
        let drained: Vec<PendingEntry> = lock(&self.entries).drain().map(|(_, e)| e).collect();
        let count = drained.len();
        for entry in drained {
            let _ = entry.tx.send(Err(GateError::ChannelClosed));
        }
        count
    }

    /// Number of outstanding requests.
    pub(crate) fn len(&self) -> usize {
        lock(&self.entries).len()
    }
}

/// Caller side of a pending request.
pub(crate) struct PendingReply {
    pub(crate) id: u64,
    pub(crate) rx: oneshot::Receiver<Result<Response>>,
    pub(crate) timeout: Option<Duration>,
    pub(crate) gate: Weak<Inner>,
}

impl PendingReply {
    /// Wait for the answer.
    pub(crate) async fn wait(self) -> Result<Response> {
        let received = match self.timeout {
            Some(limit) => match tokio::time::timeout(limit, self.rx).await {
                Ok(received) => received,
                Err(_) => {
                    if let Some(gate) = self.gate.upgrade() {
                        gate.pending.remove(self.id);
                    }
                    tracing::debug!("Request {} timed out after {:?}", self.id, limit);
                    return Err(GateError::Timeout);
                }
            },
            None => self.rx.await,
        };

        // A dropped sender means the table itself went away with the gate.
        received.unwrap_or_else(|_| Err(GateError::ChannelClosed))
    }
}
