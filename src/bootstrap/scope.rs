//! Signaling scope shared by a spawner and the context it spawned.
//!
//! A [`Scope`] is the one channel that exists before any gate does, e.g.
//! the handle passed into a worker thread. The handshake runs over it; once
//! done, applications may keep using it for their own messages.

use std::collections::VecDeque;
use std::fmt;

use serde::Serialize;
use serde_json::Value;
use tokio::sync::mpsc;

use crate::error::{GateError, Result};
use crate::transport::Port;

/// Handshake signals.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    /// Spawner is ready to hand out a port.
    Start,
    /// Spawned side asks for its port.
    GetPort,
    /// Spawned side has built its gate.
    Ready,
}

impl Signal {
    /// Literal name of the signal.
    pub const fn as_str(self) -> &'static str {
        match self {
            Signal::Start => "@gate@start",
            Signal::GetPort => "@gate@getPort",
            Signal::Ready => "@gate@ready",
        }
    }

    /// Parse a literal signal name.
    pub fn from_name(name: &str) -> Option<Signal> {
        match name {
            "@gate@start" => Some(Signal::Start),
            "@gate@getPort" => Some(Signal::GetPort),
            "@gate@ready" => Some(Signal::Ready),
            _ => None,
        }
    }
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A message posted on a scope.
#[derive(Debug)]
pub enum ScopeMessage {
    /// Handshake signal.
    Signal(Signal),
    /// Transferred channel end.
    Port(Port),
    /// Application message.
    Data(Value),
}

impl ScopeMessage {
    /// The handshake signal this message stands for, if any. A string
    /// payload equal to a signal's literal name counts as that signal.
    pub fn signal(&self) -> Option<Signal> {
        match self {
            ScopeMessage::Signal(signal) => Some(*signal),
            ScopeMessage::Data(Value::String(name)) => Signal::from_name(name),
            _ => None,
        }
    }
}

impl From<Signal> for ScopeMessage {
    fn from(signal: Signal) -> Self {
        ScopeMessage::Signal(signal)
    }
}

impl From<Port> for ScopeMessage {
    fn from(port: Port) -> Self {
        ScopeMessage::Port(port)
    }
}

impl From<Value> for ScopeMessage {
    fn from(data: Value) -> Self {
        ScopeMessage::Data(data)
    }
}

/// One half of a signaling scope.
pub struct Scope {
    tx: mpsc::UnboundedSender<ScopeMessage>,
    rx: mpsc::UnboundedReceiver<ScopeMessage>,
    /// Messages received during a handshake that were not part of it.
    backlog: VecDeque<ScopeMessage>,
}

impl Scope {
    /// Create both halves of a scope.
    pub fn pair() -> (Scope, Scope) {
        let (a_tx, a_rx) = mpsc::unbounded_channel();
        let (b_tx, b_rx) = mpsc::unbounded_channel();

        let a = Scope {
            tx: b_tx,
            rx: a_rx,
            backlog: VecDeque::new(),
        };
        let b = Scope {
            tx: a_tx,
            rx: b_rx,
            backlog: VecDeque::new(),
        };
        (a, b)
    }

    /// Post a message to the other half.
    pub fn post_message(&self, message: impl Into<ScopeMessage>) -> Result<()> {
        self.tx
            .send(message.into())
            .map_err(|_| GateError::ChannelClosed)
    }

    /// Post an application value to the other half.
    pub fn post<D: Serialize + ?Sized>(&self, data: &D) -> Result<()> {
        self.post_message(ScopeMessage::Data(serde_json::to_value(data)?))
    }

    /// Next message: first whatever a handshake set aside, then the channel.
    /// `None` once the other half is gone.
    pub async fn recv(&mut self) -> Option<ScopeMessage> {
        match self.backlog.pop_front() {
            Some(message) => Some(message),
            None => self.rx.recv().await,
        }
    }

    /// Number of messages set aside by a handshake and not yet received.
    pub fn backlog_len(&self) -> usize {
        self.backlog.len()
    }

    /// Next message from the channel, skipping the backlog.
    pub(crate) async fn recv_raw(&mut self) -> Option<ScopeMessage> {
        self.rx.recv().await
    }

    /// Set a message aside for a later `recv`.
    pub(crate) fn defer(&mut self, message: ScopeMessage) {
        tracing::trace!("Scope: deferring {:?}", message);
        self.backlog.push_back(message);
    }
}

impl fmt::Debug for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scope")
            .field("backlog", &self.backlog.len())
            .finish()
    }
}
