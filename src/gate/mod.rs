//! Gate: actions, requests and answers over one [`Port`].
//!
//! A [`Gate`] owns one end of a channel, the table of action handlers and
//! the table of requests still waiting for an answer. Each gate runs one
//! dispatch task:
//!
//! 1. Receive the next inbound envelope
//! 2. `Close` - stop and reject every pending request
//! 3. `Send`/`Post`/`GetTransfer` - invoke the handler for the action; the
//!    dispatch task drives the handler's future alongside the next inbound
//!    envelopes and, for requests, sends its outcome back as a `PostAnswer`
//! 4. `PostAnswer` - complete the matching pending request
//!
//! Dropping the last handle to a gate closes it.
//!
//! # Example
//!
//! ```
//! use message_gate::{Gate, HandlerRegistry, RemoteError};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut handlers = HandlerRegistry::new();
//!     handlers.register("add", |n: i64| async move { Ok::<_, RemoteError>(n + 1) });
//!
//!     let (server, client) = Gate::pair(handlers, HandlerRegistry::new());
//!     let answer: i64 = client.post("add", &41).await?;
//!     assert_eq!(answer, 42);
//!
//!     client.close();
//!     server.closed().await;
//!     Ok(())
//! }
//! ```

mod builder;
mod config;
mod dispatch;
mod pending;

pub use builder::GateBuilder;
pub use config::GateConfig;

use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::{watch, Notify};

use crate::error::{GateError, RemoteError, Result};
use crate::handler::{Handler, HandlerRegistry, HandlerResult, Request, Response};
use crate::protocol::{Action, Envelope, MessageType};
use crate::transport::{Packet, Port, PortSink, TransferList};
use pending::{PendingReply, PendingTable};

/// Lifecycle of a gate. There is no way back to `Open`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateState {
    /// Sending and dispatching.
    Open,
    /// `close()` was called; the `Close` envelope is on its way.
    Closing,
    /// Endpoint released, pending requests rejected.
    Closed,
}

/// Lock a mutex, ignoring poisoning. Critical sections in this module never
/// leave their data half-updated.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

pub(crate) struct Inner {
    /// Id of the port this gate was built on, for logs.
    id: u64,
    sink: Mutex<Option<PortSink>>,
    registry: Mutex<HandlerRegistry>,
    pending: PendingTable,
    next_id: AtomicU64,
    state: watch::Sender<GateState>,
    /// Unused half of a standalone gate's pair.
    side_port: Mutex<Option<Port>>,
    shutdown: Arc<Notify>,
    config: GateConfig,
}

impl Inner {
    /// Hand a packet to the port.
    fn transmit(&self, packet: Packet) -> Result<()> {
        match lock(&self.sink).as_ref() {
            Some(sink) => sink.send(packet),
            None => Err(GateError::ChannelClosed),
        }
    }

    fn handler(&self, action: &Action) -> Option<Arc<dyn Handler>> {
        lock(&self.registry).get(action)
    }

    fn state(&self) -> GateState {
        *self.state.borrow()
    }

    /// Local close: notify the peer, then release everything.
    fn close(&self) {
        let began = self.state.send_if_modified(|state| {
            if *state == GateState::Open {
                *state = GateState::Closing;
                true
            } else {
                false
            }
        });
        if !began {
            return;
        }

        let sink = lock(&self.sink).take();
        if let Some(sink) = sink {
            if let Err(e) = sink.send(Packet::new(Envelope::close())) {
                tracing::debug!("Gate {}: close not delivered: {}", self.id, e);
            }
        }
        self.finish_close();
    }

    /// Release the endpoint and reject pending requests.
    fn finish_close(&self) {
        let changed = self.state.send_if_modified(|state| {
            if *state != GateState::Closed {
                *state = GateState::Closed;
                true
            } else {
                false
            }
        });
        if !changed {
            return;
        }

        lock(&self.sink).take();
        lock(&self.side_port).take();
        let rejected = self.pending.reject_all();
        self.shutdown.notify_one();
        tracing::debug!(
            "Gate {} closed, {} pending request(s) rejected",
            self.id,
            rejected
        );
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        self.close();
    }
}

/// Bidirectional messaging endpoint.
///
/// Cloning is cheap; all clones drive the same gate. Dropping the last clone
/// closes the gate. Must be created from within a tokio runtime.
#[derive(Clone)]
pub struct Gate {
    inner: Arc<Inner>,
}

impl Gate {
    /// Create a new gate builder.
    pub fn builder() -> GateBuilder {
        GateBuilder::new()
    }

    /// Gate over `port` with the given handlers.
    pub fn new(port: Port, handlers: HandlerRegistry) -> Gate {
        Self::with_config(port, handlers, GateConfig::default())
    }

    /// Gate over `port` with no handlers registered yet.
    pub fn from_port(port: Port) -> Gate {
        Self::new(port, HandlerRegistry::new())
    }

    /// Gate over `port` with explicit configuration.
    pub fn with_config(port: Port, handlers: HandlerRegistry, config: GateConfig) -> Gate {
        let id = port.id();
        let (sink, inbound) = port.into_parts();
        let (state, _) = watch::channel(GateState::Open);

        let inner = Arc::new(Inner {
            id,
            sink: Mutex::new(Some(sink)),
            registry: Mutex::new(handlers),
            pending: PendingTable::default(),
            next_id: AtomicU64::new(0),
            state,
            side_port: Mutex::new(None),
            shutdown: Arc::new(Notify::new()),
            config,
        });

        dispatch::spawn_dispatch(&inner, inbound);
        tracing::debug!("Gate {} opened", id);
        Gate { inner }
    }

    /// Gate on a fresh pair of ports. The other half is kept aside until
    /// [`take_side_port`](Self::take_side_port) hands it out.
    pub fn standalone(handlers: HandlerRegistry) -> Gate {
        let (gate, port) = Self::channel(handlers, GateConfig::default());
        *lock(&gate.inner.side_port) = Some(port);
        gate
    }

    /// Gate on a fresh pair of ports, returning the other half.
    pub fn channel(handlers: HandlerRegistry, config: GateConfig) -> (Gate, Port) {
        let (local, remote) = Port::pair();
        (Self::with_config(local, handlers, config), remote)
    }

    /// Two gates connected to each other.
    pub fn pair(a: HandlerRegistry, b: HandlerRegistry) -> (Gate, Gate) {
        let (port_a, port_b) = Port::pair();
        (Self::new(port_a, a), Self::new(port_b, b))
    }

    /// Take the unused half of a standalone gate's pair.
    pub fn take_side_port(&self) -> Option<Port> {
        lock(&self.inner.side_port).take()
    }

    /// Register a typed handler for `action`, replacing any previous one.
    ///
    /// The payload is deserialized into `T`; the returned value is
    /// serialized as the answer.
    pub fn on<F, T, R, Fut>(&self, action: impl Into<Action>, handler: F) -> &Self
    where
        F: Fn(T) -> Fut + Send + Sync + 'static,
        T: DeserializeOwned + Send + 'static,
        R: Serialize + Send + 'static,
        Fut: Future<Output = std::result::Result<R, RemoteError>> + Send + 'static,
    {
        lock(&self.inner.registry).register(action, handler);
        self
    }

    /// Register a handler that sees the whole [`Request`], transferred
    /// resources included, and may move resources back.
    pub fn on_request<F, Fut>(&self, action: impl Into<Action>, handler: F) -> &Self
    where
        F: Fn(Request) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        lock(&self.inner.registry).register_request(action, handler);
        self
    }

    /// Register an already boxed handler.
    pub fn on_handler(&self, action: impl Into<Action>, handler: Arc<dyn Handler>) -> &Self {
        lock(&self.inner.registry).insert(action, handler);
        self
    }

    /// Remove the handler for `action`. Returns whether one was registered.
    pub fn off(&self, action: impl Into<Action>) -> bool {
        lock(&self.inner.registry).remove(&action.into())
    }

    /// Remove every handler.
    pub fn off_all(&self) {
        lock(&self.inner.registry).clear();
    }

    /// Whether `action` currently has a handler.
    pub fn has_handler(&self, action: impl Into<Action>) -> bool {
        lock(&self.inner.registry).contains(&action.into())
    }

    /// Fire-and-forget message.
    pub fn send<D>(&self, action: impl Into<Action>, data: &D) -> Result<()>
    where
        D: Serialize + ?Sized,
    {
        self.send_with_transfer(action, data, TransferList::new())
    }

    /// Fire-and-forget message moving `transfer` to the peer.
    pub fn send_with_transfer<D>(
        &self,
        action: impl Into<Action>,
        data: &D,
        transfer: impl Into<TransferList>,
    ) -> Result<()>
    where
        D: Serialize + ?Sized,
    {
        let action = action.into();
        let envelope = Envelope::send(action, serde_json::to_value(data)?);
        tracing::trace!("Gate {}: send {:?}", self.inner.id, envelope.meta.action);
        self.inner.transmit(Packet {
            envelope,
            transfer: transfer.into().into_vec(),
        })
    }

    /// Request with a typed answer.
    ///
    /// The request is transmitted before this returns; the future only
    /// waits for the answer. Requests therefore leave in call order even if
    /// their futures are polled in another order.
    pub fn post<R, D>(
        &self,
        action: impl Into<Action>,
        data: &D,
    ) -> impl Future<Output = Result<R>> + Send + 'static
    where
        R: DeserializeOwned + Send + 'static,
        D: Serialize + ?Sized,
    {
        self.post_with_transfer(action, data, TransferList::new())
    }

    /// Request moving `transfer` to the peer, with a typed answer.
    pub fn post_with_transfer<R, D>(
        &self,
        action: impl Into<Action>,
        data: &D,
        transfer: impl Into<TransferList>,
    ) -> impl Future<Output = Result<R>> + Send + 'static
    where
        R: DeserializeOwned + Send + 'static,
        D: Serialize + ?Sized,
    {
        let pending = self.request(MessageType::Post, action.into(), data, transfer.into());
        async move {
            let response = pending?.wait().await?;
            response.parse::<R>()
        }
    }

    /// Request whose answer moves resources back to the caller.
    pub fn get_transfer<D>(
        &self,
        action: impl Into<Action>,
        data: &D,
    ) -> impl Future<Output = Result<Response>> + Send + 'static
    where
        D: Serialize + ?Sized,
    {
        self.bi_transfer(action, data, TransferList::new())
    }

    /// Request moving resources both ways.
    pub fn bi_transfer<D>(
        &self,
        action: impl Into<Action>,
        data: &D,
        transfer: impl Into<TransferList>,
    ) -> impl Future<Output = Result<Response>> + Send + 'static
    where
        D: Serialize + ?Sized,
    {
        let pending = self.request(
            MessageType::GetTransfer,
            action.into(),
            data,
            transfer.into(),
        );
        async move { pending?.wait().await }
    }

    /// Allocate an id, record the pending entry and transmit the request.
    fn request<D>(
        &self,
        kind: MessageType,
        action: Action,
        data: &D,
        transfer: TransferList,
    ) -> Result<PendingReply>
    where
        D: Serialize + ?Sized,
    {
        let data = serde_json::to_value(data)?;
        let inner = &self.inner;

        // Holding the sink lock keeps ids in wire order and serializes
        // against close().
        let sink = lock(&inner.sink);
        let sink = sink.as_ref().ok_or(GateError::ChannelClosed)?;

        let id = inner.next_id.fetch_add(1, Ordering::Relaxed);
        tracing::trace!("Gate {}: request {} for {}", inner.id, id, action);
        let rx = inner.pending.insert(id, action.clone());
        let envelope = match kind {
            MessageType::GetTransfer => Envelope::get_transfer(id, action, data),
            _ => Envelope::post(id, action, data),
        };

        if let Err(e) = sink.send(Packet {
            envelope,
            transfer: transfer.into_vec(),
        }) {
            inner.pending.remove(id);
            return Err(e);
        }

        Ok(PendingReply {
            id,
            rx,
            timeout: inner.config.request_timeout,
            gate: Arc::downgrade(inner),
        })
    }

    /// Close the gate: notify the peer, release the endpoint, reject pending
    /// requests with [`GateError::ChannelClosed`]. Idempotent.
    pub fn close(&self) {
        self.inner.close();
    }

    /// Wait until the gate is closed, locally or by the peer.
    pub async fn closed(&self) {
        let mut rx = self.inner.state.subscribe();
        let _ = rx.wait_for(|state| *state == GateState::Closed).await;
    }

    /// Current lifecycle state.
    pub fn state(&self) -> GateState {
        self.inner.state()
    }

    /// Whether the gate is closed.
    pub fn is_closed(&self) -> bool {
        self.state() == GateState::Closed
    }

    /// Number of requests waiting for an answer.
    pub fn pending_requests(&self) -> usize {
        self.inner.pending.len()
    }

    /// Configuration this gate was built with.
    pub fn config(&self) -> &GateConfig {
        &self.inner.config
    }
}

impl fmt::Debug for Gate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Gate")
            .field("id", &self.inner.id)
            .field("state", &self.state())
            .field("pending", &self.pending_requests())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::Inbound;
    use serde_json::{json, Value};
    use std::time::Duration;
    use tokio::sync::mpsc;

    fn adder() -> HandlerRegistry {
        let mut handlers = HandlerRegistry::new();
        handlers.register("add", |n: i64| async move { Ok::<_, RemoteError>(n + 1) });
        handlers
    }

    #[tokio::test]
    async fn test_post_roundtrip() {
        let (_server, client) = Gate::pair(adder(), HandlerRegistry::new());

        let answer: i64 = client.post("add", &41).await.unwrap();
        assert_eq!(answer, 42);
        assert_eq!(client.pending_requests(), 0);
    }

    #[tokio::test]
    async fn test_post_is_eager() {
        let (gate, mut port) = Gate::channel(HandlerRegistry::new(), GateConfig::default());

        // Never polled.
        let _first = gate.post::<Value, _>("a", &1);
        let _second = gate.post::<Value, _>("b", &2);

        for (id, action) in [(0u64, "a"), (1, "b")] {
            match port.recv().await {
                Some(crate::transport::Inbound::Packet(packet)) => {
                    assert_eq!(packet.envelope.meta.id, Some(id));
                    assert_eq!(packet.envelope.meta.action, Some(Action::from(action)));
                }
                other => panic!("unexpected {:?}", other),
            }
        }
        assert_eq!(gate.pending_requests(), 2);
    }

    #[tokio::test]
    async fn test_send_reaches_handler() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let (server, client) = Gate::pair(HandlerRegistry::new(), HandlerRegistry::new());
        server.on("log", move |line: String| {
            let tx = tx.clone();
            async move {
                let _ = tx.send(line);
                Ok::<_, RemoteError>(())
            }
        });

        client.send("log", "hello").unwrap();
        assert_eq!(rx.recv().await.unwrap(), "hello");
    }

    #[tokio::test]
    async fn test_remote_error() {
        let (server, client) = Gate::pair(HandlerRegistry::new(), HandlerRegistry::new());
        server.on("fail", |_: Value| async move {
            Err::<(), _>(RemoteError::new("bad input"))
        });

        match client.post::<Value, _>("fail", &json!({})).await {
            Err(GateError::Remote(err)) => assert_eq!(err.message, "bad input"),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_off_and_has_handler() {
        let gate = Gate::standalone(adder());

        assert!(gate.has_handler("add"));
        assert!(gate.off("add"));
        assert!(!gate.off("add"));
        gate.on("x", |_: ()| async { Ok::<_, RemoteError>(()) })
            .on(1i64, |_: ()| async { Ok::<_, RemoteError>(()) });
        gate.off_all();
        assert!(!gate.has_handler("x"));
        assert!(!gate.has_handler(1i64));
    }

    #[tokio::test]
    async fn test_close_rejects_pending_and_later_calls() {
        let (gate, _port) = Gate::channel(HandlerRegistry::new(), GateConfig::default());

        let waiting = gate.post::<Value, _>("never", &());
        gate.close();

        assert!(matches!(waiting.await, Err(GateError::ChannelClosed)));
        assert!(gate.is_closed());
        assert!(matches!(gate.send("x", &()), Err(GateError::ChannelClosed)));
        assert!(matches!(
            gate.post::<Value, _>("x", &()).await,
            Err(GateError::ChannelClosed)
        ));

        // Idempotent.
        gate.close();
        assert_eq!(gate.state(), GateState::Closed);
    }

    #[tokio::test]
    async fn test_peer_close_closes_gate() {
        let (a, b) = Gate::pair(HandlerRegistry::new(), HandlerRegistry::new());
        let waiting = b.post::<Value, _>("never", &());

        a.close();
        b.closed().await;

        assert!(b.is_closed());
        assert!(matches!(waiting.await, Err(GateError::ChannelClosed)));
    }

    #[tokio::test]
    async fn test_standalone_side_port() {
        let gate = Gate::standalone(adder());
        let port = gate.take_side_port().unwrap();
        assert!(gate.take_side_port().is_none());

        let client = Gate::from_port(port);
        let answer: i64 = client.post("add", &1).await.unwrap();
        assert_eq!(answer, 2);
    }

    #[tokio::test]
    async fn test_dropped_peer_port_closes_gate() {
        let (gate, port) = Gate::channel(HandlerRegistry::new(), GateConfig::default());
        drop(port);

        gate.closed().await;
        assert!(gate.is_closed());
    }

    #[tokio::test]
    async fn test_dropping_last_handle_closes_gate() {
        let (gate, mut port) = Gate::channel(HandlerRegistry::new(), GateConfig::default());
        let clone = gate.clone();
        drop(gate);
        drop(clone);

        let first = tokio::time::timeout(Duration::from_secs(2), port.recv())
            .await
            .expect("peer never saw the gate go away");
        match first {
            Some(Inbound::Packet(packet)) => {
                assert_eq!(packet.envelope.meta.kind, MessageType::Close)
            }
            other => panic!("unexpected {:?}", other),
        }
        let end = tokio::time::timeout(Duration::from_secs(2), port.recv())
            .await
            .expect("channel stayed open");
        assert!(end.is_none());
    }

    #[tokio::test]
    async fn test_dispatch_task_does_not_keep_gate_alive() {
        let (a, b) = Gate::pair(adder(), HandlerRegistry::new());
        assert_eq!(b.post::<i64, _>("add", &1).await.unwrap(), 2);

        let weak = Arc::downgrade(&a.inner);
        drop(a);
        assert!(weak.upgrade().is_none());

        b.closed().await;
        assert!(b.is_closed());
    }
}
