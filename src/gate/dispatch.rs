//! Dispatch loop: one task per gate, inbound messages in arrival order.
//!
//! Handler futures are polled by the dispatch task itself, so each handler
//! starts in the order its message arrived. Once started they complete
//! concurrently.

use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use futures::stream::FuturesUnordered;
use futures::{FutureExt, StreamExt};
use serde_json::Value;
use tokio::sync::mpsc;

use super::Inner;
use crate::error::{GateError, RemoteError, RemoteErrorKind};
use crate::handler::{BoxFuture, Handler, HandlerResult, Request};
use crate::protocol::{Action, Envelope, Message};
use crate::transport::{Inbound, Packet, Transferable};

/// Handler futures started by the loop and not finished yet.
type Running = FuturesUnordered<BoxFuture<'static, ()>>;

/// Start the dispatch task. It only holds a weak reference, so dropping the
/// last [`Gate`](super::Gate) handle closes the gate and stops the task.
pub(super) fn spawn_dispatch(inner: &Arc<Inner>, mut inbound: mpsc::UnboundedReceiver<Inbound>) {
    let gate = Arc::downgrade(inner);
    let shutdown = Arc::clone(&inner.shutdown);
    let id = inner.id;

    tokio::spawn(async move {
        let mut running = Running::new();
        loop {
            tokio::select! {
                biased;
                _ = shutdown.notified() => break,
                Some(()) = running.next(), if !running.is_empty() => {}
                event = inbound.recv() => {
                    let inner = match gate.upgrade() {
                        Some(inner) => inner,
                        None => break,
                    };
                    if !handle_event(&inner, event, &mut running) {
                        break;
                    }
                }
            }
        }
        if !running.is_empty() {
            tracing::debug!("Gate {}: {} handler(s) still running dropped", id, running.len());
        }
        tracing::trace!("Gate {}: dispatch loop stopped", id);
    });
}

/// Handle one inbound event. Returns `false` when the loop must stop.
fn handle_event(inner: &Arc<Inner>, event: Option<Inbound>, running: &mut Running) -> bool {
    match event {
        Some(Inbound::Packet(packet)) => dispatch_packet(inner, packet, running),
        Some(Inbound::Error(e)) => {
            tracing::error!("Gate {}: transport error: {}", inner.id, e);
            inner.close();
            false
        }
        None => {
            tracing::debug!("Gate {}: peer went away", inner.id);
            inner.finish_close();
            false
        }
    }
}

/// Handle one inbound packet. Returns `false` when the loop must stop.
fn dispatch_packet(inner: &Arc<Inner>, packet: Packet, running: &mut Running) -> bool {
    let Packet { envelope, transfer } = packet;
    let message = match Message::try_from(envelope) {
        Ok(message) => message,
        Err(e) => {
            tracing::warn!("Gate {}: dropping malformed envelope: {}", inner.id, e);
            return true;
        }
    };

    match message {
        Message::Close => {
            tracing::debug!("Gate {}: closed by peer", inner.id);
            inner.finish_close();
            return false;
        }
        Message::Send { action, data } => dispatch_send(inner, action, data, transfer, running),
        Message::Post { id, action, data } => {
            dispatch_request(inner, id, action, data, transfer, false, running)
        }
        Message::GetTransfer { id, action, data } => {
            dispatch_request(inner, id, action, data, transfer, true, running)
        }
        Message::Answer { id, outcome } => {
            if !inner.pending.complete(id, outcome, transfer) {
                tracing::trace!("Gate {}: answer for unknown request {}", inner.id, id);
            }
        }
    }
    true
}

fn dispatch_send(
    inner: &Arc<Inner>,
    action: Action,
    data: Value,
    transfer: Vec<Transferable>,
    running: &mut Running,
) {
    let handler = match inner.handler(&action) {
        Some(handler) => handler,
        None => {
            tracing::trace!("Gate {}: no handler for {}, message dropped", inner.id, action);
            return;
        }
    };

    let fut = invoke(&handler, Request::new(action.clone(), None, data, transfer));
    let id = inner.id;
    running.push(Box::pin(async move {
        if let Err(e) = run_handler(fut).await {
            tracing::warn!("Gate {}: handler for {} failed: {}", id, action, e);
        }
    }));
}

fn dispatch_request(
    inner: &Arc<Inner>,
    id: u64,
    action: Action,
    data: Value,
    transfer: Vec<Transferable>,
    with_transfer: bool,
    running: &mut Running,
) {
    let handler = match inner.handler(&action) {
        Some(handler) => handler,
        None if inner.config.reject_unhandled => {
            tracing::debug!("Gate {}: rejecting request {} for {}", inner.id, id, action);
            let error = RemoteError::with_kind(
                RemoteErrorKind::UnhandledAction,
                format!("no handler for {}", action),
            );
            send_answer(inner, id, Envelope::failure(id, error), Vec::new());
            return;
        }
        None => {
            tracing::trace!("Gate {}: no handler for {}, request {} dropped", inner.id, action, id);
            return;
        }
    };

    let fut = invoke(&handler, Request::new(action.clone(), Some(id), data, transfer));
    let gate = Arc::downgrade(inner);
    running.push(Box::pin(async move {
        let result = run_handler(fut).await;
        let inner = match gate.upgrade() {
            Some(inner) => inner,
            None => return,
        };
        match result {
            Ok(reply) => {
                let mut transfer = reply.transfer;
                if !with_transfer && !transfer.is_empty() {
                    tracing::warn!(
                        "Gate {}: answer to {} dropped {} resource(s); use get_transfer to move them",
                        inner.id,
                        action,
                        transfer.len()
                    );
                    transfer.clear();
                }
                send_answer(&inner, id, Envelope::answer(id, reply.data), transfer);
            }
            Err(error) => {
                tracing::debug!("Gate {}: request {} for {} failed: {}", inner.id, id, action, error);
                send_answer(&inner, id, Envelope::failure(id, error), Vec::new());
            }
        }
    }));
}

/// Send an answer. If the answer itself cannot be sent (e.g. it carries a
/// port over a byte stream), the requester gets the failure instead.
fn send_answer(inner: &Inner, id: u64, envelope: Envelope, transfer: Vec<Transferable>) {
    match inner.transmit(Packet { envelope, transfer }) {
        Ok(()) => {}
        Err(GateError::ChannelClosed) => {
            tracing::debug!("Gate {}: answer {} not delivered, channel closed", inner.id, id);
        }
        Err(e) => {
            tracing::warn!("Gate {}: answer {} could not be sent: {}", inner.id, id, e);
            let fallback = Envelope::failure(id, RemoteError::new(e.to_string()));
            if let Err(e) = inner.transmit(Packet::new(fallback)) {
                tracing::debug!("Gate {}: failure for {} not delivered: {}", inner.id, id, e);
            }
        }
    }
}

/// Build the handler's future, turning a panic while doing so into an error.
fn invoke(handler: &Arc<dyn Handler>, request: Request) -> BoxFuture<'static, HandlerResult> {
    match catch_unwind(AssertUnwindSafe(|| handler.call(request))) {
        Ok(fut) => fut,
        Err(panic) => {
            let error = RemoteError::with_kind(RemoteErrorKind::Panicked, panic_message(&*panic));
            Box::pin(async move { Err(error) })
        }
    }
}

/// Drive the handler's future, turning a panic while polling into an error.
async fn run_handler(fut: BoxFuture<'static, HandlerResult>) -> HandlerResult {
    match AssertUnwindSafe(fut).catch_unwind().await {
        Ok(result) => result,
        Err(panic) => Err(RemoteError::with_kind(
            RemoteErrorKind::Panicked,
            panic_message(&*panic),
        )),
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(msg) = panic.downcast_ref::<&str>() {
        format!("handler panicked: {}", msg)
    } else if let Some(msg) = panic.downcast_ref::<String>() {
        format!("handler panicked: {}", msg)
    } else {
        "handler panicked".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gate::{Gate, GateConfig};
    use crate::handler::{HandlerRegistry, Reply};
    use crate::transport::{Port, TransferList};
    use bytes::BytesMut;
    use serde_json::json;

    #[test]
    fn test_panic_message() {
        let boxed: Box<dyn Any + Send> = Box::new("boom");
        assert_eq!(panic_message(&*boxed), "handler panicked: boom");

        let boxed: Box<dyn Any + Send> = Box::new(String::from("bang"));
        assert_eq!(panic_message(&*boxed), "handler panicked: bang");

        let boxed: Box<dyn Any + Send> = Box::new(7u8);
        assert_eq!(panic_message(&*boxed), "handler panicked");
    }

    #[tokio::test]
    async fn test_async_panic_becomes_remote_error() {
        let (server, client) = Gate::pair(HandlerRegistry::new(), HandlerRegistry::new());
        server.on("boom", |_: ()| async move {
            if true {
                panic!("kaboom");
            }
            Ok::<(), RemoteError>(())
        });

        match client.post::<Value, _>("boom", &()).await {
            Err(GateError::Remote(err)) => {
                assert_eq!(err.kind, RemoteErrorKind::Panicked);
                assert!(err.message.contains("kaboom"));
            }
            other => panic!("unexpected {:?}", other),
        }

        // The loop survives.
        server.on("ok", |_: ()| async { Ok::<_, RemoteError>(1) });
        assert_eq!(client.post::<i64, _>("ok", &()).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_sync_panic_becomes_remote_error() {
        let (server, client) = Gate::pair(HandlerRegistry::new(), HandlerRegistry::new());
        server.on_request("boom", |_req: Request| -> BoxFuture<'static, HandlerResult> {
            panic!("before the future")
        });

        match client.post::<Value, _>("boom", &()).await {
            Err(GateError::Remote(err)) => assert_eq!(err.kind, RemoteErrorKind::Panicked),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_unhandled_rejected_when_configured() {
        let config = GateConfig {
            reject_unhandled: true,
            ..GateConfig::default()
        };
        let (server_port, client_port) = Port::pair();
        let _server = Gate::with_config(server_port, HandlerRegistry::new(), config);
        let client = Gate::from_port(client_port);

        match client.post::<Value, _>("missing", &()).await {
            Err(GateError::UnhandledAction(action)) => assert_eq!(action, Action::from("missing")),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_post_answer_drops_resources() {
        let (server, client) = Gate::pair(HandlerRegistry::new(), HandlerRegistry::new());
        server.on_request("give", |_req: Request| async move {
            Ok::<_, RemoteError>(Reply::value(&"here")?.with_transfer(BytesMut::from(&b"x"[..])))
        });

        let via_post: String = client.post("give", &()).await.unwrap();
        assert_eq!(via_post, "here");

        let via_transfer = client.get_transfer("give", &()).await.unwrap();
        assert_eq!(via_transfer.data, json!("here"));
        assert_eq!(via_transfer.transfer.len(), 1);
    }

    #[tokio::test]
    async fn test_unsendable_answer_reported_to_requester() {
        let (left, right) = tokio::io::duplex(4096);
        let (lr, lw) = tokio::io::split(left);
        let (rr, rw) = tokio::io::split(right);
        let server = Gate::from_port(Port::from_stream(lr, lw));
        let client = Gate::from_port(Port::from_stream(rr, rw));

        server.on_request("port", |_req: Request| async move {
            let (port, _other) = Port::pair();
            Ok(Reply::empty().with_transfer(TransferList::from(port)))
        });

        match client.get_transfer("port", &()).await {
            Err(GateError::Remote(err)) => assert!(err.message.contains("byte stream")),
            other => panic!("unexpected {:?}", other),
        }
    }
}
