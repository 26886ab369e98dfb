//! The bootstrap handshake.
//!
//! ```text
//! spawner                         worker
//!    │ ── @gate@start ──────────────► │
//!    │ ◄───────────── @gate@getPort ── │
//!    │ ── Port(other half) ─────────► │   builds its gate
//!    │ ◄──────────────── @gate@ready ── │
//! resolves                        resolves
//! ```

use std::future::Future;
use std::time::Duration;

use super::{Scope, ScopeMessage, Signal};
use crate::error::{GateError, Result};
use crate::gate::{Gate, GateConfig};
use crate::handler::HandlerRegistry;
use crate::transport::Port;

/// Spawning side of the handshake with default configuration.
pub async fn spawner_handshake(scope: &mut Scope, handlers: HandlerRegistry) -> Result<Gate> {
    spawner_handshake_with_config(scope, handlers, GateConfig::default()).await
}

/// Spawned side of the handshake with default configuration.
pub async fn worker_handshake(scope: &mut Scope, handlers: HandlerRegistry) -> Result<Gate> {
    worker_handshake_with_config(scope, handlers, GateConfig::default()).await
}

/// Spawning side: build a gate on a fresh pair, hand the other half over
/// `scope`, resolve once the worker reports ready.
pub async fn spawner_handshake_with_config(
    scope: &mut Scope,
    handlers: HandlerRegistry,
    config: GateConfig,
) -> Result<Gate> {
    let limit = config.handshake_timeout;
    let (gate, port) = Gate::channel(handlers, config);

    match with_timeout(limit, offer_port(scope, port)).await {
        Ok(()) => {
            tracing::debug!("Bootstrap: worker ready");
            Ok(gate)
        }
        Err(e) => {
            tracing::debug!("Bootstrap: spawner handshake failed: {}", e);
            gate.close();
            Err(e)
        }
    }
}

/// Spawned side: ask for a port, build a gate on it, report ready.
pub async fn worker_handshake_with_config(
    scope: &mut Scope,
    handlers: HandlerRegistry,
    config: GateConfig,
) -> Result<Gate> {
    let port = with_timeout(config.handshake_timeout, await_port(scope)).await?;
    let gate = Gate::with_config(port, handlers, config);

    // The gate is usable either way; the spawner only misses the signal.
    if let Err(e) = scope.post_message(Signal::Ready) {
        tracing::debug!("Bootstrap: {} not delivered: {}", Signal::Ready, e);
    }
    Ok(gate)
}

async fn offer_port(scope: &mut Scope, port: Port) -> Result<()> {
    let mut port = Some(port);
    scope.post_message(Signal::Start)?;
    tracing::debug!("Bootstrap: sent {}", Signal::Start);

    loop {
        let message = scope.recv_raw().await.ok_or(GateError::ChannelClosed)?;
        match message.signal() {
            Some(Signal::GetPort) => match port.take() {
                Some(port) => {
                    scope.post_message(ScopeMessage::Port(port))?;
                    tracing::debug!("Bootstrap: port handed over");
                }
                None => tracing::trace!("Bootstrap: repeated {} ignored", Signal::GetPort),
            },
            Some(Signal::Ready) if port.is_none() => return Ok(()),
            Some(signal) => tracing::trace!("Bootstrap: unexpected {} ignored", signal),
            None => scope.defer(message),
        }
    }
}

async fn await_port(scope: &mut Scope) -> Result<Port> {
    loop {
        let message = scope.recv_raw().await.ok_or(GateError::ChannelClosed)?;
        if let ScopeMessage::Port(port) = message {
            tracing::debug!("Bootstrap: port received");
            return Ok(port);
        }

        match message.signal() {
            Some(Signal::Start) => {
                scope.post_message(Signal::GetPort)?;
                tracing::debug!("Bootstrap: sent {}", Signal::GetPort);
            }
            Some(signal) => tracing::trace!("Bootstrap: unexpected {} ignored", signal),
            None => scope.defer(message),
        }
    }
}

async fn with_timeout<T, F>(limit: Option<Duration>, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match limit {
        Some(limit) => tokio::time::timeout(limit, fut)
            .await
            .map_err(|_| GateError::Timeout)?,
        None => fut.await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RemoteError;
    use serde_json::json;

    fn greeter() -> HandlerRegistry {
        let mut handlers = HandlerRegistry::new();
        handlers.register("greet", |_: ()| async { Ok::<_, RemoteError>("hi") });
        handlers
    }

    #[tokio::test]
    async fn test_handshake_connects_both_sides() {
        let (mut parent, mut child) = Scope::pair();

        let worker = tokio::spawn(async move {
            let gate = worker_handshake(&mut child, HandlerRegistry::new()).await?;
            gate.post::<String, _>("greet", &()).await
        });

        let _gate = spawner_handshake(&mut parent, greeter()).await.unwrap();
        assert_eq!(worker.await.unwrap().unwrap(), "hi");
    }

    #[tokio::test]
    async fn test_repeated_get_port_ignored() {
        let (mut parent, mut child) = Scope::pair();
        let spawner = tokio::spawn(async move {
            let gate = spawner_handshake(&mut parent, greeter()).await;
            (gate, parent)
        });

        assert_eq!(child.recv().await.and_then(|m| m.signal()), Some(Signal::Start));
        child.post_message(Signal::GetPort).unwrap();
        child.post_message(Signal::GetPort).unwrap();
        let port = match child.recv().await {
            Some(ScopeMessage::Port(port)) => port,
            other => panic!("unexpected {:?}", other),
        };
        child.post_message(Signal::Ready).unwrap();

        let (gate, parent) = spawner.await.unwrap();
        let _gate = gate.unwrap();
        parent.post(&"after").unwrap();

        // Nothing but the application message follows the single port.
        match child.recv().await {
            Some(ScopeMessage::Data(value)) => assert_eq!(value, json!("after")),
            other => panic!("unexpected {:?}", other),
        }

        let client = Gate::from_port(port);
        assert_eq!(client.post::<String, _>("greet", &()).await.unwrap(), "hi");
    }

    #[tokio::test]
    async fn test_application_messages_kept_in_backlog() {
        let (mut parent, mut child) = Scope::pair();

        // Posted before the worker starts its handshake.
        parent.post(&json!({ "config": true })).unwrap();

        let worker = tokio::spawn(async move {
            let gate = worker_handshake(&mut child, HandlerRegistry::new()).await;
            (gate, child)
        });
        let _gate = spawner_handshake(&mut parent, greeter()).await.unwrap();

        let (gate, mut child) = worker.await.unwrap();
        assert!(gate.is_ok());
        assert_eq!(child.backlog_len(), 1);
        match child.recv().await {
            Some(ScopeMessage::Data(value)) => assert_eq!(value, json!({ "config": true })),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_dropped_scope_fails_handshake() {
        let (mut parent, child) = Scope::pair();
        drop(child);

        let result = spawner_handshake(&mut parent, greeter()).await;
        assert!(matches!(result, Err(GateError::ChannelClosed)));
    }

    #[tokio::test]
    async fn test_worker_sees_spawner_go_away() {
        let (parent, mut child) = Scope::pair();
        parent.post_message(Signal::Start).unwrap();
        drop(parent);

        let result = worker_handshake(&mut child, HandlerRegistry::new()).await;
        assert!(matches!(result, Err(GateError::ChannelClosed)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_handshake_timeout() {
        let (mut parent, _child) = Scope::pair();
        let config = GateConfig {
            handshake_timeout: Some(Duration::from_secs(1)),
            ..GateConfig::default()
        };

        let result = spawner_handshake_with_config(&mut parent, greeter(), config).await;
        assert!(matches!(result, Err(GateError::Timeout)));
    }
}
