//! Fluent gate construction.
//!
//! # Example
//!
//! ```
//! use std::time::Duration;
//! use message_gate::{Gate, RemoteError};
//!
//! #[tokio::main]
//! async fn main() {
//!     let gate = Gate::builder()
//!         .on("echo", |text: String| async move { Ok::<_, RemoteError>(text) })
//!         .request_timeout(Duration::from_secs(5))
//!         .standalone();
//!
//!     let client = Gate::from_port(gate.take_side_port().unwrap());
//!     let echoed: String = client.post("echo", "hi").await.unwrap();
//!     assert_eq!(echoed, "hi");
//! }
//! ```

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;

use super::{lock, Gate, GateConfig};
use crate::bootstrap::{self, Scope};
use crate::error::{RemoteError, Result};
use crate::handler::{Handler, HandlerRegistry, HandlerResult, Request};
use crate::protocol::Action;
use crate::transport::Port;

/// Builder for configuring and creating a [`Gate`].
pub struct GateBuilder {
    registry: HandlerRegistry,
    config: GateConfig,
}

impl GateBuilder {
    /// Create a new gate builder.
    pub fn new() -> Self {
        Self {
            registry: HandlerRegistry::new(),
            config: GateConfig::default(),
        }
    }

    /// Register a typed handler.
    pub fn on<F, T, R, Fut>(mut self, action: impl Into<Action>, handler: F) -> Self
    where
        F: Fn(T) -> Fut + Send + Sync + 'static,
        T: DeserializeOwned + Send + 'static,
        R: Serialize + Send + 'static,
        Fut: Future<Output = std::result::Result<R, RemoteError>> + Send + 'static,
    {
        self.registry.register(action, handler);
        self
    }

    /// Register a handler that sees the whole request.
    pub fn on_request<F, Fut>(mut self, action: impl Into<Action>, handler: F) -> Self
    where
        F: Fn(Request) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        self.registry.register_request(action, handler);
        self
    }

    /// Register an already boxed handler.
    pub fn on_handler(mut self, action: impl Into<Action>, handler: Arc<dyn Handler>) -> Self {
        self.registry.insert(action, handler);
        self
    }

    /// Add every handler of `registry`, replacing same-action ones.
    pub fn handlers(mut self, registry: HandlerRegistry) -> Self {
        for action in registry.actions() {
            if let Some(handler) = registry.get(action) {
                self.registry.insert(action, handler);
            }
        }
        self
    }

    /// Give up on requests after `timeout`.
    ///
    /// Default: no timeout
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.config.request_timeout = Some(timeout);
        self
    }

    /// Answer requests for unknown actions with an error instead of
    /// dropping them.
    ///
    /// Default: false
    pub fn reject_unhandled(mut self, reject: bool) -> Self {
        self.config.reject_unhandled = reject;
        self
    }

    /// Give up on the bootstrap handshake after `timeout`.
    ///
    /// Default: no timeout
    pub fn handshake_timeout(mut self, timeout: Duration) -> Self {
        self.config.handshake_timeout = Some(timeout);
        self
    }

    /// Replace the whole configuration.
    pub fn config(mut self, config: GateConfig) -> Self {
        self.config = config;
        self
    }

    /// Build a gate over `port`.
    pub fn build(self, port: Port) -> Gate {
        Gate::with_config(port, self.registry, self.config)
    }

    /// Build a gate on a fresh pair of ports, keeping the other half for
    /// [`Gate::take_side_port`].
    pub fn standalone(self) -> Gate {
        let (gate, port) = self.channel();
        *lock(&gate.inner.side_port) = Some(port);
        gate
    }

    /// Build a gate on a fresh pair of ports, returning the other half.
    pub fn channel(self) -> (Gate, Port) {
        Gate::channel(self.registry, self.config)
    }

    /// Run the spawning side of the bootstrap handshake over `scope`.
    pub async fn spawner_handshake(self, scope: &mut Scope) -> Result<Gate> {
        bootstrap::spawner_handshake_with_config(scope, self.registry, self.config).await
    }

    /// Run the spawned side of the bootstrap handshake over `scope`.
    pub async fn worker_handshake(self, scope: &mut Scope) -> Result<Gate> {
        bootstrap::worker_handshake_with_config(scope, self.registry, self.config).await
    }
}

impl Default for GateBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_configuration() {
        let builder = Gate::builder()
            .request_timeout(Duration::from_secs(10))
            .reject_unhandled(true)
            .handshake_timeout(Duration::from_secs(1));

        assert_eq!(builder.config.request_timeout, Some(Duration::from_secs(10)));
        assert!(builder.config.reject_unhandled);
        assert_eq!(builder.config.handshake_timeout, Some(Duration::from_secs(1)));
    }

    #[test]
    fn test_builder_method_chaining() {
        let builder = GateBuilder::default()
            .on("echo", |s: String| async move { Ok::<_, RemoteError>(s) })
            .on_request("raw", |_req: Request| async { Ok(crate::handler::Reply::empty()) })
            .on(3i64, |_: ()| async { Ok::<_, RemoteError>(()) });

        assert!(builder.registry.contains(&"echo".into()));
        assert!(builder.registry.contains(&"raw".into()));
        assert!(builder.registry.contains(&Action::Code(3)));
    }

    #[test]
    fn test_handlers_merge() {
        let mut extra = HandlerRegistry::new();
        extra.register("a", |_: ()| async { Ok::<_, RemoteError>(()) });
        extra.register("b", |_: ()| async { Ok::<_, RemoteError>(()) });

        let builder = Gate::builder()
            .on("c", |_: ()| async { Ok::<_, RemoteError>(()) })
            .handlers(extra);

        assert_eq!(builder.registry.len(), 3);
    }

    #[tokio::test]
    async fn test_build_over_port() {
        let (a, b) = Port::pair();
        let server = Gate::builder()
            .on("double", |n: i64| async move { Ok::<_, RemoteError>(n * 2) })
            .build(a);
        let client = Gate::builder().build(b);

        let answer: i64 = client.post("double", &21).await.unwrap();
        assert_eq!(answer, 42);
        assert!(server.has_handler("double"));
    }
}
