//! Handler registry mapping actions to handlers.
//!
//! Each action has at most one handler; registering again replaces it.
//!
//! # Example
//!
//! ```
//! use message_gate::handler::HandlerRegistry;
//! use message_gate::RemoteError;
//!
//! let mut registry = HandlerRegistry::new();
//! registry.register("add", |n: i64| async move { Ok::<_, RemoteError>(n + 1) });
//!
//! assert!(registry.contains(&"add".into()));
//! ```

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::marker::PhantomData;
use std::pin::Pin;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;

use super::{Reply, Request};
use crate::error::RemoteError;
use crate::protocol::Action;

/// Result type for handler functions.
pub type HandlerResult = std::result::Result<Reply, RemoteError>;

/// Boxed future for handler results.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Trait for handlers.
///
/// `call` runs synchronously on the dispatch loop, in arrival order. The
/// returned future is first polled in that same order and then driven
/// concurrently with later messages by the gate's dispatch task.
pub trait Handler: Send + Sync + 'static {
    /// Handle a request.
    fn call(&self, request: Request) -> BoxFuture<'static, HandlerResult>;
}

/// Handler that deserializes the payload, calls a typed function and
/// serializes its result.
///
/// Resources transferred with the request are dropped; use a
/// [`RequestHandler`] to receive them.
pub struct TypedHandler<F, T, R, Fut> {
    handler: F,
    _phantom: PhantomData<fn(T) -> (R, Fut)>,
}

impl<F, T, R, Fut> TypedHandler<F, T, R, Fut>
where
    F: Fn(T) -> Fut + Send + Sync + 'static,
    T: DeserializeOwned + Send + 'static,
    R: Serialize + Send + 'static,
    Fut: Future<Output = std::result::Result<R, RemoteError>> + Send + 'static,
{
    /// Create a new typed handler.
    pub fn new(handler: F) -> Self {
        Self {
            handler,
            _phantom: PhantomData,
        }
    }
}

impl<F, T, R, Fut> Handler for TypedHandler<F, T, R, Fut>
where
    F: Fn(T) -> Fut + Send + Sync + 'static,
    T: DeserializeOwned + Send + 'static,
    R: Serialize + Send + 'static,
    Fut: Future<Output = std::result::Result<R, RemoteError>> + Send + 'static,
{
    fn call(&self, request: Request) -> BoxFuture<'static, HandlerResult> {
        let parsed: T = match request.parse() {
            Ok(v) => v,
            Err(e) => return Box::pin(async move { Err(e) }),
        };
        if request.transfer_len() > 0 {
            tracing::warn!(
                "Typed handler for {} dropped {} transferred resource(s)",
                request.action(),
                request.transfer_len()
            );
        }

        let fut = (self.handler)(parsed);
        Box::pin(async move {
            let value = fut.await?;
            Reply::value(&value)
        })
    }
}

/// Handler that receives the whole [`Request`] and returns a [`Reply`].
pub struct RequestHandler<F> {
    handler: F,
}

impl<F, Fut> RequestHandler<F>
where
    F: Fn(Request) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    /// Create a new request handler.
    pub fn new(handler: F) -> Self {
        Self { handler }
    }
}

impl<F, Fut> Handler for RequestHandler<F>
where
    F: Fn(Request) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    fn call(&self, request: Request) -> BoxFuture<'static, HandlerResult> {
        Box::pin((self.handler)(request))
    }
}

/// Registry mapping actions to handlers.
#[derive(Clone, Default)]
pub struct HandlerRegistry {
    handlers: HashMap<Action, Arc<dyn Handler>>,
}

impl HandlerRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a typed handler.
    pub fn register<F, T, R, Fut>(&mut self, action: impl Into<Action>, handler: F)
    where
        F: Fn(T) -> Fut + Send + Sync + 'static,
        T: DeserializeOwned + Send + 'static,
        R: Serialize + Send + 'static,
        Fut: Future<Output = std::result::Result<R, RemoteError>> + Send + 'static,
    {
        self.insert(action, Arc::new(TypedHandler::new(handler)));
    }

    /// Register a handler that sees the whole request, transfers included.
    pub fn register_request<F, Fut>(&mut self, action: impl Into<Action>, handler: F)
    where
        F: Fn(Request) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        self.insert(action, Arc::new(RequestHandler::new(handler)));
    }

    /// Insert a handler, replacing any previous one for the action.
    pub fn insert(&mut self, action: impl Into<Action>, handler: Arc<dyn Handler>) {
        self.handlers.insert(action.into(), handler);
    }

    /// Remove the handler for an action.
    pub fn remove(&mut self, action: &Action) -> bool {
        self.handlers.remove(action).is_some()
    }

    /// Remove all handlers.
    pub fn clear(&mut self) {
        self.handlers.clear();
    }

    /// Get the handler for an action.
    pub fn get(&self, action: &Action) -> Option<Arc<dyn Handler>> {
        self.handlers.get(action).cloned()
    }

    /// Whether an action has a handler.
    pub fn contains(&self, action: &Action) -> bool {
        self.handlers.contains_key(action)
    }

    /// Number of registered actions.
    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    /// Whether no action is registered.
    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// Registered actions, in no particular order.
    pub fn actions(&self) -> impl Iterator<Item = &Action> {
        self.handlers.keys()
    }
}

impl fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.handlers.keys()).finish()
    }
}

impl<A: Into<Action>> FromIterator<(A, Arc<dyn Handler>)> for HandlerRegistry {
    fn from_iter<I: IntoIterator<Item = (A, Arc<dyn Handler>)>>(iter: I) -> Self {
        let mut registry = Self::new();
        for (action, handler) in iter {
            registry.insert(action, handler);
        }
        registry
    }
}
