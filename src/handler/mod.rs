//! Handler module - what runs when a message arrives.
//!
//! Provides:
//! - [`HandlerRegistry`] - maps actions to handlers
//! - [`Request`] / [`Reply`] / [`Response`] - handler input and output
//!
//! # Example
//!
//! ```
//! use message_gate::handler::{HandlerRegistry, Reply, Request};
//! use message_gate::RemoteError;
//!
//! let mut registry = HandlerRegistry::new();
//!
//! // Typed: payload deserialized, result serialized.
//! registry.register("add", |n: i64| async move { Ok::<_, RemoteError>(n + 1) });
//!
//! // Raw: sees transferred resources and can hand some back.
//! registry.register_request("swap", |mut req: Request| async move {
//!     let resources = req.take_transfer();
//!     Ok(Reply::empty().with_transfer(resources))
//! });
//! ```

mod registry;
mod request;

pub use registry::{BoxFuture, Handler, HandlerRegistry, HandlerResult, RequestHandler, TypedHandler};
pub use request::{Reply, Request, Response};
