//! # message-gate
//!
//! Action-based messaging over one duplex channel.
//!
//! A [`Gate`] sits on one end of a channel and turns it into:
//! - fire-and-forget messages ([`Gate::send`])
//! - requests with one answer each ([`Gate::post`])
//! - requests that move resources, such as buffers or further channel ends,
//!   to the peer and back ([`Gate::post_with_transfer`], [`Gate::get_transfer`],
//!   [`Gate::bi_transfer`])
//!
//! ## Architecture
//!
//! - **Transport**: [`Port`] pairs in process, or [`Port::from_stream`] over
//!   any byte stream (MsgPack envelopes in length-prefixed frames)
//! - **Gate**: handler registry, pending-request table, one dispatch task
//! - **Bootstrap**: a three-step handshake over a [`Scope`] that hands a
//!   spawned context its channel end
//!
//! ## Example
//!
//! ```
//! use message_gate::{Gate, RemoteError};
//!
//! #[tokio::main]
//! async fn main() -> message_gate::Result<()> {
//!     let server = Gate::builder()
//!         .on("add", |n: i64| async move { Ok::<_, RemoteError>(n + 1) })
//!         .standalone();
//!     let client = Gate::from_port(server.take_side_port().unwrap());
//!
//!     let answer: i64 = client.post("add", &41).await?;
//!     assert_eq!(answer, 42);
//!
//!     client.close();
//!     Ok(())
//! }
//! ```

pub mod bootstrap;
pub mod codec;
pub mod error;
pub mod gate;
pub mod handler;
pub mod protocol;
pub mod transport;

pub use bootstrap::{spawner_handshake, worker_handshake, Scope, ScopeMessage, Signal};
pub use error::{GateError, RemoteError, RemoteErrorKind, Result};
pub use gate::{Gate, GateBuilder, GateConfig, GateState};
pub use handler::{HandlerRegistry, Reply, Request, Response};
pub use protocol::Action;
pub use transport::{Port, StreamConfig, TransferList, Transferable};
