//! Bootstrap: hand a fresh channel end to a context that has none.
//!
//! Before two gates can talk, one side must get its [`Port`](crate::Port)
//! to the other. The only channel available at that point is a [`Scope`]
//! shared with the spawned context. Both sides run one call:
//!
//! ```
//! use message_gate::bootstrap::{spawner_handshake, worker_handshake, Scope};
//! use message_gate::{HandlerRegistry, RemoteError};
//!
//! #[tokio::main]
//! async fn main() -> message_gate::Result<()> {
//!     let (mut parent, mut child) = Scope::pair();
//!
//!     let worker = tokio::spawn(async move {
//!         let gate = worker_handshake(&mut child, HandlerRegistry::new()).await?;
//!         gate.post::<String, _>("greet", &()).await
//!     });
//!
//!     let mut handlers = HandlerRegistry::new();
//!     handlers.register("greet", |_: ()| async { Ok::<_, RemoteError>("hi") });
//!     let _gate = spawner_handshake(&mut parent, handlers).await?;
//!
//!     assert_eq!(worker.await.unwrap()?, "hi");
//!     Ok(())
//! }
//! ```

mod handshake;
mod scope;

pub use handshake::{
    spawner_handshake, spawner_handshake_with_config, worker_handshake,
    worker_handshake_with_config,
};
pub use scope::{Scope, ScopeMessage, Signal};
