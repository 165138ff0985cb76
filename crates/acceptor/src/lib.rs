//! Connection acceptor — listener setup, concurrent dispatch, optional TLS
//! termination and graceful drain-on-shutdown for stream servers.
//!
//! ```ignore
//! use std::sync::Arc;
//! use acceptor::{Server, ServerConfig};
//! use tokio_util::sync::CancellationToken;
//!
//! let server = Arc::new(
//!     ServerConfig::new()
//!         .address("127.0.0.1:8080")
//!         .handler(echo)
//!         .build(),
//! );
//! let token = CancellationToken::new();
//! tokio::spawn({
//!     let server = Arc::clone(&server);
//!     async move { server.serve(token).await }
//! });
//! server.serving().wait().await;
//! // ...
//! server.close().await.wait().await;
//! ```

// Core infrastructure
pub mod error;
pub mod instrument;
pub mod latch;
pub mod net;

// Lifecycle
pub mod server;

#[cfg(test)]
mod testing;

pub use error::{BoxError, ConfigError, ServeError};
pub use instrument::{Event, EventLevel, EventLog, EventSink, NoopSink};
pub use latch::{Latch, Signal};
pub use net::{Accept, Addr, Connection, Listener, Network, Stream};
pub use server::{ConnContext, Handler, Server, ServerConfig};
