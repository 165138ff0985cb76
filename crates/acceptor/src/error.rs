//! Error — failures surfaced by `Server::open` and `Server::serve`.

use std::io;
use thiserror::Error;

/// Error type returned by connection handlers.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Invalid or incomplete server configuration. Detected before any
/// resource is acquired.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("connection handler required")]
    MissingHandler,
    #[error("unsupported network: {0:?}")]
    UnsupportedNetwork(String),
}

/// Terminal outcome of a serve cycle.
///
/// Per-connection failures never show up here; they are reported through
/// the event sink and the `tracing` log only.
#[derive(Error, Debug)]
pub enum ServeError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("failed to listen on {network}:{address}: {source}")]
    Bind {
        network: String,
        address: String,
        #[source]
        source: io::Error,
    },

    #[error("serve cancelled")]
    Cancelled,

    #[error("accept failed: {0}")]
    Accept(#[source] io::Error),

    /// The listener was already consumed by an earlier or concurrent serve cycle.
    #[error("listener closed")]
    ListenerClosed,
}

impl ServeError {
    pub fn is_config(&self) -> bool {
        matches!(self, ServeError::Config(_))
    }

    pub fn is_bind(&self) -> bool {
        matches!(self, ServeError::Bind { .. })
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, ServeError::Cancelled)
    }

    /// Listener-level failure: a terminal accept error or a closed listener.
    pub fn is_listener(&self) -> bool {
        matches!(self, ServeError::Accept(_) | ServeError::ListenerClosed)
    }
}
