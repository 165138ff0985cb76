//! Server — the acceptor lifecycle: open, serve, dispatch, close.
//!
//! ```text
//!  unopened ──open──▶ opened ──serve──▶ serving ──(cancel | close | accept error)──▶ stopped
//! ```
//!
//! `Opened`, `Serving` and `Stopped` are one-shot latches; each fires once
//! and never resets.

pub mod config;
pub mod handler;
mod dispatch;
mod open;
mod serve;
mod stop;

use std::fmt;
use std::sync::Arc;

use tokio::sync::Mutex;
use tokio_rustls::TlsAcceptor;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use crate::instrument::Instrumentation;
use crate::latch::{Latch, Signal};
use crate::net::{Addr, Listener};

pub use config::ServerConfig;
pub use handler::{ConnContext, Handler};

/// An opened listener, ready for the accept loop.
pub(crate) struct Bound {
    pub(crate) listener: Listener,
    pub(crate) tls: Option<TlsAcceptor>,
    pub(crate) handler: Arc<dyn Handler>,
}

#[derive(Default)]
pub(crate) struct State {
    /// External listener from the config, until `open` adopts it.
    pub(crate) listener: Option<Listener>,
    /// Set by `open`, `None` once the accept loop has taken it.
    pub(crate) bound: Option<Bound>,
    /// Token of the running serve cycle.
    pub(crate) serve_token: Option<CancellationToken>,
}

pub struct Server {
    name: String,
    network: String,
    address: String,
    tls: Option<Arc<rustls::ServerConfig>>,
    handler: Option<Arc<dyn Handler>>,
    instrumented: bool,
    events: Arc<Instrumentation>,
    state: Mutex<State>,
    local_addr: parking_lot::Mutex<Option<Addr>>,
    /// Outstanding connection tasks.
    tracker: TaskTracker,
    /// Fired by `close`; the accept loop treats it as a clean stop.
    closing: CancellationToken,
    opened: Latch,
    serving: Latch,
    stopped: Latch,
}

impl Server {
    pub fn new(config: ServerConfig) -> Self {
        let events = Instrumentation::new(&config.name, config.instrumented, config.sink);
        Self {
            name: config.name,
            network: config.network,
            address: config.address,
            tls: config.tls,
            handler: config.handler,
            instrumented: config.instrumented,
            events: Arc::new(events),
            state: Mutex::new(State {
                listener: config.listener,
                ..State::default()
            }),
            local_addr: parking_lot::Mutex::new(None),
            tracker: TaskTracker::new(),
            closing: CancellationToken::new(),
            opened: Latch::new(),
            serving: Latch::new(),
            stopped: Latch::new(),
        }
    }

    pub fn builder() -> ServerConfig {
        ServerConfig::new()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Bound address, known once the server is opened.
    pub fn local_addr(&self) -> Option<Addr> {
        self.local_addr.lock().clone()
    }

    /// Connection tasks currently running.
    pub fn active_connections(&self) -> usize {
        self.tracker.len()
    }

    pub fn opened(&self) -> Signal {
        self.opened.signal()
    }

    pub fn serving(&self) -> Signal {
        self.serving.signal()
    }

    pub fn stopped(&self) -> Signal {
        self.stopped.signal()
    }

    pub fn is_opened(&self) -> bool {
        self.opened.has_fired()
    }

    pub fn is_serving(&self) -> bool {
        self.serving.has_fired()
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.has_fired()
    }
}

impl fmt::Debug for Server {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Server")
            .field("name", &self.name)
            .field("network", &self.network)
            .field("address", &self.address)
            .field("local_addr", &self.local_addr())
            .field("tls", &self.tls.is_some())
            .field("opened", &self.is_opened())
            .field("serving", &self.is_serving())
            .field("stopped", &self.is_stopped())
            .field("active_connections", &self.active_connections())
            .finish()
    }
}
