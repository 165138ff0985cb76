//! Config — builder for `Server`.

use std::fmt;
use std::sync::Arc;

use crate::instrument::EventSink;
use crate::net::{Accept, Listener};

use super::handler::Handler;
use super::Server;

pub const DEFAULT_NAME: &str = "tcpserver";
pub const DEFAULT_NETWORK: &str = "tcp";

/// Server options. Degenerate values (empty strings) are ignored so they
/// never clobber an earlier setting; otherwise the last call wins.
pub struct ServerConfig {
    pub(crate) name: String,
    pub(crate) network: String,
    pub(crate) address: String,
    pub(crate) listener: Option<Listener>,
    pub(crate) tls: Option<Arc<rustls::ServerConfig>>,
    pub(crate) handler: Option<Arc<dyn Handler>>,
    pub(crate) instrumented: bool,
    pub(crate) sink: Option<Arc<dyn EventSink>>,
}

impl ServerConfig {
    pub fn new() -> Self {
        Self {
            name: DEFAULT_NAME.to_string(),
            network: DEFAULT_NETWORK.to_string(),
            address: String::new(),
            listener: None,
            tls: None,
            handler: None,
            instrumented: false,
            sink: None,
        }
    }

    /// Display name used as the prefix of every event message.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        let name = name.into();
        if !name.is_empty() {
            self.name = name;
        }
        self
    }

    /// Network family: `tcp` (alias `stream`), `tcp4`, `tcp6` or `unix`.
    /// Validated when the server opens.
    pub fn network(mut self, network: impl Into<String>) -> Self {
        let network = network.into();
        if !network.is_empty() {
            self.network = network;
        }
        self
    }

    pub fn address(mut self, address: impl Into<String>) -> Self {
        let address = address.into();
        if !address.is_empty() {
            self.address = address;
        }
        self
    }

    /// Serve on an already-bound listener instead of binding one.
    /// Ownership moves into the server; network and address are then unused.
    pub fn listener(mut self, listener: impl Accept) -> Self {
        self.listener = Some(Box::new(listener));
        self
    }

    /// Terminate TLS on every accepted connection.
    pub fn tls(mut self, tls: Arc<rustls::ServerConfig>) -> Self {
        self.tls = Some(tls);
        self
    }

    pub fn handler(mut self, handler: impl Handler) -> Self {
        self.handler = Some(Arc::new(handler));
        self
    }

    /// Same as [`handler`](Self::handler) for a handler shared elsewhere.
    pub fn shared_handler(mut self, handler: Arc<dyn Handler>) -> Self {
        self.handler = Some(handler);
        self
    }

    /// Enable per-connection spans and delivery of events to the sink.
    pub fn instrumented(mut self, flag: bool) -> Self {
        self.instrumented = flag;
        self
    }

    /// Where events go. Only consulted while instrumentation is enabled.
    pub fn event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn build(self) -> Server {
        Server::new(self)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ServerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerConfig")
            .field("name", &self.name)
            .field("network", &self.network)
            .field("address", &self.address)
            .field("listener", &self.listener.is_some())
            .field("tls", &self.tls.is_some())
            .field("handler", &self.handler.is_some())
            .field("instrumented", &self.instrumented)
            .field("sink", &self.sink.is_some())
            .finish()
    }
}
