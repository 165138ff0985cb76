//! Stop — graceful shutdown.

use crate::latch::{Latch, Signal};

use super::Server;

impl Server {
    /// Stop accepting and wait for every dispatched connection to finish.
    ///
    /// If the server never reached serving, nothing happens and an
    /// already-fired signal is returned. Otherwise the accept loop is told to
    /// close the listener, the serve-scoped token is cancelled, and this
    /// call waits until the accept loop has exited and all handlers have
    /// returned. There is no per-connection timeout: a handler that never
    /// returns keeps `close` pending.
    ///
    /// Safe to call concurrently with `serve` and more than once. The
    /// returned signal is `Stopped`.
    pub async fn close(&self) -> Signal {
        if !self.serving.has_fired() {
            return Latch::fired().signal();
        }

        self.closing.cancel();
        if let Some(token) = self.state.lock().await.serve_token.as_ref() {
            token.cancel();
        }

        tracing::debug!(
            server = %self.name,
            active = self.tracker.len(),
            "draining connections"
        );
        self.tracker.wait().await;
        self.stopped.signal()
    }
}
