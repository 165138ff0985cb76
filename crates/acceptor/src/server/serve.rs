//! Serve — the accept loop.

use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::error::ServeError;
use crate::net::listener::is_resource_exhausted;
use crate::net::is_transient;

use super::{Bound, Server};

/// Pause before retrying accept after running out of descriptors or buffers.
const EXHAUSTED_BACKOFF: Duration = Duration::from_millis(50);

/// Fires `Stopped` however the serve cycle ends, including when the serve
/// future is dropped mid-flight or a panic unwinds through it.
struct StopGuard<'a> {
    server: &'a Server,
}

impl Drop for StopGuard<'_> {
    fn drop(&mut self) {
        self.server.tracker.close();
        self.server.stopped.fire();
    }
}

impl Server {
    /// Accept connections until `token` is cancelled, [`close`](Self::close)
    /// is called, or the listener fails.
    ///
    /// Opens the server first if needed. Returns `Ok(())` for a stop
    /// requested through `close`, [`ServeError::Cancelled`] when `token` was
    /// cancelled, and the open or accept failure otherwise. Handler failures
    /// never end the loop.
    pub async fn serve(&self, token: CancellationToken) -> Result<(), ServeError> {
        self.open().await?;

        let (bound, token) = {
            let mut state = self.state.lock().await;
            let bound = state.bound.take().ok_or(ServeError::ListenerClosed)?;
            let token = token.child_token();
            state.serve_token = Some(token.clone());
            (bound, token)
        };

        let guard = StopGuard { server: self };
        // Declared after the guard so the listener is dropped (closed) first.
        let bound = bound;

        self.serving.fire();
        let result = self.accept_loop(&bound, &token).await;

        drop(bound);
        tracing::debug!(server = %self.name, "listener closed");
        self.tracker.close();
        if self.closing.is_cancelled() {
            self.tracker.wait().await;
        }
        drop(guard);
        result
    }

    async fn accept_loop(&self, bound: &Bound, token: &CancellationToken) -> Result<(), ServeError> {
        loop {
            let accepted = tokio::select! {
                biased;
                _ = self.closing.cancelled() => {
                    self.events.info(format_args!("{} closed", self.name));
                    return Ok(());
                }
                _ = token.cancelled() => {
                    self.events.error(format_args!("{} stopped: {}", self.name, ServeError::Cancelled));
                    return Err(ServeError::Cancelled);
                }
                accepted = bound.listener.accept() => accepted,
            };

            match accepted {
                Ok((stream, remote)) => self.dispatch(bound, stream, remote, token),
                Err(err) if is_transient(&err) => {
                    self.events.warn(format_args!("{} accept temp err: {}", self.name, err));
                    if is_resource_exhausted(&err) {
                        tokio::select! {
                            _ = tokio::time::sleep(EXHAUSTED_BACKOFF) => {}
                            _ = token.cancelled() => {}
                            _ = self.closing.cancelled() => {}
                        }
                    }
                }
                Err(err) => {
                    self.events.error(format_args!("{} accept failed: {}", self.name, err));
                    return Err(ServeError::Accept(err));
                }
            }
        }
    }
}
