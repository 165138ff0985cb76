//! Handler — the per-connection capability and its context.

use std::future::Future;

use futures_util::future::BoxFuture;
use tokio_util::sync::CancellationToken;
use tracing::Span;

use crate::error::BoxError;
use crate::net::{Addr, Connection};

/// Context passed to every handler invocation.
///
/// Valid for the whole invocation. The token is the serve-scoped one: it is
/// cancelled when the caller cancels `serve` or when `close` is requested.
/// Handlers are never interrupted by the server; watching the token is up
/// to them.
#[derive(Debug, Clone)]
pub struct ConnContext {
    token: CancellationToken,
    remote: Addr,
    span: Span,
}

impl ConnContext {
    pub(crate) fn new(token: CancellationToken, remote: Addr, span: Span) -> Self {
        Self { token, remote, span }
    }

    pub fn remote_addr(&self) -> &Addr {
        &self.remote
    }

    /// Per-connection span; disabled unless the server is instrumented.
    pub fn span(&self) -> &Span {
        &self.span
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    pub async fn cancelled(&self) {
        self.token.cancelled().await
    }
}

/// Connection handling logic supplied by the embedder.
///
/// Invoked at most once per accepted connection. Implemented for any
/// `Fn(ConnContext, Connection) -> impl Future<Output = Result<(), E>>`, so
/// plain `async fn`s can be passed directly.
pub trait Handler: Send + Sync + 'static {
    fn call(&self, ctx: ConnContext, conn: Connection) -> BoxFuture<'static, Result<(), BoxError>>;
}

impl<F, Fut, E> Handler for F
where
    F: Fn(ConnContext, Connection) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), E>> + Send + 'static,
    E: Into<BoxError>,
{
    fn call(&self, ctx: ConnContext, conn: Connection) -> BoxFuture<'static, Result<(), BoxError>> {
        let fut = self(ctx, conn);
        Box::pin(async move { fut.await.map_err(Into::into) })
    }
}
