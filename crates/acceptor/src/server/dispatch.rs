//! Dispatch — one tracked task per accepted connection.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{Instrument, Span};

use crate::net::{Addr, Connection, Stream};

use super::handler::ConnContext;
use super::{Bound, Server};

impl Server {
    /// Spawn the handler for `stream` on the task tracker.
    ///
    /// The tracker counts the task from this call until the task finishes,
    /// panics, or is aborted, so `close` cannot miss it.
    pub(super) fn dispatch(&self, bound: &Bound, stream: Stream, remote: Addr, token: &CancellationToken) {
        let span = if self.instrumented {
            tracing::info_span!("conn", server = %self.name, remote = %remote)
        } else {
            Span::none()
        };
        let ctx = ConnContext::new(token.clone(), remote.clone(), span.clone());
        let handler = Arc::clone(&bound.handler);
        let tls = bound.tls.clone();
        let events = Arc::clone(&self.events);

        self.tracker.spawn(
            async move {
                tracing::debug!("connection accepted");
                let conn = match tls {
                    Some(acceptor) => {
                        // The handshake is ours, not the handler's, so it must yield to close.
                        let handshake = tokio::select! {
                            _ = ctx.cancelled() => {
                                events.info(format_args!("client ({}) TLS handshake abandoned: server stopping", remote));
                                return;
                            }
                            handshake = acceptor.accept(stream) => handshake,
                        };
                        match handshake {
                            Ok(tls_stream) => Connection::tls(tls_stream, remote.clone()),
                            Err(e) => {
                                events.error(format_args!("client ({}) TLS handshake failed: {}", remote, e));
                                return;
                            }
                        }
                    }
                    None => Connection::plain(stream, remote.clone()),
                };

                if let Err(e) = handler.call(ctx, conn).await {
                    events.error(format_args!("client ({}) failed: {}", remote, e));
                }
                tracing::debug!("connection finished");
            }
            .instrument(span),
        );
    }
}

#[cfg(test)]
mod tests {
    use std::io;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    use tokio::io::AsyncWriteExt;
    use tokio::net::TcpStream;
    use tokio::time::timeout;
    use tokio_util::sync::CancellationToken;

    use crate::error::BoxError;
    use crate::instrument::EventLog;
    use crate::net::{Addr, Connection};
    use crate::server::{ConnContext, ServerConfig};
    use crate::testing::{eventually, ping, spawn_serve, tls_pair, WAIT};

    #[tokio::test]
    async fn test_handler_error_is_reported_with_peer() {
        let log = Arc::new(EventLog::default());
        let server = Arc::new(
            ServerConfig::new()
                .address("127.0.0.1:0")
                .handler(|_ctx: ConnContext, _conn: Connection| async {
                    Err::<(), _>(io::Error::new(io::ErrorKind::InvalidData, "bad frame"))
                })
                .instrumented(true)
                .event_sink(log.clone())
                .build(),
        );
        let handle = spawn_serve(&server, CancellationToken::new());
        timeout(WAIT, server.serving().wait()).await.unwrap();
        let addr = server.local_addr().and_then(|a| a.as_inet()).unwrap();

        let client = TcpStream::connect(addr).await.unwrap();
        let peer = client.local_addr().unwrap();
        eventually(|| !log.errors().is_empty()).await;

        let stopped = timeout(WAIT, server.close()).await.unwrap();
        timeout(WAIT, stopped.wait()).await.unwrap();

        let errors = log.errors();
        assert_eq!(errors.len(), 1, "{:?}", errors);
        assert_eq!(errors[0].message, format!("client ({}) failed: bad frame", peer));
        assert!(timeout(WAIT, handle).await.unwrap().unwrap().is_ok(), "handler errors never end serve");
    }

    #[tokio::test]
    async fn test_handler_panic_is_still_drained() {
        let entered = Arc::new(AtomicUsize::new(0));
        let server = Arc::new(
            ServerConfig::new()
                .address("127.0.0.1:0")
                .handler({
                    let entered = Arc::clone(&entered);
                    move |_ctx: ConnContext, _conn: Connection| {
                        entered.fetch_add(1, Ordering::SeqCst);
                        async {
                            if true {
                                panic!("handler bug");
                            }
                            Ok::<(), BoxError>(())
                        }
                    }
                })
                .build(),
        );
        let handle = spawn_serve(&server, CancellationToken::new());
        timeout(WAIT, server.serving().wait()).await.unwrap();
        let addr = server.local_addr().and_then(|a| a.as_inet()).unwrap();

        let _client = TcpStream::connect(addr).await.unwrap();
        eventually(|| entered.load(Ordering::SeqCst) == 1).await;

        let stopped = timeout(WAIT, server.close()).await.expect("panicking task must not block close");
        timeout(WAIT, stopped.wait()).await.unwrap();
        assert_eq!(server.active_connections(), 0);
        assert!(timeout(WAIT, handle).await.unwrap().unwrap().is_ok());
    }

    #[tokio::test]
    async fn test_context_carries_peer_and_serve_token() {
        let seen = Arc::new(AtomicUsize::new(0));
        let server = Arc::new(
            ServerConfig::new()
                .address("127.0.0.1:0")
                .handler({
                    let seen = Arc::clone(&seen);
                    move |ctx: ConnContext, mut conn: Connection| {
                        let seen = Arc::clone(&seen);
                        async move {
                            assert_eq!(ctx.remote_addr(), conn.remote_addr());
                            assert!(matches!(ctx.remote_addr(), Addr::Inet(_)));
                            seen.fetch_add(1, Ordering::SeqCst);
                            conn.write_all(b"ready\n").await?;
                            ctx.cancelled().await;
                            Ok::<(), BoxError>(())
                        }
                    }
                })
                .build(),
        );
        let token = CancellationToken::new();
        let handle = spawn_serve(&server, token.clone());
        timeout(WAIT, server.serving().wait()).await.unwrap();
        let addr = server.local_addr().and_then(|a| a.as_inet()).unwrap();

        assert_eq!(timeout(WAIT, ping(addr, "")).await.unwrap(), "ready");
        assert_eq!(seen.load(Ordering::SeqCst), 1);
        assert_eq!(server.active_connections(), 1);

        // Cancelling serve reaches the handler through its context.
        token.cancel();
        assert!(timeout(WAIT, handle).await.unwrap().unwrap().is_err());
        timeout(WAIT, server.close()).await.unwrap();
        assert_eq!(server.active_connections(), 0);
    }

    #[tokio::test]
    async fn test_tls_echo_round_trip() {
        let (server_tls, connector) = tls_pair();
        let server = Arc::new(
            ServerConfig::new()
                .address("127.0.0.1:0")
                .tls(server_tls)
                .handler(|_ctx: ConnContext, conn: Connection| async move {
                    assert!(conn.is_tls());
                    assert!(conn.tls_session().is_some());
                    crate::testing::echo_once(_ctx, conn).await
                })
                .build(),
        );
        let handle = spawn_serve(&server, CancellationToken::new());
        timeout(WAIT, server.serving().wait()).await.unwrap();
        let addr = server.local_addr().and_then(|a| a.as_inet()).unwrap();

        let reply = timeout(WAIT, crate::testing::ping_tls(&connector, addr, "secure ping"))
            .await
            .unwrap();
        assert_eq!(reply, "secure ping");

        timeout(WAIT, server.close()).await.unwrap();
        assert!(timeout(WAIT, handle).await.unwrap().unwrap().is_ok());
    }

    #[tokio::test]
    async fn test_failed_tls_handshake_skips_handler() {
        let (server_tls, _connector) = tls_pair();
        let calls = Arc::new(AtomicUsize::new(0));
        let log = Arc::new(EventLog::default());
        let server = Arc::new(
            ServerConfig::new()
                .address("127.0.0.1:0")
                .tls(server_tls)
                .handler({
                    let calls = Arc::clone(&calls);
                    move |_ctx: ConnContext, _conn: Connection| {
                        calls.fetch_add(1, Ordering::SeqCst);
                        async { Ok::<(), BoxError>(()) }
                    }
                })
                .instrumented(true)
                .event_sink(log.clone())
                .build(),
        );
        let handle = spawn_serve(&server, CancellationToken::new());
        timeout(WAIT, server.serving().wait()).await.unwrap();
        let addr = server.local_addr().and_then(|a| a.as_inet()).unwrap();

        let mut plain = TcpStream::connect(addr).await.unwrap();
        plain.write_all(b"this is not a client hello\r\n\r\n").await.unwrap();
        drop(plain);
        eventually(|| !log.errors().is_empty()).await;

        timeout(WAIT, server.close()).await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert!(log.errors().iter().any(|e| e.message.contains("TLS handshake failed")));
        assert!(timeout(WAIT, handle).await.unwrap().unwrap().is_ok());
    }

    #[tokio::test]
    async fn test_close_abandons_stalled_tls_handshake() {
        let (server_tls, _connector) = tls_pair();
        let calls = Arc::new(AtomicUsize::new(0));
        let log = Arc::new(EventLog::default());
        let server = Arc::new(
            ServerConfig::new()
                .address("127.0.0.1:0")
                .tls(server_tls)
                .handler({
                    let calls = Arc::clone(&calls);
                    move |ctx: ConnContext, conn: Connection| {
                        calls.fetch_add(1, Ordering::SeqCst);
                        crate::testing::echo_once(ctx, conn)
                    }
                })
                .instrumented(true)
                .event_sink(log.clone())
                .build(),
        );
        let handle = spawn_serve(&server, CancellationToken::new());
        timeout(WAIT, server.serving().wait()).await.unwrap();
        let addr = server.local_addr().and_then(|a| a.as_inet()).unwrap();

        // Connected but silent: no ClientHello ever arrives.
        let silent = TcpStream::connect(addr).await.unwrap();
        eventually(|| server.active_connections() == 1).await;

        let stopped = timeout(Duration::from_secs(3), server.close())
            .await
            .expect("close must not wait on a stalled handshake");
        timeout(WAIT, stopped.wait()).await.unwrap();
        assert_eq!(server.active_connections(), 0);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert!(log
            .events()
            .iter()
            .any(|e| e.message.contains("TLS handshake abandoned")));
        assert!(timeout(WAIT, handle).await.unwrap().unwrap().is_ok());
        drop(silent);
    }
}
