//! Serve — build the acceptor from config and run it until shutdown.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::task::JoinError;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use acceptor::{ConnContext, Connection, EventLog, ServeError, Server};

use crate::conf::EchoConfig;
use crate::runtime::stop::shutdown_signal;
use crate::session::Session;

/// Build an unopened server from the configuration.
///
/// Events go to `events` when `server.instrumented` is set.
pub fn build_server(config: &EchoConfig, events: Arc<EventLog>) -> Result<Server> {
    let session = Arc::new(Session::new(&config.echo));

    let mut builder = Server::builder()
        .name(config.server.name.as_str())
        .network(config.server.network.as_str())
        .address(config.server.address.as_str())
        .instrumented(config.server.instrumented)
        .event_sink(events)
        .handler(move |ctx: ConnContext, conn: Connection| {
            let session = Arc::clone(&session);
            async move { session.run(ctx, conn).await }
        });

    if config.tls.enabled {
        info!("Loading TLS certificates...");
        let tls = config
            .tls
            .build_rustls_config()
            .context("Failed to load TLS certificates")?;
        info!("✓ TLS certificates loaded successfully");
        if config.tls.client_ca_path.is_some() {
            info!("✓ mTLS enabled - client certificates required");
        }
        builder = builder.tls(tls);
    }

    Ok(builder.build())
}

/// Open the listener, serve until Ctrl+C / SIGTERM, then drain.
pub async fn run(config: EchoConfig) -> Result<()> {
    let events = Arc::new(EventLog::default());
    let server = Arc::new(build_server(&config, Arc::clone(&events))?);

    // Bind up front so a bad address fails before the banner
    server.open().await.context("Failed to open listener")?;

    let token = CancellationToken::new();
    let mut serve = tokio::spawn({
        let server = Arc::clone(&server);
        let token = token.clone();
        async move { server.serve(token).await }
    });

    let serving = server.serving();
    tokio::select! {
        _ = serving.wait() => {}
        result = &mut serve => return finish(result),
    }

    let local = server
        .local_addr()
        .map(|addr| addr.to_string())
        .unwrap_or_else(|| config.server.address.clone());
    info!("");
    info!("========================================");
    info!("Echo server '{}' is ready!", server.name());
    info!(
        "Listening on: {}:{}{}",
        config.server.network,
        local,
        if config.tls.enabled { " (TLS enabled)" } else { "" }
    );
    info!("Press Ctrl+C to shutdown gracefully");
    info!("========================================");
    info!("");

    tokio::select! {
        _ = shutdown_signal() => {}
        result = &mut serve => return finish(result),
    }

    token.cancel();

    let drain = Duration::from_secs(config.shutdown.drain_timeout_secs);
    info!(
        active = server.active_connections(),
        "Draining open sessions (timeout {:?})", drain
    );
    let drained = async { server.close().await.wait().await };
    if tokio::time::timeout(drain, drained).await.is_err() {
        warn!(
            active = server.active_connections(),
            "Drain timeout elapsed, exiting with sessions still open"
        );
        return Ok(());
    }

    let result = finish(serve.await);
    info!(errors = events.errors().len(), "Server shutdown complete");
    result
}

/// Cancellation is the expected way out after a signal.
fn finish(result: Result<Result<(), ServeError>, JoinError>) -> Result<()> {
    match result {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) if e.is_cancelled() => Ok(()),
        Ok(Err(e)) => Err(e).context("Server failed"),
        Err(e) => Err(e).context("Serve task panicked"),
    }
}
