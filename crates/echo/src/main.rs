use anyhow::{Context, Result};
use tracing::info;

use echo::conf::EchoConfig;
use echo::runtime::{boot, serve};

#[tokio::main]
async fn main() -> Result<()> {
    // Phase 1: thread-local subscriber so config loading can log
    let basic_tracing = boot::init_tracing_basic();

    info!("Starting echo daemon v{}", env!("CARGO_PKG_VERSION"));

    let config = EchoConfig::load().context("Failed to load configuration")?;
    config.validate().context("Configuration validation failed")?;

    // Phase 2: global subscriber from config
    drop(basic_tracing);
    boot::init_tracing_from_config(&config.logging)?;

    info!("Configuration loaded successfully");
    serve::run(config).await
}
