//! Load — layered config loading and validation.

use std::path::Path;

use anyhow::{Context, Result};
use acceptor::Network;

use super::model::EchoConfig;

/// Searched in order when `ECHO_CONFIG_FILE` is not set
const CONFIG_PATHS: [&str; 3] = ["/etc/echo/echo", "config/echo", "crates/echo/config/echo"];

impl EchoConfig {
    /// Load configuration from an optional echo.toml and `ECHO__*` environment variables
    /// Priority: Environment Variables > Config File > Defaults
    pub fn load() -> Result<Self> {
        // Load .env file if it exists
        dotenvy::dotenv().ok();

        let file = std::env::var("ECHO_CONFIG_FILE").ok();
        Self::load_from(file.as_deref(), Self::environment())
    }

    /// Nested keys use double underscores: ECHO__SERVER__ADDRESS
    fn environment() -> config::Environment {
        config::Environment::with_prefix("ECHO")
            .prefix_separator("__")
            .separator("__")
            .try_parsing(true)
    }

    pub(crate) fn load_from(file: Option<&str>, env: config::Environment) -> Result<Self> {
        let defaults = config::Config::try_from(&EchoConfig::default())
            .context("Failed to serialize default configuration")?;

        let mut builder = config::Config::builder().add_source(defaults);

        match file {
            Some(path) => {
                tracing::info!("Loading configuration from: {}", path);
                builder = builder.add_source(config::File::with_name(path).required(true));
            }
            None => {
                for path in CONFIG_PATHS {
                    builder = builder.add_source(config::File::with_name(path).required(false));
                }
            }
        }

        builder
            .add_source(env)
            .build()
            .context("Failed to build configuration")?
            .try_deserialize()
            .context("Failed to deserialize configuration")
    }

    /// Validate that the listener settings are usable and TLS files exist
    pub fn validate(&self) -> Result<()> {
        if self.server.network.is_empty() {
            anyhow::bail!("server.network must not be empty");
        }
        self.server
            .network
            .parse::<Network>()
            .context("Invalid server.network")?;

        if self.server.address.is_empty() {
            anyhow::bail!("server.address must not be empty");
        }

        if self.tls.enabled {
            validate_file("cert", &self.tls.cert_path)?;
            validate_file("key", &self.tls.key_path)?;
            if let Some(ca) = &self.tls.client_ca_path {
                validate_file("client CA", ca)?;
            }
        }

        Ok(())
    }
}

fn validate_file(label: &str, path: &str) -> Result<()> {
    let p = Path::new(path);
    if !p.exists() {
        anyhow::bail!(
            "TLS {} file not found: {} (resolved: {})",
            label,
            path,
            p.canonicalize()
                .map(|c| c.display().to_string())
                .unwrap_or_else(|_| "unresolvable".to_string())
        );
    }
    Ok(())
}
