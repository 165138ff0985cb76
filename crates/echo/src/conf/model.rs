//! Model — EchoConfig and its sections.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EchoConfig {
    pub server: ListenConfig,
    pub tls: TlsConfig,
    pub logging: LoggingConfig,
    pub echo: SessionConfig,
    pub shutdown: ShutdownConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ListenConfig {
    /// Display name used in server events
    pub name: String,
    /// tcp, tcp4, tcp6 or unix
    pub network: String,
    pub address: String,
    /// Per-connection spans and the in-memory event log
    pub instrumented: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TlsConfig {
    pub enabled: bool,
    pub cert_path: String,
    pub key_path: String,
    /// When set, clients must present a certificate signed by this CA (mTLS)
    pub client_ca_path: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
    pub output: LogOutput,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Json,
    Pretty,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogOutput {
    Stdout,
    File { path: String },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Line sent to every client right after it connects
    pub greeting: Option<String>,
    /// A line starting with this ends the session
    pub quit_command: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ShutdownConfig {
    /// How long to wait for open sessions after a shutdown signal
    pub drain_timeout_secs: u64,
}

impl Default for ListenConfig {
    fn default() -> Self {
        Self {
            name: "echo".to_string(),
            network: "tcp".to_string(),
            address: "127.0.0.1:8080".to_string(),
            instrumented: true,
        }
    }
}

impl Default for TlsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            cert_path: "certs/server.crt".to_string(),
            key_path: "certs/server.key".to_string(),
            client_ca_path: None,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info,echo=debug,acceptor=debug".to_string(),
            format: LogFormat::Pretty,
            output: LogOutput::Stdout,
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            greeting: None,
            quit_command: "quit".to_string(),
        }
    }
}

impl Default for ShutdownConfig {
    fn default() -> Self {
        Self {
            drain_timeout_secs: 30,
        }
    }
}
