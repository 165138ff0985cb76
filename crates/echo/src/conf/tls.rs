//! TLS — rustls ServerConfig building, with optional mTLS.

use std::fs::File;
use std::io::BufReader;
use std::sync::Arc;

use anyhow::{Context, Result};
use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use rustls::ServerConfig;

use super::model::TlsConfig;

impl TlsConfig {
    /// Build a rustls ServerConfig from the configured PEM files
    pub fn build_rustls_config(&self) -> Result<Arc<ServerConfig>> {
        let certs = load_certs(&self.cert_path)?;
        let key = load_key(&self.key_path)?;

        let builder = ServerConfig::builder();
        let config = match &self.client_ca_path {
            Some(ca_path) => {
                // Client certificate verification (mTLS)
                let mut root_store = rustls::RootCertStore::empty();
                for cert in load_certs(ca_path)? {
                    root_store.add(cert).context("Invalid client CA certificate")?;
                }
                let client_verifier =
                    rustls::server::WebPkiClientVerifier::builder(Arc::new(root_store))
                        .build()
                        .context("Failed to build client certificate verifier")?;
                builder
                    .with_client_cert_verifier(client_verifier)
                    .with_single_cert(certs, key)
            }
            None => builder.with_no_client_auth().with_single_cert(certs, key),
        }
        .context("Invalid server certificate or key")?;

        Ok(Arc::new(config))
    }
}

fn load_certs(path: &str) -> Result<Vec<CertificateDer<'static>>> {
    let file = File::open(path).with_context(|| format!("Failed to open certificate {}", path))?;
    let mut reader = BufReader::new(file);
    let certs = rustls_pemfile::certs(&mut reader)
        .collect::<Result<Vec<_>, _>>()
        .with_context(|| format!("Failed to parse certificate {}", path))?;
    if certs.is_empty() {
        anyhow::bail!("No certificates found in {}", path);
    }
    Ok(certs)
}

fn load_key(path: &str) -> Result<PrivateKeyDer<'static>> {
    let file = File::open(path).with_context(|| format!("Failed to open private key {}", path))?;
    let mut reader = BufReader::new(file);
    rustls_pemfile::private_key(&mut reader)
        .with_context(|| format!("Failed to parse private key {}", path))?
        .with_context(|| format!("No private key found in {}", path))
}
