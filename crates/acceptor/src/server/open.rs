//! Open — bind or adopt the listener and arm TLS.

use tokio_rustls::TlsAcceptor;

use crate::error::{ConfigError, ServeError};
use crate::net::{self, Network};

use super::{Bound, Server};

impl Server {
    /// Prepare the listener without entering the accept loop.
    ///
    /// Lets embedders detect bind failures (port already in use, missing
    /// permissions) before they block in [`serve`](Self::serve). Calling it
    /// again after success is a no-op.
    pub async fn open(&self) -> Result<(), ServeError> {
        let mut state = self.state.lock().await;
        if self.opened.has_fired() {
            return Ok(());
        }

        let handler = self.handler.clone().ok_or(ConfigError::MissingHandler)?;

        let listener = match state.listener.take() {
            Some(listener) => listener,
            None => {
                let network: Network = self.network.parse()?;
                net::bind(network, &self.address)
                    .await
                    .map_err(|source| ServeError::Bind {
                        network: self.network.clone(),
                        address: self.address.clone(),
                        source,
                    })?
            }
        };

        let local_addr = listener.local_addr().ok();
        let shown = local_addr
            .as_ref()
            .map(ToString::to_string)
            .unwrap_or_else(|| self.address.clone());
        self.events.info(format_args!("{} serving at {}:{}", self.name, self.network, shown));
        if self.tls.is_some() {
            tracing::debug!(server = %self.name, "TLS termination enabled");
        }

        state.bound = Some(Bound {
            listener,
            tls: self.tls.clone().map(TlsAcceptor::from),
            handler,
        });
        *self.local_addr.lock() = local_addr;

        self.opened.fire();
        Ok(())
    }
}
