//! Net — network families, addresses, listeners and accepted streams.

pub mod listener;
pub mod stream;

use std::fmt;
use std::io;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;

use crate::error::ConfigError;

pub use listener::{is_transient, Accept, Listener};
pub use stream::{Connection, Stream};

/// Stream network family a server can listen on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Network {
    /// Any IP family (`"tcp"`, also accepted as `"stream"`).
    Tcp,
    Tcp4,
    Tcp6,
    /// Unix domain stream socket; the address is a filesystem path.
    Unix,
}

impl Network {
    /// Whether a resolved socket address belongs to this family.
    pub fn admits(&self, addr: &SocketAddr) -> bool {
        match self {
            Network::Tcp => true,
            Network::Tcp4 => addr.is_ipv4(),
            Network::Tcp6 => addr.is_ipv6(),
            Network::Unix => false,
        }
    }
}

impl FromStr for Network {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "tcp" | "stream" => Ok(Network::Tcp),
            "tcp4" => Ok(Network::Tcp4),
            "tcp6" => Ok(Network::Tcp6),
            "unix" => Ok(Network::Unix),
            _ => Err(ConfigError::UnsupportedNetwork(s.to_string())),
        }
    }
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Network::Tcp => "tcp",
            Network::Tcp4 => "tcp4",
            Network::Tcp6 => "tcp6",
            Network::Unix => "unix",
        })
    }
}

/// Local or remote endpoint of a stream socket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Addr {
    Inet(SocketAddr),
    /// `None` for unnamed unix sockets (typical for connecting peers).
    Unix(Option<PathBuf>),
}

impl Addr {
    pub fn as_inet(&self) -> Option<SocketAddr> {
        match self {
            Addr::Inet(addr) => Some(*addr),
            Addr::Unix(_) => None,
        }
    }
}

impl From<SocketAddr> for Addr {
    fn from(addr: SocketAddr) -> Self {
        Addr::Inet(addr)
    }
}

#[cfg(unix)]
impl From<tokio::net::unix::SocketAddr> for Addr {
    fn from(addr: tokio::net::unix::SocketAddr) -> Self {
        Addr::Unix(addr.as_pathname().map(|p| p.to_path_buf()))
    }
}

impl fmt::Display for Addr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Addr::Inet(addr) => write!(f, "{}", addr),
            Addr::Unix(Some(path)) => write!(f, "{}", path.display()),
            Addr::Unix(None) => f.write_str("@"),
        }
    }
}

/// Bind a listener for `network` on `address`.
///
/// TCP addresses follow the usual `host:port` form; an empty address or a
/// bare `":port"` listens on every interface of the family.
pub(crate) async fn bind(network: Network, address: &str) -> io::Result<Listener> {
    match network {
        Network::Tcp | Network::Tcp4 | Network::Tcp6 => {
            let listener = listener::bind_tcp(network, address).await?;
            Ok(Box::new(listener))
        }
        #[cfg(unix)]
        Network::Unix => {
            let listener = tokio::net::UnixListener::bind(address)?;
            Ok(Box::new(listener))
        }
        #[cfg(not(unix))]
        Network::Unix => Err(io::Error::new(
            io::ErrorKind::Unsupported,
            "unix sockets are not supported on this platform",
        )),
    }
}
