//! Listener — the accept side of a stream socket.

use std::io;

use futures_util::future::BoxFuture;
use tokio::net::{lookup_host, TcpListener};

use super::{Addr, Network, Stream};

/// A source of inbound stream connections.
///
/// Implemented for tokio's TCP and unix listeners; embedders can supply
/// their own (pre-configured sockets, test doubles) through
/// `ServerConfig::listener`. Dropping the value closes the listener.
pub trait Accept: Send + Sync + 'static {
    fn accept(&self) -> BoxFuture<'_, io::Result<(Stream, Addr)>>;

    fn local_addr(&self) -> io::Result<Addr>;
}

/// Owned, type-erased listener.
pub type Listener = Box<dyn Accept>;

impl Accept for TcpListener {
    fn accept(&self) -> BoxFuture<'_, io::Result<(Stream, Addr)>> {
        Box::pin(async move {
            let (stream, peer) = TcpListener::accept(self).await?;
            Ok((Stream::Tcp(stream), Addr::Inet(peer)))
        })
    }

    fn local_addr(&self) -> io::Result<Addr> {
        TcpListener::local_addr(self).map(Addr::Inet)
    }
}

#[cfg(unix)]
impl Accept for tokio::net::UnixListener {
    fn accept(&self) -> BoxFuture<'_, io::Result<(Stream, Addr)>> {
        Box::pin(async move {
            let (stream, peer) = tokio::net::UnixListener::accept(self).await?;
            Ok((Stream::Unix(stream), Addr::from(peer)))
        })
    }

    fn local_addr(&self) -> io::Result<Addr> {
        tokio::net::UnixListener::local_addr(self).map(Addr::from)
    }
}

impl<A: Accept + ?Sized> Accept for Box<A> {
    fn accept(&self) -> BoxFuture<'_, io::Result<(Stream, Addr)>> {
        (**self).accept()
    }

    fn local_addr(&self) -> io::Result<Addr> {
        (**self).local_addr()
    }
}

pub(crate) async fn bind_tcp(network: Network, address: &str) -> io::Result<TcpListener> {
    let address = normalize(network, address);
    let mut last_err = None;
    for addr in lookup_host(address.as_str()).await? {
        if !network.admits(&addr) {
            continue;
        }
        match TcpListener::bind(addr).await {
            Ok(listener) => return Ok(listener),
            Err(e) => last_err = Some(e),
        }
    }
    Err(last_err.unwrap_or_else(|| {
        io::Error::new(
            io::ErrorKind::AddrNotAvailable,
            format!("no {} address found for {}", network, address),
        )
    }))
}

/// Expand the `""` and `":port"` shorthands to a wildcard host.
fn normalize(network: Network, address: &str) -> String {
    let wildcard = match network {
        Network::Tcp6 => "[::]",
        _ => "0.0.0.0",
    };
    if address.is_empty() {
        format!("{}:0", wildcard)
    } else if address.starts_with(':') {
        format!("{}{}", wildcard, address)
    } else {
        address.to_string()
    }
}

/// Whether an accept error is per-connection or a passing resource
/// shortage, i.e. the next `accept()` may well succeed.
pub fn is_transient(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::ConnectionRefused
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::Interrupted
            | io::ErrorKind::WouldBlock
            | io::ErrorKind::TimedOut
    ) || is_resource_exhausted(err)
}

/// ENOBUFS differs across unix families; elsewhere it is not classified.
#[cfg(any(target_os = "linux", target_os = "android"))]
const ENOBUFS: Option<i32> = Some(105);
#[cfg(any(
    target_os = "macos",
    target_os = "ios",
    target_os = "freebsd",
    target_os = "openbsd",
    target_os = "netbsd",
    target_os = "dragonfly"
))]
const ENOBUFS: Option<i32> = Some(55);
#[cfg(not(any(
    target_os = "linux",
    target_os = "android",
    target_os = "macos",
    target_os = "ios",
    target_os = "freebsd",
    target_os = "openbsd",
    target_os = "netbsd",
    target_os = "dragonfly"
)))]
const ENOBUFS: Option<i32> = None;

/// EMFILE / ENFILE / ENOBUFS / ENOMEM. Retrying these immediately would
/// spin, so the accept loop backs off first.
pub(crate) fn is_resource_exhausted(err: &io::Error) -> bool {
    if err.kind() == io::ErrorKind::OutOfMemory {
        return true;
    }
    match err.raw_os_error() {
        #[cfg(unix)]
        Some(code) => {
            const ENOMEM: i32 = 12;
            const ENFILE: i32 = 23;
            const EMFILE: i32 = 24;
            matches!(code, ENOMEM | ENFILE | EMFILE) || ENOBUFS == Some(code)
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_shorthands() {
        assert_eq!(normalize(Network::Tcp, ""), "0.0.0.0:0");
        assert_eq!(normalize(Network::Tcp4, ":8080"), "0.0.0.0:8080");
        assert_eq!(normalize(Network::Tcp6, ":8080"), "[::]:8080");
        assert_eq!(normalize(Network::Tcp, "localhost:1"), "localhost:1");
    }

    #[test]
    fn test_per_connection_errors_are_transient() {
        for kind in [
            io::ErrorKind::ConnectionAborted,
            io::ErrorKind::ConnectionReset,
            io::ErrorKind::Interrupted,
            io::ErrorKind::WouldBlock,
        ] {
            assert!(is_transient(&io::Error::from(kind)), "{:?} should be transient", kind);
        }
    }

    #[cfg(unix)]
    #[test]
    fn test_fd_exhaustion_is_transient_with_backoff() {
        let emfile = io::Error::from_raw_os_error(24);
        assert!(is_transient(&emfile));
        assert!(is_resource_exhausted(&emfile));
        assert!(!is_resource_exhausted(&io::Error::from(io::ErrorKind::ConnectionReset)));
    }

    #[cfg(any(target_os = "linux", target_os = "android"))]
    #[test]
    fn test_enobufs_uses_linux_errno() {
        assert!(is_resource_exhausted(&io::Error::from_raw_os_error(105)));
        // 55 is ENOBUFS on the BSDs but ENOANO on linux
        assert!(!is_resource_exhausted(&io::Error::from_raw_os_error(55)));
    }

    #[test]
    fn test_listener_level_errors_are_terminal() {
        for kind in [
            io::ErrorKind::PermissionDenied,
            io::ErrorKind::InvalidInput,
            io::ErrorKind::NotConnected,
            io::ErrorKind::Other,
        ] {
            assert!(!is_transient(&io::Error::from(kind)), "{:?} should be terminal", kind);
        }
    }

    #[tokio::test]
    async fn test_tcp_accept_reports_peer() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = TcpListener::local_addr(&listener).unwrap();
        let client = tokio::net::TcpStream::connect(addr).await.unwrap();

        let (_stream, peer) = Accept::accept(&listener).await.unwrap();
        assert_eq!(peer, Addr::Inet(client.local_addr().unwrap()));
    }
}
