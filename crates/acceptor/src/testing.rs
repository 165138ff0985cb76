//! Test support: echo handler, clients, scripted listener, TLS material.

use std::collections::VecDeque;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures_util::future::BoxFuture;
use parking_lot::Mutex;
use rustls::pki_types::{PrivateKeyDer, PrivatePkcs8KeyDer, ServerName};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tokio_rustls::TlsConnector;
use tokio_util::sync::CancellationToken;

use crate::error::ServeError;
use crate::net::{Accept, Addr, Connection, Stream};
use crate::server::{ConnContext, Server};

pub(crate) const WAIT: Duration = Duration::from_secs(5);

/// Read one line and write it back unchanged.
pub(crate) async fn echo_once(_ctx: ConnContext, conn: Connection) -> io::Result<()> {
    let mut reader = BufReader::new(conn);
    let mut line = String::new();
    reader.read_line(&mut line).await?;
    let conn = reader.get_mut();
    conn.write_all(line.as_bytes()).await?;
    conn.flush().await
}

pub(crate) fn spawn_serve(
    server: &Arc<Server>,
    token: CancellationToken,
) -> JoinHandle<Result<(), ServeError>> {
    let server = Arc::clone(server);
    tokio::spawn(async move { server.serve(token).await })
}

/// Poll `check` until it holds, panicking after [`WAIT`].
pub(crate) async fn eventually(check: impl Fn() -> bool) {
    let deadline = tokio::time::Instant::now() + WAIT;
    while !check() {
        assert!(tokio::time::Instant::now() < deadline, "condition not met in time");
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

/// Send `line` and return the first line received, without the newline.
pub(crate) async fn ping(addr: SocketAddr, line: &str) -> String {
    let stream = TcpStream::connect(addr).await.unwrap();
    exchange(stream, line).await
}

pub(crate) async fn ping_tls(connector: &TlsConnector, addr: SocketAddr, line: &str) -> String {
    let tcp = TcpStream::connect(addr).await.unwrap();
    let name = ServerName::try_from("localhost").unwrap();
    let stream = connector.connect(name, tcp).await.unwrap();
    exchange(stream, line).await
}

async fn exchange<S: AsyncRead + AsyncWrite + Unpin>(stream: S, line: &str) -> String {
    let mut stream = BufReader::new(stream);
    stream.get_mut().write_all(format!("{}\n", line).as_bytes()).await.unwrap();
    stream.get_mut().flush().await.unwrap();
    let mut reply = String::new();
    stream.read_line(&mut reply).await.unwrap();
    reply.trim_end_matches(&['\r', '\n'][..]).to_string()
}

/// Self-signed `localhost` server config plus a connector that trusts it.
pub(crate) fn tls_pair() -> (Arc<rustls::ServerConfig>, TlsConnector) {
    let certified = rcgen::generate_simple_self_signed(vec!["localhost".to_string()]).unwrap();
    let cert = certified.cert.der().clone();
    let key = PrivateKeyDer::Pkcs8(PrivatePkcs8KeyDer::from(certified.key_pair.serialize_der()));

    let server = rustls::ServerConfig::builder()
        .with_no_client_auth()
        .with_single_cert(vec![cert.clone()], key)
        .unwrap();

    let mut roots = rustls::RootCertStore::empty();
    roots.add(cert).unwrap();
    let client = rustls::ClientConfig::builder()
        .with_root_certificates(roots)
        .with_no_client_auth();

    (Arc::new(server), TlsConnector::from(Arc::new(client)))
}

/// A real TCP listener that first fails with the scripted errors, in
/// order, and then accepts normally.
pub(crate) struct ScriptedListener {
    inner: TcpListener,
    script: Mutex<VecDeque<io::Error>>,
}

impl ScriptedListener {
    pub(crate) async fn bind(script: Vec<io::Error>) -> Self {
        Self {
            inner: TcpListener::bind("127.0.0.1:0").await.unwrap(),
            script: Mutex::new(script.into()),
        }
    }

    pub(crate) fn addr(&self) -> SocketAddr {
        self.inner.local_addr().unwrap()
    }
}

impl Accept for ScriptedListener {
    fn accept(&self) -> BoxFuture<'_, io::Result<(Stream, Addr)>> {
        let scripted = self.script.lock().pop_front();
        Box::pin(async move {
            match scripted {
                Some(err) => Err(err),
                None => Accept::accept(&self.inner).await,
            }
        })
    }

    fn local_addr(&self) -> io::Result<Addr> {
        Accept::local_addr(&self.inner)
    }
}
