//! TLS servers that consume a temporary PKI bundle
// (c) 2024 Ross Younger

use std::convert::Infallible;
use std::future::Future;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::{Arc, OnceLock};

use http_body_util::Full;
use hyper::body::{Bytes, Incoming};
use hyper::service::service_fn;
use hyper::{Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinSet;
use tokio_rustls::TlsAcceptor;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, trace_span, Instrument as _};

use crate::credentials::Credentials;
use crate::{Error, Result};

/// Path served by [`HttpsServer`]
pub const HELLO_PATH: &str = "/hello";
/// Response body served by [`HttpsServer`]
pub const HELLO_BODY: &str = "Hello World!";

/// Something that can serve TLS given a certificate file and a private key file.
///
/// This is all [`TemporaryPki::listen_and_serve_tls`](crate::TemporaryPki::listen_and_serve_tls)
/// needs from its server.
pub trait TlsServer {
    /// Runs until shut down or failure.
    ///
    /// A server that was deliberately shut down returns [`Error::ServerClosed`].
    fn serve_tls(&self, cert_file: &Path, key_file: &Path)
        -> impl Future<Output = Result<()>> + Send;
}

/// A minimal HTTPS server which answers [`HELLO_PATH`] with [`HELLO_BODY`], and everything else with 404
#[derive(Debug)]
pub struct HttpsServer {
    addr: SocketAddr,
    handle: ServerHandle,
}

/// Controls a running [`HttpsServer`] from elsewhere
#[derive(Clone, Debug, Default)]
pub struct ServerHandle {
    shutdown: CancellationToken,
    local_addr: Arc<OnceLock<SocketAddr>>,
}

impl ServerHandle {
    /// Asks the server to stop accepting connections and return
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    /// The address the server is listening on, once it has started
    #[must_use]
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr.get().copied()
    }

    /// Waits until the server is listening (or has been shut down)
    pub async fn listening(&self) -> Option<SocketAddr> {
        loop {
            if let Some(addr) = self.local_addr() {
                return Some(addr);
            }
            if self.shutdown.is_cancelled() {
                return None;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
    }
}

impl HttpsServer {
    /// Constructor. The server does not bind until it is run.
    ///
    /// Port 0 selects any free port; see [`ServerHandle::local_addr`].
    #[must_use]
    pub fn new(addr: SocketAddr) -> Self {
        Self {
            addr,
            handle: ServerHandle::default(),
        }
    }

    /// A handle for controlling the server
    #[must_use]
    pub fn handle(&self) -> ServerHandle {
        self.handle.clone()
    }

    fn acceptor(cert_file: &Path, key_file: &Path) -> Result<TlsAcceptor> {
        let credentials = Credentials::load(cert_file, key_file)?;
        let config = rustls::ServerConfig::builder_with_provider(Arc::new(
            rustls::crypto::ring::default_provider(),
        ))
        .with_safe_default_protocol_versions()
        .map_err(Error::tls)?
        .with_no_client_auth()
        .with_single_cert(credentials.cert_chain(), credentials.keypair)
        .map_err(Error::tls)?;
        Ok(TlsAcceptor::from(Arc::new(config)))
    }
}

impl TlsServer for HttpsServer {
    async fn serve_tls(&self, cert_file: &Path, key_file: &Path) -> Result<()> {
        let acceptor = Self::acceptor(cert_file, key_file)?;
        let listener = TcpListener::bind(self.addr)
            .await
            .map_err(|source| Error::Bind {
                addr: self.addr,
                source,
            })?;
        let local_addr = listener.local_addr().map_err(|source| Error::Bind {
            addr: self.addr,
            source,
        })?;
        let _ = self.handle.local_addr.set(local_addr);
        info!("listening on https://{local_addr}{HELLO_PATH}");

        let shutdown = &self.handle.shutdown;
        let mut tasks = JoinSet::new();
        loop {
            tokio::select! {
                () = shutdown.cancelled() => break,
                accepted = listener.accept() => {
                    let (stream, peer) = match accepted {
                        Ok(a) => a,
                        Err(e) => {
                            debug!("accept failed: {e}");
                            continue;
                        }
                    };
                    let acceptor = acceptor.clone();
                    let token = shutdown.clone();
                    let _ = tasks.spawn(
                        async move {
                            if let Err(e) = handle_connection(stream, acceptor, token).await {
                                debug!("connection failed: {e}");
                            }
                        }
                        .instrument(trace_span!("conn", %peer)),
                    );
                }
            }
        }

        info!("shutting down");
        drop(listener);
        let _ = tasks.join_all().await;
        Err(Error::ServerClosed)
    }
}

async fn handle_connection(
    stream: TcpStream,
    acceptor: TlsAcceptor,
    shutdown: CancellationToken,
) -> anyhow::Result<()> {
    let tls = tokio::select! {
        tls = acceptor.accept(stream) => tls?,
        () = shutdown.cancelled() => return Ok(()),
    };
    trace!("TLS handshake complete");
    let conn = hyper::server::conn::http1::Builder::new()
        .serve_connection(TokioIo::new(tls), service_fn(hello));
    tokio::pin!(conn);
    tokio::select! {
        result = conn.as_mut() => result?,
        () = shutdown.cancelled() => {
            conn.as_mut().graceful_shutdown();
            conn.await?;
        }
    }
    Ok(())
}

async fn hello(request: Request<Incoming>) -> std::result::Result<Response<Full<Bytes>>, Infallible> {
    trace!("{} {}", request.method(), request.uri());
    let mut response = Response::new(Full::new(Bytes::new()));
    if request.uri().path() == HELLO_PATH {
        *response.body_mut() = Full::new(Bytes::from_static(HELLO_BODY.as_bytes()));
    } else {
        *response.status_mut() = StatusCode::NOT_FOUND;
    }
    Ok(response)
}

/// Fetches `path` from an [`HttpsServer`], trusting only `trusted_der` and expecting the name `localhost`.
///
/// Returns the raw HTTP response.
#[cfg(test)]
pub(crate) async fn https_get(
    addr: SocketAddr,
    trusted_der: &[u8],
    path: &str,
) -> anyhow::Result<String> {
    use tokio::io::{AsyncReadExt as _, AsyncWriteExt as _};

    let mut roots = rustls::RootCertStore::empty();
    roots.add(rustls_pki_types::CertificateDer::from(trusted_der.to_vec()))?;
    let config = rustls::ClientConfig::builder_with_provider(Arc::new(
        rustls::crypto::ring::default_provider(),
    ))
    .with_safe_default_protocol_versions()?
    .with_root_certificates(roots)
    .with_no_client_auth();
    let connector = tokio_rustls::TlsConnector::from(Arc::new(config));

    let tcp = TcpStream::connect(addr).await?;
    let name = rustls_pki_types::ServerName::try_from("localhost")?.to_owned();
    let mut tls = connector.connect(name, tcp).await?;
    tls.write_all(
        format!("GET {path} HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n").as_bytes(),
    )
    .await?;
    let mut response = Vec::new();
    match tls.read_to_end(&mut response).await {
        // the server may close without sending close_notify
        Ok(_) => (),
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => (),
        Err(e) => return Err(e.into()),
    }
    Ok(String::from_utf8(response)?)
}
