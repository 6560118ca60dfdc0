//! TLS termination for the webhook server.
//!
//! The API server refuses to call webhooks over plain HTTP, so the server
//! terminates TLS itself using the certificate/key pair mounted into the
//! pod. Certificate provisioning and rotation are handled outside of this
//! process.
use std::{
    fs::File,
    io::BufReader,
    net::SocketAddr,
    path::{Path, PathBuf},
    sync::Arc,
};

use axum::{Router, extract::Request};
use hyper::{body::Incoming, service::service_fn};
use hyper_util::rt::{TokioExecutor, TokioIo};
use snafu::{OptionExt, ResultExt, Snafu};
use tokio::net::TcpListener;
use tokio_rustls::{
    TlsAcceptor,
    rustls::{
        ServerConfig,
        crypto::ring::default_provider,
        pki_types::{CertificateDer, PrivateKeyDer},
        version::{TLS12, TLS13},
    },
};
use tower::ServiceExt;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("failed to read TLS certificate chain from {path:?}"))]
    ReadCertificateChain {
        source: std::io::Error,
        path: PathBuf,
    },

    #[snafu(display("failed to parse TLS certificate chain from {path:?}"))]
    ParseCertificateChain {
        source: std::io::Error,
        path: PathBuf,
    },

    #[snafu(display("failed to read TLS private key from {path:?}"))]
    ReadPrivateKey {
        source: std::io::Error,
        path: PathBuf,
    },

    #[snafu(display("failed to parse TLS private key from {path:?}"))]
    ParsePrivateKey {
        source: std::io::Error,
        path: PathBuf,
    },

    #[snafu(display("no private key found in {path:?}"))]
    MissingPrivateKey { path: PathBuf },

    #[snafu(display("failed to set safe TLS protocol versions"))]
    SetSafeTlsProtocolVersions { source: tokio_rustls::rustls::Error },

    #[snafu(display("failed to construct TLS server config, bad certificate/key"))]
    InvalidTlsPrivateKey { source: tokio_rustls::rustls::Error },

    #[snafu(display("failed to create TCP listener by binding to socket address {socket_addr:?}"))]
    BindTcpListener {
        source: std::io::Error,
        socket_addr: SocketAddr,
    },

    #[snafu(display("failed to run task in blocking thread"))]
    TokioSpawnBlocking { source: tokio::task::JoinError },
}

/// A server which terminates TLS connections and allows clients to
/// communicate via HTTPS with the underlying HTTP router.
pub struct TlsServer {
    config: Arc<ServerConfig>,
    socket_addr: SocketAddr,
    router: Router,
}

impl TlsServer {
    /// Creates a new TLS server from the PEM-encoded certificate chain and
    /// private key at the given paths.
    ///
    /// Reading and parsing the key material is not async and takes a
    /// non-negligible amount of time, so it runs on a thread reserved for
    /// blocking code instead of stalling the Tokio executor.
    pub async fn new(
        socket_addr: SocketAddr,
        router: Router,
        certificate_path: PathBuf,
        private_key_path: PathBuf,
    ) -> Result<Self> {
        let task = tokio::task::spawn_blocking(move || {
            let certificate_chain = load_certificate_chain(&certificate_path)?;
            let private_key = load_private_key(&private_key_path)?;

            let mut config = ServerConfig::builder_with_provider(default_provider().into())
                .with_protocol_versions(&[&TLS12, &TLS13])
                .context(SetSafeTlsProtocolVersionsSnafu)?
                .with_no_client_auth()
                .with_single_cert(certificate_chain, private_key)
                .context(InvalidTlsPrivateKeySnafu)?;

            config.alpn_protocols = vec![b"h2".to_vec(), b"http/1.1".to_vec()];

            Ok(Self {
                socket_addr,
                config: Arc::new(config),
                router,
            })
        })
        .await
        .context(TokioSpawnBlockingSnafu)??;

        Ok(task)
    }

    /// Runs the TLS server by listening for incoming TCP connections on the
    /// bound socket address. It only accepts TLS connections. Internally
    /// each TLS stream gets handled by a Hyper service, which in turn is an
    /// Axum router.
    pub async fn run(self) -> Result<()> {
        let tls_acceptor = TlsAcceptor::from(self.config);
        let tcp_listener =
            TcpListener::bind(self.socket_addr)
                .await
                .context(BindTcpListenerSnafu {
                    socket_addr: self.socket_addr,
                })?;

        loop {
            let tls_acceptor = tls_acceptor.clone();
            let router = self.router.clone();

            let (tcp_stream, remote_addr) = match tcp_listener.accept().await {
                Ok(connection) => connection,
                Err(err) => {
                    tracing::trace!(%err, "failed to accept incoming TCP connection");
                    continue;
                }
            };

            tokio::spawn(async move {
                let tls_stream = match tls_acceptor.accept(tcp_stream).await {
                    Ok(tls_stream) => tls_stream,
                    Err(err) => {
                        tracing::trace!(%err, %remote_addr, "error during TLS handshake");
                        return;
                    }
                };

                // Hyper has its own `AsyncRead` and `AsyncWrite` traits and
                // doesn't use tokio. `TokioIo` converts between them.
                let tls_stream = TokioIo::new(tls_stream);

                // Hyper also has its own `Service` trait and doesn't use
                // tower. `service_fn` bridges the router into it.
                let hyper_service =
                    service_fn(move |request: Request<Incoming>| router.clone().oneshot(request));

                if let Err(err) = hyper_util::server::conn::auto::Builder::new(TokioExecutor::new())
                    .serve_connection_with_upgrades(tls_stream, hyper_service)
                    .await
                {
                    tracing::warn!(%err, %remote_addr, "failed to serve connection");
                }
            });
        }
    }
}

fn load_certificate_chain(path: &Path) -> Result<Vec<CertificateDer<'static>>> {
    let file = File::open(path).context(ReadCertificateChainSnafu { path })?;
    rustls_pemfile::certs(&mut BufReader::new(file))
        .collect::<std::io::Result<Vec<_>>>()
        .context(ParseCertificateChainSnafu { path })
}

fn load_private_key(path: &Path) -> Result<PrivateKeyDer<'static>> {
    let file = File::open(path).context(ReadPrivateKeySnafu { path })?;
    rustls_pemfile::private_key(&mut BufReader::new(file))
        .context(ParsePrivateKeySnafu { path })?
        .context(MissingPrivateKeySnafu { path })
}
