//! A mutating admission webhook which makes sure workloads can pull images
//! from the private registry, no matter which namespace they run in.
//!
//! For every admitted ServiceAccount the webhook provisions the registry
//! pull secret into the target namespace (copying it from a canonical
//! source namespace when missing) and returns a JSON Patch which appends a
//! reference to that secret to the object's `imagePullSecrets`. The server
//! uses HTTPS, is fully compatible with the [`tracing`] crate and emits
//! debug level tracing data.
//!
//! The [`WebhookServer`] wires the admission [`Router`] from
//! [`webhooks::router`] into TLS termination and exposes the liveness
//! endpoint every deployment needs.
use axum::{Router, routing::get};
use futures_util::{FutureExt as _, pin_mut, select};
use snafu::{ResultExt, Snafu};
use tokio::signal::unix::{SignalKind, signal};
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;

use crate::tls::TlsServer;

pub mod cli;
pub mod constants;
pub mod logging;
pub mod patch;
pub mod provision;
pub mod tls;
pub mod webhooks;

/// A result type alias with the [`WebhookError`] type as the default error type.
pub type Result<T, E = WebhookError> = std::result::Result<T, E>;

#[derive(Debug, Snafu)]
pub enum WebhookError {
    #[snafu(display("failed to create TLS server"))]
    CreateTlsServer { source: tls::Error },

    #[snafu(display("failed to run TLS server"))]
    RunTlsServer { source: tls::Error },
}

/// A ready-to-use webhook server.
///
/// This server abstracts away lower-level details like TLS termination and
/// request tracing. The admission routes and their handlers come from the
/// provided Axum [`Router`].
pub struct WebhookServer {
    tls_server: TlsServer,
}

impl WebhookServer {
    /// Creates a new ready-to-use webhook server.
    ///
    /// The server listens on `options.bind_address` and serves the provided
    /// `router`, using the certificate/key pair from the paths in `options`.
    /// To start the server, use the [`WebhookServer::run()`] function. This
    /// will run the server using the Tokio runtime until it is terminated.
    pub async fn new(router: Router, options: &cli::Options) -> Result<Self> {
        tracing::trace!("create new webhook server");

        let service_builder = ServiceBuilder::new().layer(TraceLayer::new_for_http());

        // The health route is below the trace layer so that probes do not
        // show up in the request log.
        tracing::debug!("create core router and merge provided router");
        let router = router
            .layer(service_builder)
            .route("/health", get(|| async { "ok" }));

        tracing::debug!("create TLS server");
        let tls_server = TlsServer::new(
            options.bind_address,
            router,
            options.tls_certificate.clone(),
            options.tls_private_key.clone(),
        )
        .await
        .context(CreateTlsServerSnafu)?;

        Ok(Self { tls_server })
    }

    /// Runs the webhook server and sets up signal handlers for shutting down.
    ///
    /// This does not implement graceful shutdown of the underlying server.
    pub async fn run(self) -> Result<()> {
        let future_server = self.run_server();
        let future_signal = async {
            let mut sigint = signal(SignalKind::interrupt()).expect("create SIGINT listener");
            let mut sigterm = signal(SignalKind::terminate()).expect("create SIGTERM listener");

            tracing::debug!("created unix signal handlers");

            select! {
                signal = sigint.recv().fuse() => {
                    if signal.is_some() {
                        tracing::debug!("received SIGINT");
                    }
                },
                signal = sigterm.recv().fuse() => {
                    if signal.is_some() {
                        tracing::debug!("received SIGTERM");
                    }
                },
            };
        };

        // select requires Future + Unpin
        pin_mut!(future_server);
        pin_mut!(future_signal);

        futures_util::future::select(future_server, future_signal).await;

        Ok(())
    }

    /// Runs the webhook server by creating a TCP listener and binding it to
    /// the specified socket address.
    async fn run_server(self) -> Result<()> {
        tracing::debug!("run webhook server");

        self.tls_server.run().await.context(RunTlsServerSnafu)
    }
}
