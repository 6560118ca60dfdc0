//! Command line interface of the webhook binary.
//!
//! All options can alternatively be supplied through the environment, which
//! is how the deployment manifests usually configure the webhook. The parsed
//! [`Options`] value is constructed once at startup and handed to every
//! component by parameter, nothing reads configuration ad hoc.
use std::{net::SocketAddr, path::PathBuf};

use clap::Parser;

use crate::constants::{
    DEFAULT_PULL_SECRET_NAME, DEFAULT_SOCKET_ADDR, DEFAULT_SOURCE_NAMESPACE,
    DEFAULT_TLS_CERTIFICATE_PATH, DEFAULT_TLS_PRIVATE_KEY_PATH,
};

/// Ensures a registry pull secret exists in every namespace and injects a
/// reference to it into every admitted ServiceAccount.
#[derive(Debug, Parser)]
#[command(author, version, about)]
pub struct Options {
    /// Socket address the HTTPS server binds to.
    #[arg(
        long,
        env = "PULL_SECRET_WEBHOOK_BIND_ADDRESS",
        default_value_t = DEFAULT_SOCKET_ADDR
    )]
    pub bind_address: SocketAddr,

    /// Path to the PEM-encoded certificate chain the server presents.
    #[arg(
        long,
        env = "PULL_SECRET_WEBHOOK_TLS_CERTIFICATE",
        default_value = DEFAULT_TLS_CERTIFICATE_PATH
    )]
    pub tls_certificate: PathBuf,

    /// Path to the PEM-encoded private key belonging to the certificate.
    #[arg(
        long,
        env = "PULL_SECRET_WEBHOOK_TLS_PRIVATE_KEY",
        default_value = DEFAULT_TLS_PRIVATE_KEY_PATH
    )]
    pub tls_private_key: PathBuf,

    /// Namespace holding the canonical copy of the pull secret.
    #[arg(
        long,
        env = "PULL_SECRET_WEBHOOK_SOURCE_NAMESPACE",
        default_value = DEFAULT_SOURCE_NAMESPACE
    )]
    pub source_namespace: String,

    /// Name of the pull secret to provision and reference.
    #[arg(
        long,
        env = "PULL_SECRET_WEBHOOK_PULL_SECRET_NAME",
        default_value = DEFAULT_PULL_SECRET_NAME
    )]
    pub pull_secret_name: String,
}
