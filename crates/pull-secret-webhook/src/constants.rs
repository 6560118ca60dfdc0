//! Contains various constant definitions, mostly for default ports, file
//! locations and object names.
use std::{
    net::{IpAddr, Ipv4Addr, SocketAddr},
    time::Duration,
};

/// The default HTTPS port `8443`
pub const DEFAULT_HTTPS_PORT: u16 = 8443;

/// The default IP address [`Ipv4Addr::UNSPECIFIED`] (`0.0.0.0`) the webhook server binds to,
/// which represents binding on all network addresses.
pub const DEFAULT_LISTEN_ADDRESS: IpAddr = IpAddr::V4(Ipv4Addr::UNSPECIFIED);

/// The default socket address `0.0.0.0:8443` the webhook server binds to.
pub const DEFAULT_SOCKET_ADDR: SocketAddr =
    SocketAddr::new(DEFAULT_LISTEN_ADDRESS, DEFAULT_HTTPS_PORT);

/// The default location of the PEM-encoded serving certificate chain, mounted
/// from the webhook TLS secret.
pub const DEFAULT_TLS_CERTIFICATE_PATH: &str = "/certs/tls.crt";

/// The default location of the PEM-encoded serving private key.
pub const DEFAULT_TLS_PRIVATE_KEY_PATH: &str = "/certs/tls.key";

/// The name of the image pull secret every ServiceAccount must reference.
pub const DEFAULT_PULL_SECRET_NAME: &str = "dockerhub-secret";

/// The namespace holding the canonical copy of the pull secret.
pub const DEFAULT_SOURCE_NAMESPACE: &str = "default";

/// Upper bound on a single call to the Kubernetes API. Admission requests
/// must answer within the API server's webhook deadline, so cluster calls
/// are never allowed to wait indefinitely.
pub const KUBE_REQUEST_TIMEOUT: Duration = Duration::from_secs(5);
