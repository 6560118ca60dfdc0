//! Ensures the registry pull secret exists in a target namespace.
//!
//! Namespaces do not share secrets, so the webhook keeps a canonical copy in
//! a single source namespace and copies it into every namespace which admits
//! a ServiceAccount. Creation is arbitrated by the API server's atomic
//! create, concurrent admission requests for the same namespace are expected
//! and resolved through the `AlreadyExists` status instead of client-side
//! locking.
use std::str::FromStr;

use k8s_openapi::api::core::v1::Secret;
use kube::{
    Api, Client,
    api::{ObjectMeta, PostParams},
};
use snafu::{OptionExt, ResultExt, Snafu};
use tracing::instrument;

use crate::constants::KUBE_REQUEST_TIMEOUT;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("failed to look up secret {secret_name:?} in namespace {namespace:?}"))]
    GetSecret {
        source: kube::Error,
        secret_name: String,
        namespace: String,
    },

    #[snafu(display("source secret {secret_name:?} missing in namespace {namespace:?}"))]
    SourceSecretMissing {
        secret_name: String,
        namespace: String,
    },

    #[snafu(display("failed to create secret {secret_name:?} in namespace {namespace:?}"))]
    CreateSecret {
        source: kube::Error,
        secret_name: String,
        namespace: String,
    },

    #[snafu(display("call to the Kubernetes API timed out after {:?}", KUBE_REQUEST_TIMEOUT))]
    RequestTimeout,
}

/// Status reasons the provisioner needs to tell apart. All other reasons are
/// treated as opaque failures.
#[derive(Debug, PartialEq, Eq)]
enum StatusReason {
    /// Status code 404
    NotFound,

    /// Status code 409, the resource being created already exists
    AlreadyExists,

    /// Status code 409, write conflict
    Conflict,
}

impl FromStr for StatusReason {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "NotFound" => Ok(Self::NotFound),
            "AlreadyExists" => Ok(Self::AlreadyExists),
            "Conflict" => Ok(Self::Conflict),
            _ => Err(()),
        }
    }
}

/// Returns a reason for an API error if there is one.
fn reason_for_error(error: &kube::Error) -> Option<StatusReason> {
    match error {
        kube::Error::Api(response) => response.reason.parse().ok(),
        _ => None,
    }
}

/// How the pull secret came to be present in the target namespace.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provisioned {
    /// The target namespace is the source namespace, there is nothing to
    /// copy.
    SourceNamespace,

    /// The secret already existed, the idempotent fast path.
    AlreadyPresent,

    /// The secret was copied over from the source namespace.
    Copied,

    /// A concurrent admission request created the copy first, which is just
    /// as ready.
    CopiedConcurrently,
}

/// Copies the canonical pull secret into namespaces which lack it.
///
/// The provisioner holds no per-request state and is shared between all
/// concurrently running admission handlers.
pub struct SecretProvisioner {
    client: Client,
    source_namespace: String,
    secret_name: String,
}

impl SecretProvisioner {
    pub fn new(client: Client, source_namespace: String, secret_name: String) -> Self {
        Self {
            client,
            source_namespace,
            secret_name,
        }
    }

    /// The name of the pull secret this provisioner maintains.
    pub fn secret_name(&self) -> &str {
        &self.secret_name
    }

    /// Ensures the pull secret exists in `namespace`, copying it from the
    /// source namespace when it is missing.
    #[instrument(skip(self))]
    pub async fn ensure_pull_secret(&self, namespace: &str) -> Result<Provisioned> {
        if namespace == self.source_namespace {
            // The target already holds the canonical copy, a self-copy would
            // only conflict with it.
            return Ok(Provisioned::SourceNamespace);
        }

        if self.get_secret(namespace).await?.is_some() {
            return Ok(Provisioned::AlreadyPresent);
        }

        let source = self
            .get_secret(&self.source_namespace)
            .await?
            .context(SourceSecretMissingSnafu {
                secret_name: &self.secret_name,
                namespace: &self.source_namespace,
            })?;

        self.create_copy(namespace, &source).await
    }

    fn secrets(&self, namespace: &str) -> Api<Secret> {
        Api::namespaced(self.client.clone(), namespace)
    }

    /// Looks up the pull secret in `namespace`, mapping the `NotFound`
    /// status to `None`.
    async fn get_secret(&self, namespace: &str) -> Result<Option<Secret>> {
        let result = tokio::time::timeout(
            KUBE_REQUEST_TIMEOUT,
            self.secrets(namespace).get(&self.secret_name),
        )
        .await
        .ok()
        .context(RequestTimeoutSnafu)?;

        match result {
            Ok(secret) => Ok(Some(secret)),
            Err(error) if reason_for_error(&error) == Some(StatusReason::NotFound) => Ok(None),
            Err(error) => Err(error).context(GetSecretSnafu {
                secret_name: &self.secret_name,
                namespace,
            }),
        }
    }

    async fn create_copy(&self, namespace: &str, source: &Secret) -> Result<Provisioned> {
        // Only the payload and user-supplied metadata travel. Identity fields
        // like uid and resourceVersion are unique per namespace and assigned
        // by the server on create.
        let copy = Secret {
            metadata: ObjectMeta {
                name: Some(self.secret_name.clone()),
                namespace: Some(namespace.to_owned()),
                labels: source.metadata.labels.clone(),
                annotations: source.metadata.annotations.clone(),
                ..ObjectMeta::default()
            },
            data: source.data.clone(),
            string_data: source.string_data.clone(),
            type_: source.type_.clone(),
            immutable: source.immutable,
        };

        let result = tokio::time::timeout(
            KUBE_REQUEST_TIMEOUT,
            self.secrets(namespace).create(&PostParams::default(), &copy),
        )
        .await
        .ok()
        .context(RequestTimeoutSnafu)?;

        match result {
            Ok(_) => Ok(Provisioned::Copied),
            Err(error)
                if matches!(
                    reason_for_error(&error),
                    Some(StatusReason::AlreadyExists | StatusReason::Conflict)
                ) =>
            {
                Ok(Provisioned::CopiedConcurrently)
            }
            Err(error) => Err(error).context(CreateSecretSnafu {
                secret_name: &self.secret_name,
                namespace,
            }),
        }
    }
}
