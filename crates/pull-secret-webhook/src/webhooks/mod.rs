//! The admission endpoints and the state they share.
use std::sync::Arc;

use axum::{Router, routing::post};

use crate::provision::SecretProvisioner;

pub mod service_account;

/// State shared by all admission handlers. Cheap to clone and free of
/// per-request data, so axum may run any number of handler invocations
/// concurrently against it.
#[derive(Clone)]
pub struct AppState {
    pub provisioner: Arc<SecretProvisioner>,
}

/// Builds the admission router served by the webhook server.
///
/// The webhook registers a single rule, so a single route suffices.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/mutate", post(service_account::mutate))
        .with_state(state)
}
