//! Mutating admission of ServiceAccounts.
use axum::{
    Json,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use k8s_openapi::{Resource, api::core::v1::ServiceAccount};
use kube::core::admission::{AdmissionRequest, AdmissionResponse, AdmissionReview};
use serde_json::json;
use tracing::instrument;

use super::AppState;
use crate::patch::build_pull_secret_patch;

/// Handles `POST /mutate`.
///
/// ServiceAccount requests are always admitted: provisioning trouble is
/// logged but never blocks the response, and the patch is attached
/// regardless of the provisioning outcome (fail-open).
#[instrument(skip_all)]
pub async fn mutate(
    State(state): State<AppState>,
    Json(review): Json<AdmissionReview<ServiceAccount>>,
) -> Response {
    let request: AdmissionRequest<ServiceAccount> = match review.try_into() {
        Ok(request) => request,
        Err(error) => {
            tracing::warn!(%error, "rejecting AdmissionReview without a request");
            return error_response("Invalid AdmissionReview request");
        }
    };

    if request.kind.kind != ServiceAccount::KIND {
        tracing::warn!(
            kind = %request.kind.kind,
            "rejecting admission request for a resource kind this webhook does not handle"
        );
        return error_response("Unhandled request");
    }

    // The visible fail-open branch: the outcome is recorded, the admission
    // below proceeds either way.
    if let Some(namespace) = request.namespace.as_deref() {
        match state.provisioner.ensure_pull_secret(namespace).await {
            Ok(provisioned) => {
                tracing::debug!(namespace, ?provisioned, "pull secret is in place");
            }
            Err(error) => {
                tracing::warn!(
                    %error,
                    namespace,
                    "failed to provision the pull secret, admitting anyway"
                );
            }
        }
    }

    let response = AdmissionResponse::from(&request);

    let service_account = request.object.unwrap_or_default();
    let patch = build_pull_secret_patch(&service_account, state.provisioner.secret_name());
    let response = match response.clone().with_patch(patch) {
        Ok(patched) => patched,
        Err(error) => {
            tracing::error!(%error, "failed to serialize the JSON patch, admitting unpatched");
            response
        }
    };

    Json(response.into_review()).into_response()
}

fn error_response(message: &str) -> Response {
    (StatusCode::BAD_REQUEST, Json(json!({ "error": message }))).into_response()
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::{
        Router,
        body::Body,
        http::{Request, Response, StatusCode, header::CONTENT_TYPE},
    };
    use base64::{Engine as _, engine::general_purpose::STANDARD};
    use kube::Client;
    use serde_json::{Value, json};
    use tower::ServiceExt;

    use super::*;
    use crate::{provision::SecretProvisioner, webhooks::router};

    const SECRET_NAME: &str = "dockerhub-secret";
    const REQUEST_UID: &str = "705ab4f5-6393-11e8-b7cc-42010a800002";

    /// A router whose provisioner sees a cluster where every namespace
    /// already holds the pull secret, keeping these tests focused on the
    /// admission pipeline.
    fn test_router() -> Router {
        let service = tower::service_fn(|_request: Request<kube::client::Body>| async {
            let secret = json!({
                "apiVersion": "v1",
                "kind": "Secret",
                "metadata": { "name": SECRET_NAME, "namespace": "team-a" },
                "data": {},
            });
            let response = Response::builder()
                .status(StatusCode::OK)
                .header(CONTENT_TYPE, "application/json")
                .body(kube::client::Body::from(
                    serde_json::to_vec(&secret).expect("secret serializes"),
                ))
                .expect("response builds");
            Ok::<_, std::convert::Infallible>(response)
        });
        let client = Client::new(service, "default");
        let provisioner =
            SecretProvisioner::new(client, "default".to_owned(), SECRET_NAME.to_owned());

        router(AppState {
            provisioner: Arc::new(provisioner),
        })
    }

    fn admission_review(kind: &str, object: Value) -> Value {
        json!({
            "apiVersion": "admission.k8s.io/v1",
            "kind": "AdmissionReview",
            "request": {
                "uid": REQUEST_UID,
                "kind": { "group": "", "version": "v1", "kind": kind },
                "resource": { "group": "", "version": "v1", "resource": "serviceaccounts" },
                "operation": "CREATE",
                "userInfo": {},
                "name": "build-bot",
                "namespace": "team-a",
                "object": object,
            },
        })
    }

    async fn send(body: &Value) -> (StatusCode, Value) {
        let request = Request::builder()
            .method("POST")
            .uri("/mutate")
            .header(CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .expect("request builds");

        let response = test_router()
            .oneshot(request)
            .await
            .expect("router is infallible");
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("response body is readable");

        (status, serde_json::from_slice(&bytes).expect("body is JSON"))
    }

    fn decoded_patch(body: &Value) -> Value {
        let response = &body["response"];
        assert_eq!(response["patchType"], "JSONPatch");
        let patch = STANDARD
            .decode(response["patch"].as_str().expect("patch is base64"))
            .expect("patch decodes");
        serde_json::from_slice(&patch).expect("patch is a JSON array")
    }

    #[tokio::test]
    async fn plain_object_gets_initialized_and_patched() {
        let (status, body) = send(&admission_review("ServiceAccount", json!({}))).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["apiVersion"], "admission.k8s.io/v1");
        assert_eq!(body["kind"], "AdmissionReview");
        assert_eq!(body["response"]["uid"], REQUEST_UID);
        assert_eq!(body["response"]["allowed"], true);
        assert_eq!(
            decoded_patch(&body),
            json!([
                { "op": "add", "path": "/imagePullSecrets", "value": [] },
                { "op": "add", "path": "/imagePullSecrets/-", "value": { "name": SECRET_NAME } },
            ])
        );
    }

    #[tokio::test]
    async fn already_patched_object_yields_empty_patch() {
        let object = json!({ "imagePullSecrets": [{ "name": SECRET_NAME }] });
        let (status, body) = send(&admission_review("ServiceAccount", object)).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["response"]["allowed"], true);
        assert_eq!(decoded_patch(&body), json!([]));
    }

    #[tokio::test]
    async fn unhandled_kind_is_rejected() {
        let object = json!({ "spec": { "containers": [] } });
        let (status, body) = send(&admission_review("Pod", object)).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body, json!({ "error": "Unhandled request" }));
    }

    #[tokio::test]
    async fn review_without_request_is_rejected() {
        let review = json!({
            "apiVersion": "admission.k8s.io/v1",
            "kind": "AdmissionReview",
        });
        let (status, body) = send(&review).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body, json!({ "error": "Invalid AdmissionReview request" }));
    }

    #[tokio::test]
    async fn decoded_patch_round_trips_onto_the_object() {
        let object = json!({ "imagePullSecrets": [{ "name": "quay-secret" }] });
        let (_, body) = send(&admission_review("ServiceAccount", object.clone())).await;

        let patch: json_patch::Patch =
            serde_json::from_value(decoded_patch(&body)).expect("patch deserializes");
        let mut patched = object;
        json_patch::patch(&mut patched, &patch).expect("patch applies cleanly");

        let names: Vec<&str> = patched["imagePullSecrets"]
            .as_array()
            .expect("imagePullSecrets is an array")
            .iter()
            .map(|entry| entry["name"].as_str().expect("entry has a name"))
            .collect();
        assert_eq!(names, ["quay-secret", SECRET_NAME]);
    }
}
