//! JSON Patch synthesis for admitted ServiceAccounts.
use json_patch::{AddOperation, Patch, PatchOperation};
use jsonptr::PointerBuf;
use k8s_openapi::api::core::v1::ServiceAccount;
use serde_json::json;

/// Computes the JSON Patch which makes `service_account` reference the pull
/// secret `secret_name` in its `imagePullSecrets` list.
///
/// The patch only ever appends: existing entries survive unchanged and in
/// order. Re-admitting an object which already references the secret yields
/// an empty patch, so the mutation is idempotent.
pub fn build_pull_secret_patch(service_account: &ServiceAccount, secret_name: &str) -> Patch {
    let mut operations = Vec::new();

    let entries = service_account.image_pull_secrets.as_deref();

    if entries.is_none() {
        // "add" on the append path "/imagePullSecrets/-" is invalid while the
        // parent array is missing, so initialize it first.
        operations.push(PatchOperation::Add(AddOperation {
            path: PointerBuf::from_tokens(["imagePullSecrets"]),
            value: json!([]),
        }));
    }

    let already_referenced = entries
        .unwrap_or_default()
        .iter()
        .any(|reference| reference.name == secret_name);

    if !already_referenced {
        operations.push(PatchOperation::Add(AddOperation {
            path: PointerBuf::from_tokens(["imagePullSecrets", "-"]),
            value: json!({ "name": secret_name }),
        }));
    }

    Patch(operations)
}
