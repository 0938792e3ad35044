//! Admission webhook server.
//!
//! Provides HTTP endpoints for Kubernetes admission webhooks.
//!
//! To enable webhooks:
//! 1. Deploy cert-manager for TLS certificates
//! 2. Create a ValidatingWebhookConfiguration and a MutatingWebhookConfiguration
//! 3. Mount the TLS certificate secret to the operator pod at /etc/webhook/certs/
//!
//! The webhook server starts automatically when certificates are present.

use axum::{Json, Router, extract::State, http::StatusCode, response::IntoResponse, routing::post};
use k8s_openapi::api::core::v1::Pod;
use kube::core::admission::{AdmissionRequest, AdmissionResponse, AdmissionReview, Operation};
use kube::{Api, Client, ResourceExt};
use serde_json::json;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::crd::DynaKube;
use crate::modules::Modules;
use crate::webhooks::mutation::{ANNOTATION_INJECTED, InjectionInfo};
use crate::webhooks::validation::{ValidationContext, validate};

/// Default path to webhook TLS certificate
pub const WEBHOOK_CERT_PATH: &str = "/etc/webhook/certs/tls.crt";
/// Default path to webhook TLS private key
pub const WEBHOOK_KEY_PATH: &str = "/etc/webhook/certs/tls.key";
/// Default webhook server port
pub const WEBHOOK_PORT: u16 = 9443;

/// Shared state for webhook handlers
pub struct WebhookState {
    pub client: Client,
    pub modules: Modules,
}

impl WebhookState {
    pub fn new(client: Client, modules: Modules) -> Self {
        Self { client, modules }
    }
}

/// Create the webhook router
pub fn create_webhook_router(state: Arc<WebhookState>) -> Router {
    Router::new()
        .route("/validate-dynakube", post(validate_dynakube))
        .route("/mutate-pod", post(mutate_pod))
        .with_state(state)
}

/// Validate a DynaKube admission webhook handler.
///
/// Lists all DynaKubes before validating; the cross-instance checks need a
/// consistent snapshot of everything in scope.
async fn validate_dynakube(
    State(state): State<Arc<WebhookState>>,
    Json(review): Json<AdmissionReview<DynaKube>>,
) -> impl IntoResponse {
    let request: AdmissionRequest<DynaKube> = match review.try_into() {
        Ok(req) => req,
        Err(e) => {
            error!(error = %e, "Failed to extract admission request");
            return (
                StatusCode::BAD_REQUEST,
                Json(
                    AdmissionResponse::invalid(format!("Invalid AdmissionReview: {}", e))
                        .into_review(),
                ),
            );
        }
    };

    let uid = &request.uid;
    debug!(
        uid = %uid,
        operation = ?request.operation,
        namespace = ?request.namespace,
        name = ?request.name,
        "Processing admission request"
    );

    // DELETE operations are always allowed
    if request.operation == Operation::Delete {
        info!(uid = %uid, "Admission request allowed (DELETE)");
        return (
            StatusCode::OK,
            Json(AdmissionResponse::from(&request).into_review()),
        );
    }

    let dynakube: DynaKube = match &request.object {
        Some(obj) => obj.clone(),
        None => {
            error!(uid = %uid, "Missing object in request");
            return (
                StatusCode::OK,
                Json(
                    AdmissionResponse::from(&request)
                        .deny("Missing object in request")
                        .into_review(),
                ),
            );
        }
    };

    let all_dynakubes = match list_dynakubes(&state.client).await {
        Ok(items) => items,
        Err(e) => {
            error!(uid = %uid, error = %e, "Failed to list DynaKubes");
            return (
                StatusCode::OK,
                Json(
                    AdmissionResponse::from(&request)
                        .deny(format!("Failed to list DynaKubes: {}", e))
                        .into_review(),
                ),
            );
        }
    };

    let ctx = ValidationContext {
        dynakube: &dynakube,
        all_dynakubes: &all_dynakubes,
        modules: &state.modules,
    };
    let verdict = validate(&ctx);

    if !verdict.is_allowed() {
        let message = verdict.errors().join("\n");
        warn!(
            uid = %uid,
            name = %dynakube.name_any(),
            message = %message,
            "Admission request denied"
        );
        return (
            StatusCode::OK,
            Json(AdmissionResponse::from(&request).deny(message).into_review()),
        );
    }

    let mut response = AdmissionResponse::from(&request);
    if verdict.warnings().is_empty() {
        info!(uid = %uid, "Admission request allowed");
    } else {
        info!(
            uid = %uid,
            warnings = verdict.warnings().len(),
            "Admission request allowed with warnings"
        );
        response.warnings = Some(verdict.warnings().to_vec());
    }
    (StatusCode::OK, Json(response.into_review()))
}

async fn list_dynakubes(client: &Client) -> Result<Vec<DynaKube>, kube::Error> {
    let api: Api<DynaKube> = Api::all(client.clone());
    let list = api.list(&Default::default()).await?;
    Ok(list.items)
}

/// Mutate a pod admission webhook handler.
///
/// Resolves the injection features from the pod's annotations and stamps the
/// summary annotation onto the pod. A pod with nothing to inject passes
/// through unpatched.
async fn mutate_pod(
    State(_state): State<Arc<WebhookState>>,
    Json(review): Json<AdmissionReview<Pod>>,
) -> impl IntoResponse {
    let request: AdmissionRequest<Pod> = match review.try_into() {
        Ok(req) => req,
        Err(e) => {
            error!(error = %e, "Failed to extract admission request");
            return (
                StatusCode::BAD_REQUEST,
                Json(
                    AdmissionResponse::invalid(format!("Invalid AdmissionReview: {}", e))
                        .into_review(),
                ),
            );
        }
    };

    let uid = &request.uid;
    let Some(pod) = &request.object else {
        debug!(uid = %uid, "No pod in request, nothing to mutate");
        return (
            StatusCode::OK,
            Json(AdmissionResponse::from(&request).into_review()),
        );
    };

    let annotations = pod.metadata.annotations.clone().unwrap_or_default();
    let info = InjectionInfo::resolve(&annotations);

    let Some(injected) = info.render() else {
        debug!(uid = %uid, "No features enabled, pod not mutated");
        return (
            StatusCode::OK,
            Json(AdmissionResponse::from(&request).into_review()),
        );
    };

    let patch = match injection_patch(pod, &injected) {
        Ok(patch) => patch,
        Err(e) => {
            error!(uid = %uid, error = %e, "Failed to build patch");
            return (
                StatusCode::OK,
                Json(
                    AdmissionResponse::from(&request)
                        .deny(format!("Failed to build patch: {}", e))
                        .into_review(),
                ),
            );
        }
    };

    match AdmissionResponse::from(&request).with_patch(patch) {
        Ok(response) => {
            debug!(uid = %uid, injected = %injected, "Pod mutated");
            (StatusCode::OK, Json(response.into_review()))
        }
        Err(e) => {
            error!(uid = %uid, error = %e, "Failed to attach patch");
            (
                StatusCode::OK,
                Json(
                    AdmissionResponse::from(&request)
                        .deny(format!("Failed to attach patch: {}", e))
                        .into_review(),
                ),
            )
        }
    }
}

/// Build the JSON patch adding the injection summary annotation.
///
/// `/` in the annotation key is escaped as `~1` per RFC 6901. Pods without
/// an annotations map need it created first.
fn injection_patch(pod: &Pod, injected: &str) -> Result<json_patch::Patch, serde_json::Error> {
    let escaped_key = ANNOTATION_INJECTED.replace('/', "~1");
    let mut operations = Vec::new();
    if pod.metadata.annotations.is_none() {
        operations.push(json!({
            "op": "add",
            "path": "/metadata/annotations",
            "value": {}
        }));
    }
    operations.push(json!({
        "op": "add",
        "path": format!("/metadata/annotations/{escaped_key}"),
        "value": injected
    }));
    serde_json::from_value(serde_json::Value::Array(operations))
}

/// Errors that can occur when running the webhook server
#[derive(Debug)]
pub enum WebhookError {
    /// TLS configuration error
    TlsConfig(String),
    /// Server error
    Server(String),
}

impl std::fmt::Display for WebhookError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WebhookError::TlsConfig(msg) => write!(f, "TLS configuration error: {}", msg),
            WebhookError::Server(msg) => write!(f, "Webhook server error: {}", msg),
        }
    }
}

impl std::error::Error for WebhookError {}

/// Run the webhook server with TLS
///
/// Binds to 0.0.0.0:9443 and serves the /validate-dynakube and /mutate-pod
/// endpoints. TLS certificates are loaded from the paths specified.
///
/// # Arguments
/// * `client` - Kubernetes client
/// * `modules` - Module-enablement flags for validation
/// * `cert_path` - Path to TLS certificate file (PEM format)
/// * `key_path` - Path to TLS private key file (PEM format)
pub async fn run_webhook_server(
    client: Client,
    modules: Modules,
    cert_path: &str,
    key_path: &str,
) -> Result<(), WebhookError> {
    use axum_server::tls_rustls::RustlsConfig;
    use std::net::SocketAddr;
    use std::path::PathBuf;

    let state = Arc::new(WebhookState::new(client, modules));
    let app = create_webhook_router(state);

    let config = RustlsConfig::from_pem_file(PathBuf::from(cert_path), PathBuf::from(key_path))
        .await
        .map_err(|e| WebhookError::TlsConfig(e.to_string()))?;

    let addr = SocketAddr::from(([0, 0, 0, 0], WEBHOOK_PORT));
    info!(port = WEBHOOK_PORT, "Webhook server listening with TLS");

    axum_server::bind_rustls(addr, config)
        .serve(app.into_make_service())
        .await
        .map_err(|e| WebhookError::Server(e.to_string()))?;

    Ok(())
}
