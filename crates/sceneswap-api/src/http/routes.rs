//! HTTP route definitions and handlers.

use std::sync::Arc;

use axum::{
    extract::{DefaultBodyLimit, Multipart, Query, State},
    http::{header, HeaderMap, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use serde::{Deserialize, Serialize};
use tower_http::cors::CorsLayer;
use tower_http::limit::RequestBodyLimitLayer;
use tracing::error;

use sceneswap_domain::{EphemeralAsset, SceneResult, SwapJob, SwapStatus, TransformProvider};
use sceneswap_server::handlers::swap::{SingleSwapOutcome, SwapError, SwapOutcome};
use sceneswap_storage::EntitlementStore;

use super::state::AppState;
use crate::middleware::request_id;
use crate::observability::{metrics_handler, MetricsState};

/// Default request body size limit (20MB). Uploads carry two images.
pub const DEFAULT_BODY_LIMIT: usize = 20 * 1024 * 1024;

/// Multipart field carrying the face to transplant.
const SOURCE_FIELD: &str = "source";
/// Multipart field carrying the second reference photo.
const TARGET_FIELD: &str = "target";

/// Private helper for the API routes.
fn api_routes<S: EntitlementStore, P: TransformProvider>() -> Router<Arc<AppState<S, P>>> {
    Router::new()
        .route("/swap", post(swap_batch::<S, P>))
        .route("/swap/single", post(swap_single::<S, P>))
        .route("/entitlement", get(entitlement_status::<S, P>))
}

/// Creates the HTTP router with the default body size limit.
pub fn create_router<S: EntitlementStore, P: TransformProvider>(state: AppState<S, P>) -> Router {
    create_router_with_body_limit(state, DEFAULT_BODY_LIMIT)
}

/// Creates the HTTP router with a custom body size limit.
pub fn create_router_with_body_limit<S: EntitlementStore, P: TransformProvider>(
    state: AppState<S, P>,
    body_limit: usize,
) -> Router {
    let shared_state = Arc::new(state);
    api_routes::<S, P>()
        .route("/health", get(health_check))
        .route("/ready", get(readiness_check::<S, P>))
        .with_state(shared_state)
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(RequestBodyLimitLayer::new(body_limit))
        .layer(axum::middleware::from_fn(request_id))
}

/// Creates the HTTP router with observability endpoints and the CORS
/// boundary.
///
/// This is the production router: all API routes plus `/metrics`,
/// `/health`, and `/ready`, wrapped in the origin allow-list. Pre-flight
/// requests are short-circuited by the CORS layer and never reach the
/// handlers.
pub fn create_router_with_observability<S: EntitlementStore, P: TransformProvider>(
    state: AppState<S, P>,
    metrics_state: MetricsState,
    cors: CorsLayer,
    body_limit: usize,
) -> Router {
    let shared_state = Arc::new(state);

    let api_router = api_routes::<S, P>()
        .route("/ready", get(readiness_check::<S, P>))
        .with_state(shared_state)
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(RequestBodyLimitLayer::new(body_limit));

    // Observability routes skip the body limit; they carry no payloads.
    let observability_router = Router::new()
        .route("/metrics", get(metrics_handler))
        .route("/health", get(health_check))
        .with_state(metrics_state);

    api_router
        .merge(observability_router)
        .layer(cors)
        .layer(axum::middleware::from_fn(request_id))
}

// ============================================================
// Error Handling
// ============================================================

/// API error codes.
///
/// Each code maps to a specific HTTP status via [`ApiError::into_response`].
pub mod error_codes {
    // 401 Unauthorized
    /// No credential was supplied with the request.
    pub const CREDENTIAL_MISSING: &str = "credential_missing";
    /// The supplied credential is malformed, forged, or expired.
    pub const CREDENTIAL_INVALID: &str = "credential_invalid";

    // 400 Bad Request
    /// Input validation failure (missing upload fields, malformed multipart).
    pub const VALIDATION_ERROR: &str = "validation_error";

    // 403 Forbidden
    /// The identity's single free use is already consumed.
    pub const FREE_USE_CONSUMED: &str = "free_use_consumed";

    // 5xx
    /// The entitlement store is unreachable under the fail-closed policy.
    pub const STORE_UNAVAILABLE: &str = "store_unavailable";
    /// Request body exceeds the configured limit.
    pub const PAYLOAD_TOO_LARGE: &str = "payload_too_large";
    /// Unexpected internal server error.
    pub const INTERNAL_ERROR: &str = "internal_error";
}

/// API error response format.
#[derive(Debug, Serialize)]
pub struct ApiError {
    pub code: String,
    pub message: String,
}

impl ApiError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }

    /// Creates a credential missing error (401).
    pub fn credential_missing() -> Self {
        Self::new(error_codes::CREDENTIAL_MISSING, "missing credential")
    }

    /// Creates a credential invalid error (401).
    pub fn credential_invalid(message: impl Into<String>) -> Self {
        Self::new(error_codes::CREDENTIAL_INVALID, message)
    }

    /// Creates a validation error (400).
    pub fn validation_error(message: impl Into<String>) -> Self {
        Self::new(error_codes::VALIDATION_ERROR, message)
    }

    /// Creates a free use consumed error (403).
    pub fn free_use_consumed() -> Self {
        Self::new(error_codes::FREE_USE_CONSUMED, "free use already consumed")
    }

    /// Creates a store unavailable error (503).
    pub fn store_unavailable() -> Self {
        Self::new(
            error_codes::STORE_UNAVAILABLE,
            "entitlement store unavailable",
        )
    }

    /// Creates an internal error (500).
    pub fn internal_error(message: impl Into<String>) -> Self {
        Self::new(error_codes::INTERNAL_ERROR, message)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        use error_codes::*;

        let status = match self.code.as_str() {
            CREDENTIAL_MISSING | CREDENTIAL_INVALID => StatusCode::UNAUTHORIZED,
            VALIDATION_ERROR => StatusCode::BAD_REQUEST,
            FREE_USE_CONSUMED => StatusCode::FORBIDDEN,
            STORE_UNAVAILABLE => StatusCode::SERVICE_UNAVAILABLE,
            PAYLOAD_TOO_LARGE => StatusCode::PAYLOAD_TOO_LARGE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, Json(self)).into_response()
    }
}

impl From<SwapError> for ApiError {
    fn from(err: SwapError) -> Self {
        match err {
            SwapError::CredentialMissing => ApiError::credential_missing(),
            SwapError::CredentialInvalid { reason } => ApiError::credential_invalid(reason),
            SwapError::AssetMissing { field } => {
                ApiError::validation_error(format!("missing upload: {field}"))
            }
            SwapError::AlreadyUsed => ApiError::free_use_consumed(),
            SwapError::StoreUnavailable => ApiError::store_unavailable(),
            SwapError::Internal { message } => {
                // Full detail stays in the log; clients get a generic error.
                error!("swap handler internal error: {message}");
                ApiError::internal_error("internal error")
            }
        }
    }
}

// ============================================================
// Request / Response Types
// ============================================================

#[derive(Debug, Deserialize)]
struct TokenQuery {
    token: Option<String>,
}

/// One serialized scene result.
#[derive(Debug, Serialize)]
pub struct SceneImage {
    pub scene: String,
    pub b64: String,
    pub status: SwapStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

impl From<SceneResult> for SceneImage {
    fn from(result: SceneResult) -> Self {
        Self {
            scene: result.scene,
            b64: BASE64.encode(&result.image),
            status: result.status,
            note: result.note,
        }
    }
}

/// Response body of `POST /swap`.
#[derive(Debug, Serialize)]
pub struct SwapResponse {
    pub subject: String,
    pub degraded: bool,
    pub images: Vec<SceneImage>,
}

impl From<SwapOutcome> for SwapResponse {
    fn from(outcome: SwapOutcome) -> Self {
        Self {
            subject: outcome.subject,
            degraded: outcome.degraded,
            images: outcome.images.into_iter().map(SceneImage::from).collect(),
        }
    }
}

/// Response body of `POST /swap/single`.
#[derive(Debug, Serialize)]
pub struct SingleSwapResponse {
    pub subject: String,
    pub b64: String,
    pub status: SwapStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

impl From<SingleSwapOutcome> for SingleSwapResponse {
    fn from(outcome: SingleSwapOutcome) -> Self {
        Self {
            subject: outcome.subject,
            b64: BASE64.encode(&outcome.result.image),
            status: outcome.result.status,
            note: outcome.result.note,
        }
    }
}

/// Response body of `GET /entitlement`.
#[derive(Debug, Serialize)]
pub struct EntitlementResponse {
    pub subject: String,
    pub used: bool,
}

// ============================================================
// Credential & Upload Intake
// ============================================================

/// Extracts the bearer credential from the `Authorization` header, falling
/// back to the `token` query parameter.
fn bearer_token(headers: &HeaderMap, query: &TokenQuery) -> Option<String> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::to_owned)
        .or_else(|| query.token.clone())
}

/// Reads the two upload fields out of the multipart body and spools them.
///
/// Unknown fields are ignored. Missing or empty `source`/`target` fields
/// reject the request before any entitlement or provider work happens.
async fn read_job(multipart: &mut Multipart) -> Result<SwapJob, ApiError> {
    let mut source: Option<EphemeralAsset> = None;
    let mut target: Option<EphemeralAsset> = None;

    while let Some(field) = multipart.next_field().await.map_err(|e| {
        ApiError::validation_error(format!("malformed multipart body: {e}"))
    })? {
        let Some(name) = field.name().map(str::to_owned) else {
            continue;
        };
        if name != SOURCE_FIELD && name != TARGET_FIELD {
            continue;
        }

        let bytes = field.bytes().await.map_err(|e| {
            ApiError::validation_error(format!("failed to read upload '{name}': {e}"))
        })?;
        if bytes.is_empty() {
            return Err(ApiError::validation_error(format!(
                "upload '{name}' is empty"
            )));
        }

        let asset = EphemeralAsset::from_bytes(&bytes).map_err(|e| {
            error!("failed to spool upload '{name}': {e}");
            ApiError::internal_error("failed to store upload")
        })?;

        if name == SOURCE_FIELD {
            source = Some(asset);
        } else {
            target = Some(asset);
        }
    }

    let source =
        source.ok_or_else(|| ApiError::validation_error(format!("missing upload: {SOURCE_FIELD}")))?;
    let target =
        target.ok_or_else(|| ApiError::validation_error(format!("missing upload: {TARGET_FIELD}")))?;

    Ok(SwapJob::new(source, target))
}

// ============================================================
// Handlers
// ============================================================

/// POST /swap - batch swap across the scene catalog.
async fn swap_batch<S: EntitlementStore, P: TransformProvider>(
    State(state): State<Arc<AppState<S, P>>>,
    Query(query): Query<TokenQuery>,
    headers: HeaderMap,
    mut multipart: Multipart,
) -> Result<Json<SwapResponse>, ApiError> {
    // Credential presence is checked before the body is consumed, so a
    // missing credential never spools uploads.
    let token = bearer_token(&headers, &query).ok_or_else(ApiError::credential_missing)?;

    let job = read_job(&mut multipart).await?;

    let outcome = state.handler.handle_batch(&token, job).await?;
    Ok(Json(SwapResponse::from(outcome)))
}

/// POST /swap/single - one swap of the uploaded pair.
async fn swap_single<S: EntitlementStore, P: TransformProvider>(
    State(state): State<Arc<AppState<S, P>>>,
    Query(query): Query<TokenQuery>,
    headers: HeaderMap,
    mut multipart: Multipart,
) -> Result<Json<SingleSwapResponse>, ApiError> {
    let token = bearer_token(&headers, &query).ok_or_else(ApiError::credential_missing)?;

    let job = read_job(&mut multipart).await?;

    let outcome = state.handler.handle_single(&token, job).await?;
    Ok(Json(SingleSwapResponse::from(outcome)))
}

/// GET /entitlement - free-use status for a credential. Read-only.
async fn entitlement_status<S: EntitlementStore, P: TransformProvider>(
    State(state): State<Arc<AppState<S, P>>>,
    Query(query): Query<TokenQuery>,
    headers: HeaderMap,
) -> Result<Json<EntitlementResponse>, ApiError> {
    let token = bearer_token(&headers, &query).ok_or_else(ApiError::credential_missing)?;

    let status = state.handler.status(&token).await?;
    Ok(Json(EntitlementResponse {
        subject: status.subject,
        used: status.used,
    }))
}

/// GET /health - liveness check.
async fn health_check() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}

/// GET /ready - readiness check validating store reachability.
async fn readiness_check<S: EntitlementStore, P: TransformProvider>(
    State(state): State<Arc<AppState<S, P>>>,
) -> Result<Json<serde_json::Value>, ApiError> {
    state.storage.health_check().await.map_err(|e| {
        error!("readiness check failed: {e}");
        ApiError::store_unavailable()
    })?;
    Ok(Json(serde_json::json!({ "status": "ready" })))
}
