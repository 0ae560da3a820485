//! HTTP API tests.

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{Method, Request, StatusCode},
};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use jsonwebtoken::{encode, EncodingKey, Header};
use metrics_exporter_prometheus::PrometheusBuilder;
use serde::Serialize;
use tower::ServiceExt; // for oneshot

use sceneswap_domain::{ProviderError, SceneAsset, TransformOptions, TransformProvider};
use sceneswap_server::ServerConfig;
use sceneswap_storage::MemoryEntitlementStore;

use super::routes::{create_router, create_router_with_observability};
use super::state::AppState;
use crate::adapters::RemoteTransformProvider;
use crate::middleware::cors_layer;
use crate::observability::MetricsState;

const SECRET: &str = "http-test-secret";
const BOUNDARY: &str = "sceneswap-test-boundary";
const SOURCE_BYTES: &[u8] = b"source-image-bytes";
const TARGET_BYTES: &[u8] = b"target-image-bytes";

#[derive(Serialize)]
struct TestClaims {
    email: String,
    exp: i64,
}

fn token(subject: &str) -> String {
    let exp = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap()
        .as_secs() as i64
        + 3600;
    encode(
        &Header::default(),
        &TestClaims {
            email: subject.to_string(),
            exp,
        },
        &EncodingKey::from_secret(SECRET.as_bytes()),
    )
    .unwrap()
}

/// Provider that counts calls and either succeeds or fails hard.
struct TestProvider {
    fail: bool,
    calls: AtomicUsize,
}

impl TestProvider {
    fn healthy() -> Arc<Self> {
        Arc::new(Self {
            fail: false,
            calls: AtomicUsize::new(0),
        })
    }

    fn failing() -> Arc<Self> {
        Arc::new(Self {
            fail: true,
            calls: AtomicUsize::new(0),
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TransformProvider for TestProvider {
    async fn transform(
        &self,
        _scene: &SceneAsset,
        _primary: &[u8],
        _secondary: &[u8],
        _options: &TransformOptions,
    ) -> Result<Vec<u8>, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            Err(ProviderError::Api {
                status: 500,
                message: "provider exploded".to_string(),
            })
        } else {
            Ok(b"swapped-image".to_vec())
        }
    }
}

fn test_config(scene_dir: &Path, scenes: &[&str]) -> ServerConfig {
    let mut config = ServerConfig::default();
    config.auth.jwt_secret = SECRET.to_string();
    config.catalog.scene_dir = scene_dir.display().to_string();
    config.catalog.scenes = scenes.iter().map(|s| s.to_string()).collect();
    config
}

/// Writes scene files and builds a router over an in-memory store.
fn test_app<P: TransformProvider>(
    dir: &Path,
    present: &[&str],
    listed: &[&str],
    provider: Arc<P>,
) -> axum::Router {
    for name in present {
        std::fs::write(dir.join(name), format!("scene:{name}")).unwrap();
    }
    let config = test_config(dir, listed);
    let state = AppState::new(Arc::new(MemoryEntitlementStore::new()), provider, &config);
    create_router(state)
}

fn multipart_body(parts: &[(&str, &[u8])]) -> Vec<u8> {
    let mut body = Vec::new();
    for (name, bytes) in parts {
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"; \
                 filename=\"{name}.jpg\"\r\nContent-Type: application/octet-stream\r\n\r\n"
            )
            .as_bytes(),
        );
        body.extend_from_slice(bytes);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
    body
}

fn swap_request(uri: &str, auth: Option<&str>, parts: &[(&str, &[u8])]) -> Request<Body> {
    let mut builder = Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header(
            "content-type",
            format!("multipart/form-data; boundary={BOUNDARY}"),
        );
    if let Some(token) = auth {
        builder = builder.header("authorization", format!("Bearer {token}"));
    }
    builder.body(Body::from(multipart_body(parts))).unwrap()
}

fn full_upload() -> Vec<(&'static str, &'static [u8])> {
    vec![("source", SOURCE_BYTES), ("target", TARGET_BYTES)]
}

async fn response_json(response: axum::response::Response) -> serde_json::Value {
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&body).unwrap()
}

/// Test: health endpoint responds ok
#[tokio::test]
async fn test_health_check() {
    let dir = tempfile::tempdir().unwrap();
    let app = test_app(dir.path(), &[], &["a.jpg"], TestProvider::healthy());

    let response = app
        .oneshot(
            Request::builder()
                .uri("/health")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = response_json(response).await;
    assert_eq!(json["status"], "ok");
}

/// Test: readiness endpoint validates the in-memory store
#[tokio::test]
async fn test_readiness_check() {
    let dir = tempfile::tempdir().unwrap();
    let app = test_app(dir.path(), &[], &["a.jpg"], TestProvider::healthy());

    let response = app
        .oneshot(Request::builder().uri("/ready").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
}

/// Test: missing credential is rejected with 401 before any work
#[tokio::test]
async fn test_swap_missing_credential() {
    let dir = tempfile::tempdir().unwrap();
    let provider = TestProvider::healthy();
    let app = test_app(
        dir.path(),
        &["a.jpg"],
        &["a.jpg"],
        Arc::clone(&provider),
    );

    let response = app
        .oneshot(swap_request("/swap", None, &full_upload()))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let json = response_json(response).await;
    assert_eq!(json["code"], "credential_missing");
    assert_eq!(provider.calls(), 0);
}

/// Test: forged credential is rejected with 401
#[tokio::test]
async fn test_swap_invalid_credential() {
    let dir = tempfile::tempdir().unwrap();
    let app = test_app(dir.path(), &["a.jpg"], &["a.jpg"], TestProvider::healthy());

    let response = app
        .oneshot(swap_request("/swap", Some("garbage-token"), &full_upload()))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let json = response_json(response).await;
    assert_eq!(json["code"], "credential_invalid");
}

/// Test: missing target upload is a 400 validation error
#[tokio::test]
async fn test_swap_missing_asset() {
    let dir = tempfile::tempdir().unwrap();
    let provider = TestProvider::healthy();
    let app = test_app(
        dir.path(),
        &["a.jpg"],
        &["a.jpg"],
        Arc::clone(&provider),
    );

    let response = app
        .oneshot(swap_request(
            "/swap",
            Some(&token("alice@example.com")),
            &[("source", SOURCE_BYTES)],
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = response_json(response).await;
    assert_eq!(json["code"], "validation_error");
    // Rejected before entitlement or provider work.
    assert_eq!(provider.calls(), 0);
}

/// Test: a healthy full batch returns one ok image per scene, in catalog
/// order
#[tokio::test]
async fn test_swap_full_batch_success() {
    let dir = tempfile::tempdir().unwrap();
    let app = test_app(
        dir.path(),
        &["a.jpg", "b.jpg", "c.jpg"],
        &["a.jpg", "b.jpg", "c.jpg"],
        TestProvider::healthy(),
    );

    let response = app
        .oneshot(swap_request(
            "/swap",
            Some(&token("alice@example.com")),
            &full_upload(),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = response_json(response).await;
    assert_eq!(json["subject"], "alice@example.com");
    assert_eq!(json["degraded"], false);

    let images = json["images"].as_array().unwrap();
    assert_eq!(images.len(), 3);
    for (image, expected) in images.iter().zip(["a.jpg", "b.jpg", "c.jpg"]) {
        assert_eq!(image["scene"], expected);
        assert_eq!(image["status"], "ok");
        assert!(image.get("note").is_none());
        let decoded = BASE64.decode(image["b64"].as_str().unwrap()).unwrap();
        assert_eq!(decoded, b"swapped-image");
    }
}

/// Test: the second request for the same identity is rejected with 403 and
/// makes no provider calls
#[tokio::test]
async fn test_swap_second_request_already_used() {
    let dir = tempfile::tempdir().unwrap();
    for name in ["a.jpg", "b.jpg"] {
        std::fs::write(dir.path().join(name), "scene").unwrap();
    }
    let provider = TestProvider::healthy();
    let config = test_config(dir.path(), &["a.jpg", "b.jpg"]);
    let state = AppState::new(
        Arc::new(MemoryEntitlementStore::new()),
        Arc::clone(&provider),
        &config,
    );
    let app = create_router(state);
    let credential = token("alice@example.com");

    let first = app
        .clone()
        .oneshot(swap_request("/swap", Some(&credential), &full_upload()))
        .await
        .unwrap();
    assert_eq!(first.status(), StatusCode::OK);
    assert_eq!(provider.calls(), 2);

    let second = app
        .oneshot(swap_request("/swap", Some(&credential), &full_upload()))
        .await
        .unwrap();
    assert_eq!(second.status(), StatusCode::FORBIDDEN);
    let json = response_json(second).await;
    assert_eq!(json["code"], "free_use_consumed");
    assert_eq!(provider.calls(), 2);
}

/// Test: a missing scene file degrades that scene only
#[tokio::test]
async fn test_swap_missing_scene_falls_back() {
    let dir = tempfile::tempdir().unwrap();
    let app = test_app(
        dir.path(),
        &["a.jpg", "c.jpg"],
        &["a.jpg", "b.jpg", "c.jpg"],
        TestProvider::healthy(),
    );

    let response = app
        .oneshot(swap_request(
            "/swap",
            Some(&token("alice@example.com")),
            &full_upload(),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = response_json(response).await;
    let images = json["images"].as_array().unwrap();
    assert_eq!(images.len(), 3);
    assert_eq!(images[0]["status"], "ok");
    assert_eq!(images[1]["status"], "fallback");
    assert_eq!(images[1]["note"], "scene missing");
    let substitute = BASE64.decode(images[1]["b64"].as_str().unwrap()).unwrap();
    assert_eq!(substitute, SOURCE_BYTES);
    assert_eq!(images[2]["status"], "ok");
}

/// Test: a failing provider still yields HTTP success with a full batch of
/// substitutes
#[tokio::test]
async fn test_swap_provider_down_degrades_per_scene() {
    let dir = tempfile::tempdir().unwrap();
    let app = test_app(
        dir.path(),
        &["a.jpg", "b.jpg"],
        &["a.jpg", "b.jpg"],
        TestProvider::failing(),
    );

    let response = app
        .oneshot(swap_request(
            "/swap",
            Some(&token("alice@example.com")),
            &full_upload(),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = response_json(response).await;
    let images = json["images"].as_array().unwrap();
    assert_eq!(images.len(), 2);
    for image in images {
        assert_eq!(image["status"], "error");
        let substitute = BASE64.decode(image["b64"].as_str().unwrap()).unwrap();
        assert_eq!(substitute, SOURCE_BYTES);
    }
}

/// Test: echo mode (disabled provider) exercises the full pipeline
#[tokio::test]
async fn test_swap_echo_mode() {
    let dir = tempfile::tempdir().unwrap();
    let app = test_app(
        dir.path(),
        &["a.jpg"],
        &["a.jpg"],
        Arc::new(RemoteTransformProvider::disabled()),
    );

    let response = app
        .oneshot(swap_request(
            "/swap",
            Some(&token("alice@example.com")),
            &full_upload(),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = response_json(response).await;
    let images = json["images"].as_array().unwrap();
    assert_eq!(images[0]["status"], "fallback");
    let echoed = BASE64.decode(images[0]["b64"].as_str().unwrap()).unwrap();
    assert_eq!(echoed, SOURCE_BYTES);
}

/// Test: the query-parameter credential fallback is accepted
#[tokio::test]
async fn test_swap_query_token_fallback() {
    let dir = tempfile::tempdir().unwrap();
    let app = test_app(dir.path(), &["a.jpg"], &["a.jpg"], TestProvider::healthy());

    let uri = format!("/swap?token={}", token("alice@example.com"));
    let response = app
        .oneshot(swap_request(&uri, None, &full_upload()))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
}

/// Test: the single swap endpoint returns one image under the same gate
#[tokio::test]
async fn test_single_swap() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(dir.path(), &["a.jpg"]);
    let state = AppState::new(
        Arc::new(MemoryEntitlementStore::new()),
        TestProvider::healthy(),
        &config,
    );
    let app = create_router(state);
    let credential = token("alice@example.com");

    let response = app
        .clone()
        .oneshot(swap_request("/swap/single", Some(&credential), &full_upload()))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = response_json(response).await;
    assert_eq!(json["subject"], "alice@example.com");
    assert_eq!(json["status"], "ok");
    let decoded = BASE64.decode(json["b64"].as_str().unwrap()).unwrap();
    assert_eq!(decoded, b"swapped-image");

    let second = app
        .oneshot(swap_request("/swap/single", Some(&credential), &full_upload()))
        .await
        .unwrap();
    assert_eq!(second.status(), StatusCode::FORBIDDEN);
}

/// Test: the entitlement probe reports consumption without consuming
#[tokio::test]
async fn test_entitlement_status_endpoint() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("a.jpg"), "scene").unwrap();
    let config = test_config(dir.path(), &["a.jpg"]);
    let state = AppState::new(
        Arc::new(MemoryEntitlementStore::new()),
        TestProvider::healthy(),
        &config,
    );
    let app = create_router(state);
    let credential = token("alice@example.com");

    // No credential -> 401.
    let unauthorized = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/entitlement")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(unauthorized.status(), StatusCode::UNAUTHORIZED);

    // Fresh identity -> not used; probing twice stays not used.
    for _ in 0..2 {
        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .uri(format!("/entitlement?token={credential}"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let json = response_json(response).await;
        assert_eq!(json["subject"], "alice@example.com");
        assert_eq!(json["used"], false);
    }

    // After a swap the flag flips.
    app.clone()
        .oneshot(swap_request("/swap", Some(&credential), &full_upload()))
        .await
        .unwrap();

    let response = app
        .oneshot(
            Request::builder()
                .uri(format!("/entitlement?token={credential}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    let json = response_json(response).await;
    assert_eq!(json["used"], true);
}

/// Test: the CORS boundary admits only allow-listed origins
#[tokio::test]
async fn test_cors_allow_list() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("a.jpg"), "scene").unwrap();
    let config = test_config(dir.path(), &["a.jpg"]);
    let state = AppState::new(
        Arc::new(MemoryEntitlementStore::new()),
        TestProvider::healthy(),
        &config,
    );
    let metrics_state = MetricsState::new(PrometheusBuilder::new().build_recorder().handle());
    let cors = cors_layer(&["https://app.example".to_string()]);
    let app = create_router_with_observability(state, metrics_state, cors, 1024 * 1024);

    let preflight = |origin: &'static str| {
        Request::builder()
            .method(Method::OPTIONS)
            .uri("/swap")
            .header("origin", origin)
            .header("access-control-request-method", "POST")
            .body(Body::empty())
            .unwrap()
    };

    let allowed = app.clone().oneshot(preflight("https://app.example")).await.unwrap();
    assert_eq!(
        allowed
            .headers()
            .get("access-control-allow-origin")
            .and_then(|v| v.to_str().ok()),
        Some("https://app.example")
    );

    let denied = app.oneshot(preflight("https://evil.example")).await.unwrap();
    assert!(denied.headers().get("access-control-allow-origin").is_none());
}

/// Test: the metrics endpoint renders Prometheus text
#[tokio::test]
async fn test_metrics_endpoint() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(dir.path(), &["a.jpg"]);
    let state = AppState::new(
        Arc::new(MemoryEntitlementStore::new()),
        TestProvider::healthy(),
        &config,
    );
    let metrics_state = MetricsState::new(PrometheusBuilder::new().build_recorder().handle());
    let app = create_router_with_observability(state, metrics_state, cors_layer(&[]), 1024);

    let response = app
        .oneshot(
            Request::builder()
                .uri("/metrics")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
}
