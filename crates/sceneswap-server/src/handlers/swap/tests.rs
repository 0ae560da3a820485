//! Swap handler tests.

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use jsonwebtoken::{encode, EncodingKey, Header};
use serde::Serialize;

use sceneswap_domain::{
    BatchOrchestrator, EntitlementGate, EphemeralAsset, IdentityResolver, ProviderError,
    SceneAsset, SceneCatalog, StoreFailurePolicy, SwapJob, SwapStatus, TransformOptions,
    TransformProvider,
};
use sceneswap_storage::{EntitlementStore, MemoryEntitlementStore, StorageError, StorageResult};

use super::{SwapError, SwapHandler};

const SECRET: &str = "handler-test-secret";
const TTL: Duration = Duration::from_secs(3600);

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
struct CountingProvider {
    fail: bool,
    calls: AtomicUsize,
}

impl CountingProvider {
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
impl TransformProvider for CountingProvider {
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

/// Store that always fails.
struct DownStore;

#[async_trait]
impl EntitlementStore for DownStore {
    async fn conditional_set(&self, _: &str, _: &str, _: Duration) -> StorageResult<bool> {
        Err(StorageError::ConnectionError {
            message: "connection refused".to_string(),
        })
    }

    async fn get(&self, _: &str) -> StorageResult<Option<String>> {
        Err(StorageError::ConnectionError {
            message: "connection refused".to_string(),
        })
    }

    async fn health_check(&self) -> StorageResult<()> {
        Err(StorageError::HealthCheckFailed {
            message: "down".to_string(),
        })
    }
}

fn catalog_in(dir: &Path, names: &[&str]) -> Arc<SceneCatalog> {
    for name in names {
        std::fs::write(dir.join(name), format!("scene:{name}")).unwrap();
    }
    let names: Vec<String> = names.iter().map(|s| s.to_string()).collect();
    Arc::new(SceneCatalog::load(dir, None, &names))
}

fn handler_with<S: EntitlementStore, P: TransformProvider>(
    store: Arc<S>,
    provider: Arc<P>,
    catalog: Arc<SceneCatalog>,
    policy: StoreFailurePolicy,
) -> SwapHandler<S, P> {
    SwapHandler::new(
        IdentityResolver::new(SECRET),
        EntitlementGate::new(store, TTL, policy),
        BatchOrchestrator::new(
            provider,
            TransformOptions::default(),
            Duration::from_millis(500),
        ),
        catalog,
    )
}

fn job() -> SwapJob {
    SwapJob::new(
        EphemeralAsset::from_bytes(b"source-image").unwrap(),
        EphemeralAsset::from_bytes(b"target-image").unwrap(),
    )
}

/// Test: a healthy batch resolves the subject and yields one ok result per
/// catalog scene, with the uploads cleaned up afterwards
#[tokio::test]
async fn test_batch_success() {
    let dir = tempfile::tempdir().unwrap();
    let provider = CountingProvider::healthy();
    let handler = handler_with(
        Arc::new(MemoryEntitlementStore::new()),
        Arc::clone(&provider),
        catalog_in(dir.path(), &["a.jpg", "b.jpg", "c.jpg"]),
        StoreFailurePolicy::Closed,
    );

    let job = job();
    let primary_path = job.primary.path().to_path_buf();
    let secondary_path = job.secondary.path().to_path_buf();

    let outcome = handler
        .handle_batch(&token("alice@example.com"), job)
        .await
        .unwrap();

    assert_eq!(outcome.subject, "alice@example.com");
    assert!(!outcome.degraded);
    assert_eq!(outcome.images.len(), 3);
    assert!(outcome
        .images
        .iter()
        .all(|r| r.status == SwapStatus::Ok));
    assert_eq!(provider.calls(), 3);

    assert!(!primary_path.exists());
    assert!(!secondary_path.exists());
}

/// Test: a consumed entitlement rejects before any provider call
#[tokio::test]
async fn test_already_used_skips_provider() {
    let dir = tempfile::tempdir().unwrap();
    let provider = CountingProvider::healthy();
    let handler = handler_with(
        Arc::new(MemoryEntitlementStore::new()),
        Arc::clone(&provider),
        catalog_in(dir.path(), &["a.jpg"]),
        StoreFailurePolicy::Closed,
    );
    let credential = token("alice@example.com");

    handler.handle_batch(&credential, job()).await.unwrap();
    assert_eq!(provider.calls(), 1);

    let err = handler.handle_batch(&credential, job()).await.unwrap_err();
    assert!(matches!(err, SwapError::AlreadyUsed));
    // No further provider work happened for the rejected request.
    assert_eq!(provider.calls(), 1);
}

/// Test: an invalid credential rejects without touching gate or provider,
/// and the uploads are still cleaned up
#[tokio::test]
async fn test_invalid_credential_has_no_side_effects() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(MemoryEntitlementStore::new());
    let provider = CountingProvider::healthy();
    let handler = handler_with(
        Arc::clone(&store),
        Arc::clone(&provider),
        catalog_in(dir.path(), &["a.jpg"]),
        StoreFailurePolicy::Closed,
    );

    let job = job();
    let primary_path = job.primary.path().to_path_buf();

    let err = handler.handle_batch("not-a-jwt", job).await.unwrap_err();

    assert!(matches!(err, SwapError::CredentialInvalid { .. }));
    assert_eq!(provider.calls(), 0);
    assert_eq!(store.live_len(), 0);
    assert!(!primary_path.exists());
}

/// Test: N concurrent batches for one identity yield exactly one success
#[tokio::test]
async fn test_concurrent_batches_single_grant() {
    let dir = tempfile::tempdir().unwrap();
    let handler = Arc::new(handler_with(
        Arc::new(MemoryEntitlementStore::new()),
        CountingProvider::healthy(),
        catalog_in(dir.path(), &["a.jpg"]),
        StoreFailurePolicy::Closed,
    ));
    let credential = token("alice@example.com");

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let handler = Arc::clone(&handler);
            let credential = credential.clone();
            tokio::spawn(async move { handler.handle_batch(&credential, job()).await })
        })
        .collect();

    let mut succeeded = 0;
    let mut already_used = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => succeeded += 1,
            Err(SwapError::AlreadyUsed) => already_used += 1,
            Err(other) => panic!("unexpected error: {other}"),
        }
    }

    assert_eq!(succeeded, 1);
    assert_eq!(already_used, 7);
}

/// Test: store outage under fail-closed rejects without provider work and
/// cleans up the uploads
#[tokio::test]
async fn test_store_down_fail_closed() {
    let dir = tempfile::tempdir().unwrap();
    let provider = CountingProvider::healthy();
    let handler = handler_with(
        Arc::new(DownStore),
        Arc::clone(&provider),
        catalog_in(dir.path(), &["a.jpg"]),
        StoreFailurePolicy::Closed,
    );

    let job = job();
    let primary_path = job.primary.path().to_path_buf();

    let err = handler
        .handle_batch(&token("alice@example.com"), job)
        .await
        .unwrap_err();

    assert!(matches!(err, SwapError::StoreUnavailable));
    assert_eq!(provider.calls(), 0);
    assert!(!primary_path.exists());
}

/// Test: store outage under fail-open proceeds with the degraded marker
#[tokio::test]
async fn test_store_down_fail_open_proceeds() {
    let dir = tempfile::tempdir().unwrap();
    let handler = handler_with(
        Arc::new(DownStore),
        CountingProvider::healthy(),
        catalog_in(dir.path(), &["a.jpg"]),
        StoreFailurePolicy::Open,
    );

    let outcome = handler
        .handle_batch(&token("alice@example.com"), job())
        .await
        .unwrap();

    assert!(outcome.degraded);
    assert_eq!(outcome.images.len(), 1);
}

/// Test: a failing provider still produces a full batch
#[tokio::test]
async fn test_provider_failure_still_full_batch() {
    let dir = tempfile::tempdir().unwrap();
    let handler = handler_with(
        Arc::new(MemoryEntitlementStore::new()),
        CountingProvider::failing(),
        catalog_in(dir.path(), &["a.jpg", "b.jpg"]),
        StoreFailurePolicy::Closed,
    );

    let outcome = handler
        .handle_batch(&token("alice@example.com"), job())
        .await
        .unwrap();

    assert_eq!(outcome.images.len(), 2);
    for result in &outcome.images {
        assert_eq!(result.status, SwapStatus::Error);
        assert!(!result.image.is_empty());
    }
}

/// Test: the status probe reflects consumption without consuming
#[tokio::test]
async fn test_status_probe() {
    let dir = tempfile::tempdir().unwrap();
    let handler = handler_with(
        Arc::new(MemoryEntitlementStore::new()),
        CountingProvider::healthy(),
        catalog_in(dir.path(), &["a.jpg"]),
        StoreFailurePolicy::Closed,
    );
    let credential = token("alice@example.com");

    let status = handler.status(&credential).await.unwrap();
    assert_eq!(status.subject, "alice@example.com");
    assert!(!status.used);

    // Probing twice must not consume anything.
    assert!(!handler.status(&credential).await.unwrap().used);

    handler.handle_batch(&credential, job()).await.unwrap();
    assert!(handler.status(&credential).await.unwrap().used);
}

/// Test: the single swap is gated like the batch
#[tokio::test]
async fn test_single_swap_gated() {
    let dir = tempfile::tempdir().unwrap();
    let handler = handler_with(
        Arc::new(MemoryEntitlementStore::new()),
        CountingProvider::healthy(),
        catalog_in(dir.path(), &["a.jpg"]),
        StoreFailurePolicy::Closed,
    );
    let credential = token("alice@example.com");

    let outcome = handler.handle_single(&credential, job()).await.unwrap();
    assert_eq!(outcome.subject, "alice@example.com");
    assert_eq!(outcome.result.status, SwapStatus::Ok);

    let err = handler.handle_single(&credential, job()).await.unwrap_err();
    assert!(matches!(err, SwapError::AlreadyUsed));
}
