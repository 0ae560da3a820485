//! Batch fan-out over the scene catalog.
//!
//! The orchestrator is best-effort, not transactional: one scene's failure
//! never aborts the others, and every scene yields a result with a
//! non-empty payload — the primary upload serves as the substitute when the
//! provider cannot deliver.

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use serde::Serialize;
use tokio::time::timeout;
use tracing::{debug, warn};

use crate::catalog::{SceneCatalog, SceneDescriptor};
use crate::provider::{ProviderError, SceneAsset, TransformOptions, TransformProvider};

/// Outcome class of a single scene transform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SwapStatus {
    /// The provider delivered a usable payload.
    Ok,
    /// A soft miss (scene missing, empty payload, provider disabled); the
    /// payload is the substituted primary upload.
    Fallback,
    /// A hard provider failure or timeout; payload substituted as above.
    Error,
}

/// Per-scene result. `image` is always non-empty.
#[derive(Debug, Clone)]
pub struct SceneResult {
    pub scene: String,
    pub image: Vec<u8>,
    pub status: SwapStatus,
    pub note: Option<String>,
}

/// Best-effort fan-out of one transform request across the catalog.
pub struct BatchOrchestrator<P> {
    provider: Arc<P>,
    options: TransformOptions,
    call_timeout: Duration,
}

impl<P: TransformProvider> BatchOrchestrator<P> {
    /// Creates an orchestrator with a bounded per-call latency.
    pub fn new(provider: Arc<P>, options: TransformOptions, call_timeout: Duration) -> Self {
        Self {
            provider,
            options,
            call_timeout,
        }
    }

    /// Runs the batch.
    ///
    /// The output always has exactly one entry per catalog scene, in
    /// catalog order, regardless of individual failures. Scenes execute
    /// concurrently; `join_all` returns results in input order, so catalog
    /// order survives the concurrency.
    pub async fn run(
        &self,
        primary: &[u8],
        secondary: &[u8],
        catalog: &SceneCatalog,
    ) -> Vec<SceneResult> {
        let results = join_all(
            catalog
                .scenes()
                .iter()
                .map(|scene| self.swap_scene(scene, primary, secondary)),
        )
        .await;

        debug_assert_eq!(results.len(), catalog.len());
        results
    }

    /// Single-pair swap backing the non-batch endpoint: the primary upload
    /// is its own scene.
    pub async fn run_single(&self, primary: &[u8], secondary: &[u8]) -> SceneResult {
        let scene = SceneAsset::new(primary.to_vec());
        self.call_provider("source", scene, primary, secondary).await
    }

    async fn swap_scene(
        &self,
        scene: &SceneDescriptor,
        primary: &[u8],
        secondary: &[u8],
    ) -> SceneResult {
        let image = match tokio::fs::read(&scene.asset_path).await {
            Ok(bytes) => bytes,
            Err(_) => {
                debug!(scene = %scene.name, "reference asset not found, substituting source");
                return SceneResult {
                    scene: scene.name.clone(),
                    image: primary.to_vec(),
                    status: SwapStatus::Fallback,
                    note: Some("scene missing".to_string()),
                };
            }
        };

        let mask = match &scene.mask_path {
            Some(path) => tokio::fs::read(path).await.ok(),
            None => None,
        };

        self.call_provider(&scene.name, SceneAsset { image, mask }, primary, secondary)
            .await
    }

    async fn call_provider(
        &self,
        scene_name: &str,
        scene: SceneAsset,
        primary: &[u8],
        secondary: &[u8],
    ) -> SceneResult {
        let call = self
            .provider
            .transform(&scene, primary, secondary, &self.options);

        // A timed-out call counts as a provider error.
        let outcome = match timeout(self.call_timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(ProviderError::Request {
                message: format!("timed out after {}s", self.call_timeout.as_secs()),
            }),
        };

        let (status, note) = match outcome {
            Ok(image) if !image.is_empty() => {
                return SceneResult {
                    scene: scene_name.to_string(),
                    image,
                    status: SwapStatus::Ok,
                    note: None,
                };
            }
            Ok(_) | Err(ProviderError::EmptyPayload) => {
                (SwapStatus::Fallback, "no image returned".to_string())
            }
            Err(ProviderError::Disabled) => {
                (SwapStatus::Fallback, "transform disabled, echoing source".to_string())
            }
            Err(e) => {
                warn!(scene = scene_name, error = %e, "scene transform failed");
                (SwapStatus::Error, e.to_string())
            }
        };

        SceneResult {
            scene: scene_name.to_string(),
            image: primary.to_vec(),
            status,
            note: Some(note),
        }
    }
}
