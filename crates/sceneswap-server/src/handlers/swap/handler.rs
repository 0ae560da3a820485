//! Swap handler implementation.

use std::sync::Arc;

use tracing::{info, instrument, warn};

use sceneswap_domain::{
    Admission, BatchOrchestrator, EntitlementGate, IdentityResolver, SceneCatalog, SwapJob,
    TransformProvider,
};
use sceneswap_storage::EntitlementStore;

use super::types::{EntitlementStatus, SingleSwapOutcome, SwapError, SwapOutcome, SwapResult};

/// Handler for swap requests.
///
/// Composes the request flow: resolve the credential, consume the single
/// free use, fan the job out across the catalog, aggregate. The `SwapJob`
/// is owned by each call, so its spooled assets are released exactly once
/// on every exit path, including early rejections.
pub struct SwapHandler<S, P> {
    resolver: IdentityResolver,
    gate: EntitlementGate<S>,
    orchestrator: BatchOrchestrator<P>,
    catalog: Arc<SceneCatalog>,
}

impl<S, P> SwapHandler<S, P>
where
    S: EntitlementStore,
    P: TransformProvider,
{
    /// Creates a new swap handler.
    pub fn new(
        resolver: IdentityResolver,
        gate: EntitlementGate<S>,
        orchestrator: BatchOrchestrator<P>,
        catalog: Arc<SceneCatalog>,
    ) -> Self {
        Self {
            resolver,
            gate,
            orchestrator,
            catalog,
        }
    }

    /// Executes a batch swap.
    ///
    /// The asset reads happen before the gate so that a broken upload
    /// cannot burn the identity's free use.
    #[instrument(skip_all)]
    pub async fn handle_batch(&self, token: &str, job: SwapJob) -> SwapResult<SwapOutcome> {
        let identity = self.resolver.resolve(token)?;

        let (primary, secondary) = read_job(&job).await?;

        let degraded = self.admit(&identity).await?;

        let images = self
            .orchestrator
            .run(&primary, &secondary, &self.catalog)
            .await;

        for result in &images {
            let status = match result.status {
                sceneswap_domain::SwapStatus::Ok => "ok",
                sceneswap_domain::SwapStatus::Fallback => "fallback",
                sceneswap_domain::SwapStatus::Error => "error",
            };
            metrics::counter!("sceneswap_scene_results_total", &[("status", status)]).increment(1);
        }

        info!(
            subject = %identity.subject,
            scenes = images.len(),
            "batch swap complete"
        );

        Ok(SwapOutcome {
            subject: identity.subject,
            degraded,
            images,
        })
    }

    /// Executes a single (non-batch) swap under the same gating.
    #[instrument(skip_all)]
    pub async fn handle_single(&self, token: &str, job: SwapJob) -> SwapResult<SingleSwapOutcome> {
        let identity = self.resolver.resolve(token)?;

        let (primary, secondary) = read_job(&job).await?;

        self.admit(&identity).await?;

        let result = self.orchestrator.run_single(&primary, &secondary).await;

        Ok(SingleSwapOutcome {
            subject: identity.subject,
            result,
        })
    }

    /// Read-only entitlement probe. Never consumes the free use; a store
    /// failure is reported as unavailable regardless of the gate policy,
    /// since there is nothing to fail open into.
    pub async fn status(&self, token: &str) -> SwapResult<EntitlementStatus> {
        let identity = self.resolver.resolve(token)?;

        let used = self.gate.status(&identity).await.map_err(|e| {
            warn!(error = %e, "entitlement status probe failed");
            SwapError::StoreUnavailable
        })?;

        Ok(EntitlementStatus {
            subject: identity.subject,
            used,
        })
    }

    /// Consumes the free use, mapping the admission outcome to the error
    /// taxonomy. Returns whether the grant was degraded.
    async fn admit(&self, identity: &sceneswap_domain::Identity) -> SwapResult<bool> {
        let admission = self.gate.try_consume(identity).await;

        let decision = match &admission {
            Admission::Granted { .. } => "granted",
            Admission::AlreadyUsed => "already_used",
            Admission::StoreUnavailable => "store_unavailable",
        };
        metrics::counter!("sceneswap_gate_decisions_total", &[("decision", decision)]).increment(1);

        match admission {
            Admission::Granted { degraded } => Ok(degraded),
            Admission::AlreadyUsed => Err(SwapError::AlreadyUsed),
            Admission::StoreUnavailable => Err(SwapError::StoreUnavailable),
        }
    }
}

/// Reads both spooled uploads back into memory.
async fn read_job(job: &SwapJob) -> SwapResult<(Vec<u8>, Vec<u8>)> {
    let primary = job.primary.read().await.map_err(|e| SwapError::Internal {
        message: format!("failed to read source upload: {e}"),
    })?;
    let secondary = job.secondary.read().await.map_err(|e| SwapError::Internal {
        message: format!("failed to read target upload: {e}"),
    })?;
    Ok((primary, secondary))
}
