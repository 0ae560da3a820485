//! Data types for the swap handler.

use sceneswap_domain::{CredentialError, SceneResult};

/// Aggregated outcome of a batch swap.
#[derive(Debug)]
pub struct SwapOutcome {
    /// Resolved subject, for client-side display only.
    pub subject: String,
    /// True when the grant was issued under the fail-open degradation.
    pub degraded: bool,
    /// One entry per catalog scene, in catalog order.
    pub images: Vec<SceneResult>,
}

/// Outcome of a single (non-batch) swap.
#[derive(Debug)]
pub struct SingleSwapOutcome {
    pub subject: String,
    pub result: SceneResult,
}

/// Result of a read-only entitlement probe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntitlementStatus {
    pub subject: String,
    pub used: bool,
}

/// Terminal request failures.
///
/// Per-scene provider failures never appear here; the orchestrator absorbs
/// them into the batch result.
#[derive(Debug, Clone, thiserror::Error)]
pub enum SwapError {
    /// No credential was supplied.
    #[error("missing credential")]
    CredentialMissing,

    /// The credential failed verification.
    #[error("invalid or expired credential: {reason}")]
    CredentialInvalid { reason: String },

    /// A required upload field is absent.
    #[error("missing upload: {field}")]
    AssetMissing { field: String },

    /// The identity's free use was already consumed.
    #[error("free use already consumed")]
    AlreadyUsed,

    /// The entitlement store is unreachable and the policy is fail-closed.
    #[error("entitlement store unavailable")]
    StoreUnavailable,

    /// Unexpected failure outside the taxonomy above.
    #[error("internal error: {message}")]
    Internal { message: String },
}

impl From<CredentialError> for SwapError {
    fn from(err: CredentialError) -> Self {
        match err {
            CredentialError::Missing => SwapError::CredentialMissing,
            CredentialError::Invalid { reason } => SwapError::CredentialInvalid { reason },
        }
    }
}

/// Result type for swap handler operations.
pub type SwapResult<T> = Result<T, SwapError>;
