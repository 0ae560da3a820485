//! Entitlement key derivation and the single-use gate.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::warn;

use sceneswap_storage::{EntitlementStore, StorageError};

use crate::identity::Identity;

/// Namespace prefix for entitlement keys, so they cannot collide with
/// unrelated keys sharing the store.
const KEY_PREFIX: &str = "free_used:";

/// Flag value marking an entitlement as consumed.
const CONSUMED: &str = "1";

/// Default record lifetime: one year.
pub const DEFAULT_TTL: Duration = Duration::from_secs(365 * 24 * 60 * 60);

/// Deterministic store key for an identity's free-use flag.
///
/// Only a one-way digest of the subject reaches the store; the raw subject
/// is never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EntitlementKey(String);

impl EntitlementKey {
    /// Derives the key for an identity.
    pub fn for_identity(identity: &Identity) -> Self {
        let digest = Sha256::digest(identity.subject.as_bytes());
        Self(format!("{KEY_PREFIX}{}", hex::encode(digest)))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Gate behavior when the entitlement store is unreachable.
///
/// This is an explicit configuration choice, not a default baked into the
/// code path: failing open trades the single-use guarantee for availability
/// and every open grant is logged as a degradation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreFailurePolicy {
    /// Reject the request. The single-use guarantee is never at risk.
    #[default]
    Closed,
    /// Allow the transform and log the degradation.
    Open,
}

/// Outcome of an admission attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Admission {
    /// This request holds the identity's single free use.
    Granted {
        /// True when the store was unreachable and the policy is fail-open,
        /// i.e. the grant was not actually recorded.
        degraded: bool,
    },
    /// The free use was consumed by an earlier request.
    AlreadyUsed,
    /// The store was unreachable and the policy is fail-closed.
    StoreUnavailable,
}

/// Single-use gate over the shared entitlement store.
pub struct EntitlementGate<S> {
    store: Arc<S>,
    ttl: Duration,
    policy: StoreFailurePolicy,
}

impl<S: EntitlementStore> EntitlementGate<S> {
    /// Creates a gate with the given record TTL and unavailability policy.
    pub fn new(store: Arc<S>, ttl: Duration, policy: StoreFailurePolicy) -> Self {
        Self { store, ttl, policy }
    }

    /// Attempts to consume the identity's single free use.
    ///
    /// One atomic conditional write against the store: for any identity,
    /// across any number of concurrent requests, at most one observes
    /// `Granted` while the store is reachable. Losing requests observe
    /// `AlreadyUsed` without mutating the record.
    pub async fn try_consume(&self, identity: &Identity) -> Admission {
        let key = EntitlementKey::for_identity(identity);

        match self
            .store
            .conditional_set(key.as_str(), CONSUMED, self.ttl)
            .await
        {
            Ok(true) => Admission::Granted { degraded: false },
            Ok(false) => Admission::AlreadyUsed,
            Err(e) => match self.policy {
                StoreFailurePolicy::Closed => {
                    warn!(error = %e, "entitlement store unreachable, failing closed");
                    Admission::StoreUnavailable
                }
                StoreFailurePolicy::Open => {
                    warn!(
                        error = %e,
                        "entitlement store unreachable, failing open: free use not recorded"
                    );
                    Admission::Granted { degraded: true }
                }
            },
        }
    }

    /// Read-only check of whether the free use has been consumed.
    /// Never mutates the store.
    pub async fn status(&self, identity: &Identity) -> Result<bool, StorageError> {
        let key = EntitlementKey::for_identity(identity);
        Ok(self.store.get(key.as_str()).await?.as_deref() == Some(CONSUMED))
    }
}
