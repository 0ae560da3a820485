//! EntitlementStore trait definition.

use std::time::Duration;

use async_trait::async_trait;

use crate::error::StorageResult;

/// Abstract key-value interface for entitlement records.
///
/// Implementations must be thread-safe (Send + Sync) and support
/// async operations. Records carry a time-to-live; an expired record is
/// indistinguishable from an absent one.
#[async_trait]
pub trait EntitlementStore: Send + Sync + 'static {
    /// Atomically sets `key` to `value` with the given TTL, only if no live
    /// record exists for `key`.
    ///
    /// Returns `true` iff this call performed the write. Expired records
    /// count as absent and may be overwritten. This is the only mutating
    /// operation the store exposes; callers must never emulate it with a
    /// `get` followed by a write.
    async fn conditional_set(&self, key: &str, value: &str, ttl: Duration) -> StorageResult<bool>;

    /// Returns the live value for `key`, or `None` if absent or expired.
    async fn get(&self, key: &str) -> StorageResult<Option<String>>;

    /// Verifies the backend is reachable. Used by the readiness probe.
    async fn health_check(&self) -> StorageResult<()>;
}
