//! In-memory storage implementation.
//!
//! Uses DashMap's entry API so the set-if-absent check and the insert are a
//! single atomic operation on the shard lock. Expiry is lazy: records past
//! their deadline are treated as absent and reclaimed on the next access.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::DashMap;

use crate::error::StorageResult;
use crate::traits::EntitlementStore;

#[derive(Debug, Clone)]
struct StoredRecord {
    value: String,
    expires_at: Instant,
}

impl StoredRecord {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at <= now
    }
}

/// In-memory implementation of [`EntitlementStore`].
///
/// Suitable for tests and single-process deployments; records do not
/// survive a restart.
#[derive(Debug, Default)]
pub struct MemoryEntitlementStore {
    records: DashMap<String, StoredRecord>,
}

impl MemoryEntitlementStore {
    /// Creates a new in-memory store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live (unexpired) records. Test helper.
    pub fn live_len(&self) -> usize {
        let now = Instant::now();
        self.records.iter().filter(|r| !r.is_expired(now)).count()
    }
}

#[async_trait]
impl EntitlementStore for MemoryEntitlementStore {
    async fn conditional_set(&self, key: &str, value: &str, ttl: Duration) -> StorageResult<bool> {
        use dashmap::mapref::entry::Entry;

        let now = Instant::now();
        let record = StoredRecord {
            value: value.to_string(),
            expires_at: now + ttl,
        };

        // The entry API holds the shard lock across check and insert, so two
        // concurrent callers cannot both observe "absent".
        match self.records.entry(key.to_string()) {
            Entry::Occupied(mut entry) => {
                if entry.get().is_expired(now) {
                    entry.insert(record);
                    Ok(true)
                } else {
                    Ok(false)
                }
            }
            Entry::Vacant(entry) => {
                entry.insert(record);
                Ok(true)
            }
        }
    }

    async fn get(&self, key: &str) -> StorageResult<Option<String>> {
        let now = Instant::now();

        // Reclaim expired records on read so they don't accumulate.
        self.records.remove_if(key, |_, record| record.is_expired(now));

        Ok(self.records.get(key).map(|r| r.value.clone()))
    }

    async fn health_check(&self) -> StorageResult<()> {
        Ok(())
    }
}
