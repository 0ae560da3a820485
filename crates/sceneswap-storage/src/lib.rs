//! sceneswap-storage: Entitlement store backends
//!
//! This crate defines the [`EntitlementStore`] trait — the only shared
//! mutable resource in the system — and its backends:
//! - [`MemoryEntitlementStore`] for tests and single-process deployments
//! - [`PostgresEntitlementStore`] for durable deployments
//!
//! All mutation goes through `conditional_set`, a single atomic
//! set-if-absent operation. There is deliberately no separate write
//! primitive: a read-then-write sequence would open a race window in which
//! two concurrent requests both observe "not yet consumed".

pub mod error;
pub mod memory;
pub mod postgres;
pub mod traits;

pub use error::{StorageError, StorageResult};
pub use memory::MemoryEntitlementStore;
pub use postgres::{PostgresConfig, PostgresEntitlementStore};
pub use traits::EntitlementStore;
