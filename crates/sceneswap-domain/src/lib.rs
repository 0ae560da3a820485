//! sceneswap-domain: Core semantics
//!
//! This crate contains the pieces with real correctness hazards:
//! - `identity` — credential verification and subject extraction
//! - `entitlement` — single-use gate over the shared entitlement store
//! - `catalog` — the fixed, ordered scene catalog
//! - `provider` — the external transform collaborator contract
//! - `assets` — request-owned ephemeral uploads
//! - `orchestrator` — best-effort fan-out with per-scene fallback
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │              sceneswap-domain                │
//! ├─────────────────────────────────────────────┤
//! │  identity.rs     - JWT -> Identity           │
//! │  entitlement.rs  - atomic single-use gate    │
//! │  catalog.rs      - immutable scene snapshot  │
//! │  provider.rs     - TransformProvider trait   │
//! │  orchestrator.rs - per-scene fan-out         │
//! └─────────────────────────────────────────────┘
//! ```

pub mod assets;
pub mod catalog;
pub mod entitlement;
pub mod identity;
pub mod orchestrator;
pub mod provider;

pub use assets::{EphemeralAsset, SwapJob};
pub use catalog::{SceneCatalog, SceneDescriptor};
pub use entitlement::{Admission, EntitlementGate, EntitlementKey, StoreFailurePolicy};
pub use identity::{CredentialError, Identity, IdentityResolver};
pub use orchestrator::{BatchOrchestrator, SceneResult, SwapStatus};
pub use provider::{ProviderError, SceneAsset, TransformOptions, TransformProvider};
