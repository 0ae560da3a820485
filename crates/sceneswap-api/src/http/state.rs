//! Application state for HTTP handlers.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use sceneswap_domain::{
    BatchOrchestrator, EntitlementGate, IdentityResolver, SceneCatalog, TransformOptions,
    TransformProvider,
};
use sceneswap_server::handlers::swap::SwapHandler;
use sceneswap_server::ServerConfig;
use sceneswap_storage::EntitlementStore;

/// Application state shared across all HTTP handlers.
///
/// # Type Parameters
///
/// * `S` - The entitlement store backend
/// * `P` - The transform provider implementation
pub struct AppState<S: EntitlementStore, P: TransformProvider> {
    /// The swap handler composing gate, orchestrator, and catalog.
    pub handler: Arc<SwapHandler<S, P>>,
    /// The storage backend, kept for readiness probing.
    pub storage: Arc<S>,
}

impl<S: EntitlementStore, P: TransformProvider> AppState<S, P> {
    /// Wires the full request flow from configuration.
    pub fn new(storage: Arc<S>, provider: Arc<P>, config: &ServerConfig) -> Self {
        let resolver = IdentityResolver::new(&config.auth.jwt_secret);

        let gate = EntitlementGate::new(
            Arc::clone(&storage),
            Duration::from_secs(config.entitlement.ttl_secs),
            config.entitlement.on_store_error,
        );

        let catalog = Arc::new(SceneCatalog::load(
            Path::new(&config.catalog.scene_dir),
            Some(Path::new(&config.catalog.mask_dir)),
            &config.catalog.scenes,
        ));

        let orchestrator = BatchOrchestrator::new(
            provider,
            TransformOptions {
                output_size: config.provider.output_size.clone(),
            },
            Duration::from_secs(config.provider.timeout_secs),
        );

        let handler = Arc::new(SwapHandler::new(resolver, gate, orchestrator, catalog));

        Self { handler, storage }
    }
}
