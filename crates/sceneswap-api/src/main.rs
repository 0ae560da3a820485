//! sceneswap server binary.
//!
//! One-free-use gated batch face-swap service.
//!
//! # Usage
//!
//! ```bash
//! # With config file
//! sceneswap --config config.yaml
//!
//! # With environment variables only
//! SCENESWAP_AUTH__JWT_SECRET=... sceneswap
//! ```

use std::net::SocketAddr;
use std::sync::Arc;

use clap::Parser;
use tokio::signal;
use tracing::{info, Level};

use sceneswap_api::adapters::RemoteTransformProvider;
use sceneswap_api::http::{create_router_with_observability, AppState};
use sceneswap_api::middleware::cors_layer;
use sceneswap_api::observability::{init_logging, init_metrics, LoggingConfig, MetricsState};
use sceneswap_server::ServerConfig;
use sceneswap_storage::{
    EntitlementStore, MemoryEntitlementStore, PostgresConfig, PostgresEntitlementStore,
};

/// sceneswap - One-Free-Use Batch Face-Swap Service
#[derive(Parser, Debug)]
#[command(name = "sceneswap")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to configuration file (YAML)
    #[arg(short, long)]
    config: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Load configuration
    let config = if let Some(config_path) = args.config {
        ServerConfig::load(&config_path)?
    } else {
        ServerConfig::from_env()?
    };

    init_logging(LoggingConfig {
        json_format: config.logging.json,
        default_level: parse_log_level(&config.logging.level),
    });

    info!(version = env!("CARGO_PKG_VERSION"), "Starting sceneswap server");

    let metrics_state = init_metrics()?;
    if config.metrics.enabled {
        info!("Metrics enabled at /metrics");
    }

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;

    // Build the transform provider. Without a configured provider the
    // service runs in echo mode: every scene falls back to the source
    // upload, which keeps the pipeline testable without provider quota.
    let provider = if config.provider.enabled {
        info!(endpoint = %config.provider.endpoint, "Transform provider enabled");
        Arc::new(RemoteTransformProvider::from_settings(&config.provider)?)
    } else {
        info!("Transform provider disabled, running in echo mode");
        Arc::new(RemoteTransformProvider::disabled())
    };

    // Create the storage backend based on configuration
    match config.storage.backend.as_str() {
        "memory" => {
            info!("Using in-memory entitlement store");
            let storage = Arc::new(MemoryEntitlementStore::new());
            run_server(storage, provider, addr, &config, metrics_state).await
        }
        "postgres" => {
            let database_url = config.storage.database_url.as_ref().ok_or_else(|| {
                anyhow::anyhow!("storage.database_url is required for postgres backend")
            })?;

            info!("Connecting to PostgreSQL entitlement store");
            let pg_config = PostgresConfig {
                database_url: database_url.clone(),
                max_connections: config.storage.pool_size,
                connect_timeout_secs: config.storage.connection_timeout_secs,
                ..Default::default()
            };

            let storage = PostgresEntitlementStore::from_config(&pg_config).await?;
            info!("PostgreSQL connection established");

            info!("Running database migrations");
            storage.run_migrations().await?;
            info!("Database migrations complete");

            run_server(Arc::new(storage), provider, addr, &config, metrics_state).await
        }
        other => {
            anyhow::bail!("Unknown storage backend: {other}");
        }
    }
}

/// Runs the HTTP server with graceful shutdown.
async fn run_server<S>(
    storage: Arc<S>,
    provider: Arc<RemoteTransformProvider>,
    addr: SocketAddr,
    config: &ServerConfig,
    metrics_state: MetricsState,
) -> anyhow::Result<()>
where
    S: EntitlementStore,
{
    let state = AppState::new(storage, provider, config);
    let cors = cors_layer(&config.cors.allowed_origins);
    let router = create_router_with_observability(
        state,
        metrics_state,
        cors,
        config.server.body_limit_bytes,
    );

    info!(%addr, catalog_scenes = config.catalog.scenes.len(), "HTTP server listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("HTTP server shutdown complete");
    Ok(())
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating graceful shutdown");
        }
    }
}

/// Parse log level from string.
fn parse_log_level(level: &str) -> Level {
    match level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    }
}
