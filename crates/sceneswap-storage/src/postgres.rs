//! PostgreSQL storage implementation.

use std::time::Duration;

use async_trait::async_trait;
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::Row;
use tracing::debug;

use crate::error::{StorageError, StorageResult};
use crate::traits::EntitlementStore;

/// Default health check timeout in seconds.
/// Shorter than regular queries since readiness probes should answer fast.
const DEFAULT_HEALTH_CHECK_TIMEOUT_SECS: u64 = 5;

/// PostgreSQL configuration options.
#[derive(Clone)]
pub struct PostgresConfig {
    /// Database connection URL.
    pub database_url: String,
    /// Maximum number of connections in the pool.
    pub max_connections: u32,
    /// Minimum number of connections in the pool.
    pub min_connections: u32,
    /// Connection timeout in seconds.
    pub connect_timeout_secs: u64,
    /// Timeout for health checks in seconds.
    pub health_check_timeout_secs: u64,
}

// Custom Debug implementation to hide credentials in database_url
impl std::fmt::Debug for PostgresConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PostgresConfig")
            .field("database_url", &"[REDACTED]")
            .field("max_connections", &self.max_connections)
            .field("min_connections", &self.min_connections)
            .field("connect_timeout_secs", &self.connect_timeout_secs)
            .field("health_check_timeout_secs", &self.health_check_timeout_secs)
            .finish()
    }
}

impl Default for PostgresConfig {
    fn default() -> Self {
        Self {
            database_url: "postgres://localhost/sceneswap".to_string(),
            max_connections: 10,
            min_connections: 1,
            connect_timeout_secs: 30,
            health_check_timeout_secs: DEFAULT_HEALTH_CHECK_TIMEOUT_SECS,
        }
    }
}

/// PostgreSQL implementation of [`EntitlementStore`].
///
/// The conditional write is a single `INSERT .. ON CONFLICT` statement, so
/// the set-if-absent semantics hold across processes sharing the database.
pub struct PostgresEntitlementStore {
    pool: PgPool,
    health_check_timeout: Duration,
}

impl PostgresEntitlementStore {
    /// Connects to PostgreSQL using the given configuration.
    pub async fn from_config(config: &PostgresConfig) -> StorageResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(Duration::from_secs(config.connect_timeout_secs))
            .connect(&config.database_url)
            .await
            .map_err(|e| StorageError::ConnectionError {
                message: format!("failed to connect to PostgreSQL: {e}"),
            })?;

        Ok(Self {
            pool,
            health_check_timeout: Duration::from_secs(config.health_check_timeout_secs),
        })
    }

    /// Creates the entitlements table if it does not exist.
    pub async fn run_migrations(&self) -> StorageResult<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS entitlements (
                entitlement_key TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                expires_at TIMESTAMPTZ NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| StorageError::MigrationError {
            message: format!("failed to create entitlements table: {e}"),
        })?;

        debug!("entitlements schema up to date");
        Ok(())
    }
}

/// Maps a sqlx error to a storage error, distinguishing connection failures
/// from query failures so callers can apply the unavailability policy.
fn map_sqlx_error(err: sqlx::Error) -> StorageError {
    match &err {
        sqlx::Error::Io(_) | sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed => {
            StorageError::ConnectionError {
                message: err.to_string(),
            }
        }
        _ => StorageError::QueryError {
            message: err.to_string(),
        },
    }
}

#[async_trait]
impl EntitlementStore for PostgresEntitlementStore {
    async fn conditional_set(&self, key: &str, value: &str, ttl: Duration) -> StorageResult<bool> {
        let ttl = chrono::Duration::from_std(ttl).map_err(|e| StorageError::InvalidInput {
            message: format!("ttl out of range: {e}"),
        })?;
        let expires_at = chrono::Utc::now() + ttl;

        // A live row blocks the upsert (rows_affected = 0); an expired row is
        // overwritten in the same statement. No separate read is performed.
        let result = sqlx::query(
            r#"
            INSERT INTO entitlements (entitlement_key, value, expires_at)
            VALUES ($1, $2, $3)
            ON CONFLICT (entitlement_key) DO UPDATE
                SET value = EXCLUDED.value, expires_at = EXCLUDED.expires_at
                WHERE entitlements.expires_at <= NOW()
            "#,
        )
        .bind(key)
        .bind(value)
        .bind(expires_at)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        Ok(result.rows_affected() == 1)
    }

    async fn get(&self, key: &str) -> StorageResult<Option<String>> {
        let row = sqlx::query(
            "SELECT value FROM entitlements WHERE entitlement_key = $1 AND expires_at > NOW()",
        )
        .bind(key)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        row.map(|r| {
            r.try_get::<String, _>("value")
                .map_err(|e| StorageError::QueryError {
                    message: format!("failed to read value column: {e}"),
                })
        })
        .transpose()
    }

    async fn health_check(&self) -> StorageResult<()> {
        let probe = sqlx::query("SELECT 1").execute(&self.pool);

        match tokio::time::timeout(self.health_check_timeout, probe).await {
            Ok(Ok(_)) => Ok(()),
            Ok(Err(e)) => Err(StorageError::HealthCheckFailed {
                message: e.to_string(),
            }),
            Err(_) => Err(StorageError::HealthCheckFailed {
                message: format!(
                    "health check timed out after {}s",
                    self.health_check_timeout.as_secs()
                ),
            }),
        }
    }
}
