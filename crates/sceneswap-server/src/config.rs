//! Configuration management for the sceneswap server.
//!
//! Configuration is loaded from three layered sources:
//! 1. Default values (hardcoded)
//! 2. Configuration file (YAML)
//! 3. Environment variables (override)
//!
//! Environment variables take precedence over config file values, which
//! take precedence over defaults. Variables are prefixed with `SCENESWAP_`
//! and use `__` as the nested key separator, e.g.
//! `SCENESWAP_SERVER__PORT=9090` overrides `server.port`.

use config::{Config, ConfigError, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use std::path::Path;

use sceneswap_domain::StoreFailurePolicy;

/// Server configuration.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
pub struct ServerConfig {
    /// Network settings
    #[serde(default)]
    pub server: ServerSettings,

    /// Entitlement store settings
    #[serde(default)]
    pub storage: StorageSettings,

    /// Credential verification settings
    #[serde(default)]
    pub auth: AuthSettings,

    /// Entitlement gate settings
    #[serde(default)]
    pub entitlement: EntitlementSettings,

    /// Transform provider settings
    #[serde(default)]
    pub provider: ProviderSettings,

    /// Scene catalog settings
    #[serde(default)]
    pub catalog: CatalogSettings,

    /// Cross-origin settings
    #[serde(default)]
    pub cors: CorsSettings,

    /// Logging settings
    #[serde(default)]
    pub logging: LoggingSettings,

    /// Metrics settings
    #[serde(default)]
    pub metrics: MetricsSettings,
}

/// Server network settings.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct ServerSettings {
    /// Host to bind to
    #[serde(default = "default_host")]
    pub host: String,

    /// Port to listen on
    #[serde(default = "default_port")]
    pub port: u16,

    /// Maximum request body size in bytes. Uploads carry two images, so
    /// the default is generous compared to a JSON API.
    #[serde(default = "default_body_limit")]
    pub body_limit_bytes: usize,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            body_limit_bytes: default_body_limit(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_body_limit() -> usize {
    20 * 1024 * 1024
}

/// Entitlement store settings.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct StorageSettings {
    /// Storage backend type: "memory" or "postgres"
    #[serde(default = "default_storage_backend")]
    pub backend: String,

    /// Database connection URL (required if backend is "postgres")
    pub database_url: Option<String>,

    /// Connection pool size
    #[serde(default = "default_pool_size")]
    pub pool_size: u32,

    /// Connection timeout in seconds
    #[serde(default = "default_connection_timeout")]
    pub connection_timeout_secs: u64,
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            backend: default_storage_backend(),
            database_url: None,
            pool_size: default_pool_size(),
            connection_timeout_secs: default_connection_timeout(),
        }
    }
}

fn default_storage_backend() -> String {
    "memory".to_string()
}

fn default_pool_size() -> u32 {
    10
}

fn default_connection_timeout() -> u64 {
    5
}

/// Credential verification settings.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
pub struct AuthSettings {
    /// Shared secret for HS256 token verification. Required; typically
    /// supplied via `SCENESWAP_AUTH__JWT_SECRET`.
    #[serde(default)]
    pub jwt_secret: String,
}

/// Entitlement gate settings.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct EntitlementSettings {
    /// Record time-to-live in seconds. Default: one year.
    #[serde(default = "default_entitlement_ttl")]
    pub ttl_secs: u64,

    /// Gate behavior when the store is unreachable: "closed" rejects the
    /// request, "open" allows it and logs the degradation. Failing open
    /// trades the single-use guarantee for availability.
    #[serde(default)]
    pub on_store_error: StoreFailurePolicy,
}

impl Default for EntitlementSettings {
    fn default() -> Self {
        Self {
            ttl_secs: default_entitlement_ttl(),
            on_store_error: StoreFailurePolicy::default(),
        }
    }
}

fn default_entitlement_ttl() -> u64 {
    365 * 24 * 60 * 60
}

/// Transform provider settings.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct ProviderSettings {
    /// Enable external transform calls. When disabled the service echoes
    /// the primary upload for every scene, which exercises the full
    /// pipeline without spending provider quota.
    #[serde(default)]
    pub enabled: bool,

    /// Provider endpoint URL.
    #[serde(default = "default_provider_endpoint")]
    pub endpoint: String,

    /// Provider API key. Required when enabled; typically supplied via
    /// `SCENESWAP_PROVIDER__API_KEY`.
    pub api_key: Option<String>,

    /// Model identifier sent with each request.
    #[serde(default = "default_provider_model")]
    pub model: String,

    /// Instruction sent with each request.
    #[serde(default = "default_provider_prompt")]
    pub prompt: String,

    /// Requested output size.
    #[serde(default = "default_output_size")]
    pub output_size: String,

    /// Per-call timeout in seconds. A timed-out call degrades to a
    /// per-scene fallback.
    #[serde(default = "default_provider_timeout")]
    pub timeout_secs: u64,
}

impl Default for ProviderSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            endpoint: default_provider_endpoint(),
            api_key: None,
            model: default_provider_model(),
            prompt: default_provider_prompt(),
            output_size: default_output_size(),
            timeout_secs: default_provider_timeout(),
        }
    }
}

fn default_provider_endpoint() -> String {
    "https://api.openai.com/v1/images/generations".to_string()
}

fn default_provider_model() -> String {
    "gpt-image-1".to_string()
}

fn default_provider_prompt() -> String {
    "Replace the main person's face in the scene image with the person from the \
     reference photos. Preserve pose and body, blend skin tone and lighting \
     naturally. High fidelity."
        .to_string()
}

fn default_output_size() -> String {
    "768x768".to_string()
}

fn default_provider_timeout() -> u64 {
    60
}

/// Scene catalog settings.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct CatalogSettings {
    /// Directory holding scene reference images.
    #[serde(default = "default_scene_dir")]
    pub scene_dir: String,

    /// Directory holding optional blend masks.
    #[serde(default = "default_mask_dir")]
    pub mask_dir: String,

    /// Ordered scene file names; defines result ordering.
    #[serde(default = "default_scenes")]
    pub scenes: Vec<String>,
}

impl Default for CatalogSettings {
    fn default() -> Self {
        Self {
            scene_dir: default_scene_dir(),
            mask_dir: default_mask_dir(),
            scenes: default_scenes(),
        }
    }
}

fn default_scene_dir() -> String {
    "scenes".to_string()
}

fn default_mask_dir() -> String {
    "masks".to_string()
}

fn default_scenes() -> Vec<String> {
    sceneswap_domain::SceneCatalog::default_scene_names()
}

/// Cross-origin settings.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
pub struct CorsSettings {
    /// Origins admitted by the CORS boundary. Empty means no cross-origin
    /// access.
    #[serde(default)]
    pub allowed_origins: Vec<String>,
}

/// Logging settings.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct LoggingSettings {
    /// Log level: "trace", "debug", "info", "warn", "error"
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Use JSON format (true for production, false for development)
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Metrics settings.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct MetricsSettings {
    /// Enable the Prometheus endpoint
    #[serde(default = "default_true")]
    pub enabled: bool,
}

impl Default for MetricsSettings {
    fn default() -> Self {
        Self { enabled: true }
    }
}

fn default_true() -> bool {
    true
}

/// Error type for configuration loading.
#[derive(Debug, thiserror::Error)]
pub enum ConfigLoadError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] ConfigError),

    #[error("configuration file not found: {path}")]
    FileNotFound { path: String },

    #[error("invalid configuration: {message}")]
    Invalid { message: String },
}

impl ServerConfig {
    /// Load configuration from a YAML file with environment variable
    /// overrides.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigLoadError> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(ConfigLoadError::FileNotFound {
                path: path.display().to_string(),
            });
        }

        let config = Config::builder()
            .add_source(Config::try_from(&ServerConfig::default())?)
            .add_source(File::from(path).format(FileFormat::Yaml))
            .add_source(
                Environment::with_prefix("SCENESWAP")
                    .prefix_separator("_")
                    .separator("__"),
            )
            .build()?;

        let server_config: ServerConfig = config.try_deserialize()?;
        server_config.validate()?;

        Ok(server_config)
    }

    /// Load configuration from environment variables only.
    pub fn from_env() -> Result<Self, ConfigLoadError> {
        let config = Config::builder()
            .add_source(Config::try_from(&ServerConfig::default())?)
            .add_source(
                Environment::with_prefix("SCENESWAP")
                    .prefix_separator("_")
                    .separator("__"),
            )
            .build()?;

        let server_config: ServerConfig = config.try_deserialize()?;
        server_config.validate()?;

        Ok(server_config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigLoadError> {
        if self.server.port == 0 {
            return Err(ConfigLoadError::Invalid {
                message: "server.port must be greater than 0".to_string(),
            });
        }

        let valid_backends = ["memory", "postgres"];
        if !valid_backends.contains(&self.storage.backend.as_str()) {
            return Err(ConfigLoadError::Invalid {
                message: format!(
                    "storage.backend must be one of: {:?}, got: {}",
                    valid_backends, self.storage.backend
                ),
            });
        }

        if self.storage.backend == "postgres"
            && self
                .storage
                .database_url
                .as_deref()
                .map_or(true, |s| s.trim().is_empty())
        {
            return Err(ConfigLoadError::Invalid {
                message: "storage.database_url is required when backend is 'postgres'".to_string(),
            });
        }

        if self.auth.jwt_secret.trim().is_empty() {
            return Err(ConfigLoadError::Invalid {
                message: "auth.jwt_secret must be set".to_string(),
            });
        }

        if self.entitlement.ttl_secs == 0 {
            return Err(ConfigLoadError::Invalid {
                message: "entitlement.ttl_secs must be greater than 0".to_string(),
            });
        }

        if self.provider.enabled
            && self
                .provider
                .api_key
                .as_deref()
                .map_or(true, |s| s.trim().is_empty())
        {
            return Err(ConfigLoadError::Invalid {
                message: "provider.api_key is required when provider.enabled is true".to_string(),
            });
        }

        if self.catalog.scenes.is_empty() {
            return Err(ConfigLoadError::Invalid {
                message: "catalog.scenes must not be empty".to_string(),
            });
        }

        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.to_lowercase().as_str()) {
            return Err(ConfigLoadError::Invalid {
                message: format!(
                    "logging.level must be one of: {:?}, got: {}",
                    valid_levels, self.logging.level
                ),
            });
        }

        Ok(())
    }
}
