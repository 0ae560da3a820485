//! sceneswap-server: Request handlers and business logic
//!
//! This crate composes the domain pieces into the request flow and owns
//! configuration management:
//! - `config.rs` — layered configuration (defaults, YAML, env overrides)
//! - `handlers/swap` — credential → gate → fan-out → aggregation, with
//!   ephemeral-asset cleanup on every exit path

pub mod config;
pub mod handlers;

// Re-exports for convenience
pub use config::{ConfigLoadError, ServerConfig};
