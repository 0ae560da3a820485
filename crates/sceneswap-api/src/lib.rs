//! sceneswap-api: HTTP API layer
//!
//! This crate provides the outer surface of the service:
//! - HTTP REST endpoints via Axum
//! - Middleware (request ID, CORS boundary)
//! - Observability (structured logging, Prometheus metrics)
//! - The reqwest-backed transform provider adapter
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │               sceneswap-api                  │
//! ├─────────────────────────────────────────────┤
//! │  http/          - REST endpoints             │
//! │  middleware/    - request ID, CORS           │
//! │  observability/ - logging, metrics           │
//! │  adapters.rs    - remote transform provider  │
//! └─────────────────────────────────────────────┘
//! ```

pub mod adapters;
pub mod http;
pub mod middleware;
pub mod observability;
