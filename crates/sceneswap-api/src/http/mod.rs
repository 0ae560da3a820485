//! HTTP REST API endpoints.
//!
//! | Endpoint | Method | Description |
//! |----------|--------|-------------|
//! | `/swap` | POST | Batch swap across the scene catalog |
//! | `/swap/single` | POST | Single swap of the uploaded pair |
//! | `/entitlement` | GET | Free-use status for a credential |
//! | `/health` | GET | Liveness check |
//! | `/ready` | GET | Readiness check (store reachability) |
//! | `/metrics` | GET | Prometheus metrics |

pub mod routes;
pub mod state;

pub use routes::{
    create_router, create_router_with_body_limit, create_router_with_observability, ApiError,
    DEFAULT_BODY_LIMIT,
};
pub use state::AppState;

#[cfg(test)]
mod tests;
