//! Swap handler: the gate → orchestrate → aggregate flow.

mod handler;
mod types;

pub use handler::SwapHandler;
pub use types::{EntitlementStatus, SingleSwapOutcome, SwapError, SwapOutcome, SwapResult};

#[cfg(test)]
mod tests;
