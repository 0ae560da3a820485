//! Request handlers.

pub mod swap;
