//! CLI command implementations.

pub mod artifacts;
pub mod deploy;
