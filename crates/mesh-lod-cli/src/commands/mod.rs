//! Subcommand implementations.

pub mod analyze;
pub mod batch;
pub mod plan;
pub mod single;
