//! CLI command implementations.

pub mod fetch;
pub mod setup;
pub mod update;
