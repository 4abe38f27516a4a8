//! Subcommand implementations

pub mod alerts;
pub mod baseline;
pub mod drift;
pub mod health;
pub mod replay;
pub mod simulate;
