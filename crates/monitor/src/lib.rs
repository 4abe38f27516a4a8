//! Telemetry monitor service
//!
//! Hosts the ingestion and query API on top of `monitor-lib`.

pub mod api;
pub mod config;
