//! Anomaly detection for runtime telemetry
//!
//! This module provides:
//! - Latency spike detection (z-score over a rolling history)
//! - Fixed-threshold error rate alerts
//! - Token usage (cost) spike detection for GenAI resources
//! - Deduplication of repeated alerts

mod dedup;
mod engine;

pub use dedup::AlertDeduplicator;
pub use engine::{AnomalyConfig, AnomalyEngine};
