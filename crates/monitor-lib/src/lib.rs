//! Telemetry monitoring library for model-serving systems
//!
//! This crate provides the core functionality for:
//! - Telemetry data model and validation
//! - Z-score anomaly detection with alert deduplication
//! - PSI / KL / Wasserstein drift detection against baselines
//! - A buffering client SDK for reporting telemetry
//! - Per-resource monitoring with in-memory stores
//! - Health checks and observability

pub mod anomaly;
pub mod drift;
pub mod error;
pub mod health;
pub mod models;
pub mod monitor;
pub mod observability;
pub mod sdk;
pub mod stats;
pub mod store;

pub use anomaly::{AlertDeduplicator, AnomalyConfig, AnomalyEngine};
pub use drift::{DriftConfig, DriftEngine};
pub use error::{DeliveryError, MonitorError, SdkError};
pub use health::{
    ComponentHealth, ComponentStatus, HealthRegistry, HealthResponse, ReadinessResponse,
};
pub use models::*;
pub use monitor::{
    DriftReport, IngestOutcome, MonitorSettings, MonitorStatus, PruneReport, TelemetryMonitor,
};
pub use observability::{MonitorMetrics, StructuredLogger};
pub use sdk::{FlushReport, SdkConfig, SdkConfigUpdate, TelemetryClient};
pub use store::{AlertFilter, TelemetryQuery};
