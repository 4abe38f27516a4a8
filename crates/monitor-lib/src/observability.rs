//! Observability infrastructure for the telemetry monitor
//!
//! Provides:
//! - Prometheus metrics (ingest latency, ingested points, anomalies, drift checks)
//! - Structured JSON logging with tracing

use prometheus::{
    register_histogram, register_int_counter, register_int_counter_vec, register_int_gauge,
    Histogram, IntCounter, IntCounterVec, IntGauge,
};
use std::sync::OnceLock;
use tracing::{debug, info, warn};

use crate::models::{AlertSeverity, AlertStatus, AnomalyAlert, DriftResult};

/// Histogram buckets for ingest latency (in seconds)
const LATENCY_BUCKETS: &[f64] = &[
    0.00005, 0.0001, 0.00025, 0.0005, 0.001, 0.0025, 0.005, 0.01, 0.025, 0.05, 0.1,
];

/// Global metrics instance (registered once)
static GLOBAL_METRICS: OnceLock<MonitorMetricsInner> = OnceLock::new();

struct MonitorMetricsInner {
    ingest_latency_seconds: Histogram,
    points_ingested: IntCounterVec,
    invalid_points: IntCounter,
    anomalies_detected: IntCounterVec,
    alerts_suppressed: IntCounter,
    drift_checks: IntCounter,
    drift_detected: IntCounterVec,
    resources_monitored: IntGauge,
}

impl MonitorMetricsInner {
    fn new() -> Self {
        Self {
            ingest_latency_seconds: register_histogram!(
                "telemetry_monitor_ingest_latency_seconds",
                "Time spent validating, storing and analysing one telemetry point",
                LATENCY_BUCKETS.to_vec()
            )
            .expect("Failed to register ingest_latency_seconds"),

            points_ingested: register_int_counter_vec!(
                "telemetry_monitor_points_ingested_total",
                "Telemetry points accepted, by resource type",
                &["resource_type"]
            )
            .expect("Failed to register points_ingested"),

            invalid_points: register_int_counter!(
                "telemetry_monitor_invalid_points_total",
                "Telemetry points rejected by validation"
            )
            .expect("Failed to register invalid_points"),

            anomalies_detected: register_int_counter_vec!(
                "telemetry_monitor_anomalies_detected_total",
                "Anomaly alerts raised, by type and severity",
                &["type", "severity"]
            )
            .expect("Failed to register anomalies_detected"),

            alerts_suppressed: register_int_counter!(
                "telemetry_monitor_alerts_suppressed_total",
                "Alerts dropped by the deduplication window"
            )
            .expect("Failed to register alerts_suppressed"),

            drift_checks: register_int_counter!(
                "telemetry_monitor_drift_checks_total",
                "Feature drift evaluations performed"
            )
            .expect("Failed to register drift_checks"),

            drift_detected: register_int_counter_vec!(
                "telemetry_monitor_drift_detected_total",
                "Drift evaluations above the medium threshold, by severity",
                &["severity"]
            )
            .expect("Failed to register drift_detected"),

            resources_monitored: register_int_gauge!(
                "telemetry_monitor_resources_monitored",
                "Number of resources with telemetry in memory"
            )
            .expect("Failed to register resources_monitored"),
        }
    }
}

/// Monitor metrics for Prometheus exposition
///
/// Lightweight handle to the global metrics instance; clones share the
/// same underlying metrics.
#[derive(Clone)]
pub struct MonitorMetrics {
    inner: &'static MonitorMetricsInner,
}

impl Default for MonitorMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl MonitorMetrics {
    /// Create a new metrics handle (registers global metrics if needed)
    pub fn new() -> Self {
        Self {
            inner: GLOBAL_METRICS.get_or_init(MonitorMetricsInner::new),
        }
    }

    pub fn observe_ingest_latency(&self, duration_secs: f64) {
        self.inner.ingest_latency_seconds.observe(duration_secs);
    }

    pub fn inc_points_ingested(&self, resource_type: &str) {
        self.inner
            .points_ingested
            .with_label_values(&[resource_type])
            .inc();
    }

    pub fn inc_invalid_points(&self) {
        self.inner.invalid_points.inc();
    }

    pub fn inc_anomalies_detected(&self, alert: &AnomalyAlert) {
        self.inner
            .anomalies_detected
            .with_label_values(&[&alert.alert_type.to_string(), &alert.severity.to_string()])
            .inc();
    }

    pub fn inc_alerts_suppressed(&self) {
        self.inner.alerts_suppressed.inc();
    }

    /// Record one drift evaluation and, when it drifted, its severity
    pub fn record_drift_check(&self, result: &DriftResult) {
        self.inner.drift_checks.inc();
        if result.has_drift {
            self.inner
                .drift_detected
                .with_label_values(&[&result.severity.to_string()])
                .inc();
        }
    }

    pub fn set_resources_monitored(&self, count: usize) {
        self.inner.resources_monitored.set(count as i64);
    }
}

/// Structured logger for monitor events
///
/// Keeps the JSON field layout of anomaly, drift and lifecycle events
/// consistent across the service.
#[derive(Clone)]
pub struct StructuredLogger {
    instance: String,
}

impl StructuredLogger {
    pub fn new(instance: impl Into<String>) -> Self {
        Self {
            instance: instance.into(),
        }
    }

    /// Log a raised anomaly alert
    pub fn log_anomaly(&self, alert: &AnomalyAlert) {
        match alert.severity {
            AlertSeverity::Critical => {
                warn!(
                    event = "anomaly_detected",
                    instance = %self.instance,
                    alert_id = %alert.id,
                    resource_id = %alert.resource_id,
                    alert_type = %alert.alert_type,
                    severity = %alert.severity,
                    details = %alert.message,
                    "Critical anomaly detected"
                );
            }
            _ => {
                info!(
                    event = "anomaly_detected",
                    instance = %self.instance,
                    alert_id = %alert.id,
                    resource_id = %alert.resource_id,
                    alert_type = %alert.alert_type,
                    severity = %alert.severity,
                    details = %alert.message,
                    "Anomaly detected"
                );
            }
        }
    }

    /// Log an alert dropped by the deduplication window
    pub fn log_alert_suppressed(&self, alert: &AnomalyAlert) {
        debug!(
            event = "alert_suppressed",
            instance = %self.instance,
            resource_id = %alert.resource_id,
            alert_type = %alert.alert_type,
            "Duplicate alert suppressed"
        );
    }

    /// Log the outcome of a drift evaluation
    pub fn log_drift(&self, resource_id: &str, result: &DriftResult) {
        if result.has_drift {
            warn!(
                event = "drift_detected",
                instance = %self.instance,
                resource_id = %resource_id,
                feature = %result.feature_name,
                method = %result.method,
                drift_score = result.drift_score,
                severity = %result.severity,
                "Feature drift detected"
            );
        } else {
            debug!(
                event = "drift_checked",
                instance = %self.instance,
                resource_id = %resource_id,
                feature = %result.feature_name,
                drift_score = result.drift_score,
                "No drift"
            );
        }
    }

    /// Log a baseline replacement
    pub fn log_baseline_updated(&self, resource_id: &str, feature: &str, samples: usize) {
        info!(
            event = "baseline_updated",
            instance = %self.instance,
            resource_id = %resource_id,
            feature = %feature,
            samples = samples,
            "Drift baseline updated"
        );
    }

    /// Log a rejected ingestion request
    pub fn log_ingest_rejected(&self, resource_id: &str, reason: &str) {
        warn!(
            event = "ingest_rejected",
            instance = %self.instance,
            resource_id = %resource_id,
            reason = %reason,
            "Telemetry point rejected"
        );
    }

    /// Log an alert lifecycle transition
    pub fn log_alert_status(&self, alert_id: &str, status: AlertStatus) {
        info!(
            event = "alert_status_changed",
            instance = %self.instance,
            alert_id = %alert_id,
            status = %status,
            "Alert status updated"
        );
    }

    /// Log service startup
    pub fn log_startup(&self, version: &str, listen_addr: &str) {
        info!(
            event = "monitor_started",
            instance = %self.instance,
            monitor_version = %version,
            listen_addr = %listen_addr,
            "Telemetry monitor started"
        );
    }

    /// Log service shutdown
    pub fn log_shutdown(&self, reason: &str) {
        info!(
            event = "monitor_shutdown",
            instance = %self.instance,
            reason = %reason,
            "Telemetry monitor shutting down"
        );
    }
}
