//! Per-resource monitoring service
//!
//! Wires the detection engines to the stores. Every resource gets its own
//! `AnomalyEngine` and `DriftEngine`; points are validated, stored and
//! analysed on ingest, and alerts pass through the deduplicator before they
//! are stored and logged.

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tracing::{info, warn};

use crate::anomaly::{AlertDeduplicator, AnomalyConfig, AnomalyEngine};
use crate::drift::{DriftConfig, DriftEngine};
use crate::error::{MonitorError, Result};
use crate::models::{
    AlertSeverity, AlertStatus, AlertType, AnomalyAlert, DriftMethod, DriftResult, DriftSeverity,
    TelemetryPoint,
};
use crate::observability::{MonitorMetrics, StructuredLogger};
use crate::store::{
    AlertFilter, AlertStore, TelemetryQuery, TelemetryStore, DEFAULT_ALERT_CAPACITY,
    DEFAULT_WINDOW_CAPACITY,
};

/// Number of recent points scored against the drift baselines
pub const DEFAULT_DRIFT_WINDOW: usize = 100;

/// Resources silent for this long are dropped by [`TelemetryMonitor::prune`]
pub const DEFAULT_RESOURCE_IDLE_TIMEOUT: Duration = Duration::from_secs(60 * 60);

/// How long resolved alerts are kept
pub const DEFAULT_RESOLVED_ALERT_RETENTION: Duration = Duration::from_secs(24 * 60 * 60);

/// Tuning for the monitoring service
#[derive(Debug, Clone)]
pub struct MonitorSettings {
    pub anomaly: AnomalyConfig,
    pub drift: DriftConfig,
    /// Points retained per resource
    pub window_capacity: usize,
    /// Points forming the current sample of a drift report
    pub drift_window: usize,
    /// Quiet period per (resource, alert type)
    pub dedup_window: Duration,
    /// Alerts retained before the oldest are evicted
    pub alert_capacity: usize,
    pub resolved_alert_retention: Duration,
    /// Resources without ingest or baseline updates for this long are evicted
    pub resource_idle_timeout: Duration,
}

impl Default for MonitorSettings {
    fn default() -> Self {
        Self {
            anomaly: AnomalyConfig::default(),
            drift: DriftConfig::default(),
            window_capacity: DEFAULT_WINDOW_CAPACITY,
            drift_window: DEFAULT_DRIFT_WINDOW,
            dedup_window: AlertDeduplicator::new().window(),
            alert_capacity: DEFAULT_ALERT_CAPACITY,
            resolved_alert_retention: DEFAULT_RESOLVED_ALERT_RETENTION,
            resource_idle_timeout: DEFAULT_RESOURCE_IDLE_TIMEOUT,
        }
    }
}

/// Detection state owned by one resource
struct ResourceEngines {
    anomaly: AnomalyEngine,
    drift: DriftEngine,
    last_seen: Instant,
}

impl ResourceEngines {
    fn new(settings: &MonitorSettings) -> Self {
        Self {
            anomaly: AnomalyEngine::new(settings.anomaly.clone()),
            drift: DriftEngine::new(settings.drift.clone()),
            last_seen: Instant::now(),
        }
    }
}

/// What one maintenance pass removed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PruneReport {
    pub resources_evicted: usize,
    pub alerts_evicted: usize,
}

/// Load figures consumed by the health checks
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MonitorStatus {
    pub resources: usize,
    pub alerts: usize,
    pub alert_capacity: usize,
    /// Points accepted since the previous status
    pub accepted: u64,
    /// Points rejected since the previous status
    pub rejected: u64,
}

/// Result of ingesting one point
#[derive(Debug, Clone)]
pub struct IngestOutcome {
    pub id: String,
    /// Alerts raised and admitted by the deduplicator
    pub alerts: Vec<AnomalyAlert>,
}

/// Drift of every baselined feature of one resource
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DriftReport {
    pub resource_id: String,
    /// Number of recent points in the current sample
    pub window: usize,
    pub results: Vec<DriftResult>,
    pub alerts: Vec<AnomalyAlert>,
}

impl DriftReport {
    pub fn has_drift(&self) -> bool {
        self.results.iter().any(|r| r.has_drift)
    }
}

/// Monitoring service holding per-resource engines, telemetry and alerts
pub struct TelemetryMonitor {
    settings: MonitorSettings,
    engines: DashMap<String, ResourceEngines>,
    store: TelemetryStore,
    alerts: AlertStore,
    dedup: AlertDeduplicator,
    metrics: MonitorMetrics,
    logger: StructuredLogger,
    accepted: AtomicU64,
    rejected: AtomicU64,
}

impl TelemetryMonitor {
    pub fn new(settings: MonitorSettings, logger: StructuredLogger) -> Self {
        Self {
            engines: DashMap::new(),
            store: TelemetryStore::new(settings.window_capacity),
            alerts: AlertStore::with_capacity(settings.alert_capacity),
            dedup: AlertDeduplicator::with_window(settings.dedup_window),
            metrics: MonitorMetrics::new(),
            logger,
            accepted: AtomicU64::new(0),
            rejected: AtomicU64::new(0),
            settings,
        }
    }

    pub fn settings(&self) -> &MonitorSettings {
        &self.settings
    }

    /// Validate, store and analyse a point
    pub fn ingest(&self, point: TelemetryPoint) -> Result<IngestOutcome> {
        let started = Instant::now();

        if let Err(reason) = point.validate() {
            self.rejected.fetch_add(1, Ordering::Relaxed);
            self.metrics.inc_invalid_points();
            self.logger.log_ingest_rejected(&point.resource_id, &reason);
            return Err(MonitorError::InvalidPoint(reason));
        }

        let raised = {
            let mut engines = self
                .engines
                .entry(point.resource_id.clone())
                .or_insert_with(|| ResourceEngines::new(&self.settings));
            engines.last_seen = Instant::now();
            engines.anomaly.observe(&point)
        };
        self.accepted.fetch_add(1, Ordering::Relaxed);

        self.metrics
            .inc_points_ingested(&point.resource_type.to_string());
        self.store.insert(point);
        self.metrics.set_resources_monitored(self.engines.len());

        let alerts = raised
            .into_iter()
            .filter_map(|alert| self.raise(alert))
            .collect();

        self.metrics
            .observe_ingest_latency(started.elapsed().as_secs_f64());

        Ok(IngestOutcome {
            id: uuid::Uuid::new_v4().to_string(),
            alerts,
        })
    }

    /// Replace the drift baseline of one feature, returning its sample size
    pub fn set_baseline(&self, resource_id: &str, feature: &str, values: Vec<f64>) -> Result<usize> {
        if !values.iter().any(|v| v.is_finite()) {
            return Err(MonitorError::EmptyBaseline {
                resource_id: resource_id.to_string(),
                feature: feature.to_string(),
            });
        }

        let mut engines = self
            .engines
            .entry(resource_id.to_string())
            .or_insert_with(|| ResourceEngines::new(&self.settings));
        engines.last_seen = Instant::now();
        engines.drift.set_baseline(feature, values);
        let samples = engines.drift.baseline_len(feature);
        drop(engines);

        self.logger.log_baseline_updated(resource_id, feature, samples);
        Ok(samples)
    }

    /// Baseline every feature present in the last `points` stored points
    ///
    /// Returns the names of the features that received a baseline.
    pub fn snapshot_baseline(&self, resource_id: &str, points: usize) -> Result<Vec<String>> {
        if !self.store.contains(resource_id) {
            return Err(MonitorError::UnknownResource(resource_id.to_string()));
        }

        let recent = self.store.recent(resource_id, points);
        let features: BTreeSet<String> = recent.iter().flat_map(|p| p.feature_names()).collect();

        let mut baselined = Vec::with_capacity(features.len());
        for feature in features {
            let values: Vec<f64> = recent
                .iter()
                .filter_map(|p| p.feature_value(&feature))
                .collect();
            if self.set_baseline(resource_id, &feature, values).is_ok() {
                baselined.push(feature);
            }
        }

        Ok(baselined)
    }

    /// Score recent telemetry against every baseline using PSI
    pub fn drift_report(&self, resource_id: &str) -> Result<DriftReport> {
        self.drift_report_with(resource_id, DriftMethod::Psi)
    }

    /// Score recent telemetry against every baseline with `method`
    ///
    /// Drifting features raise `drift` alerts: high is critical, medium a
    /// warning.
    pub fn drift_report_with(&self, resource_id: &str, method: DriftMethod) -> Result<DriftReport> {
        let recent = self.store.recent(resource_id, self.settings.drift_window);

        let results: Vec<DriftResult> = {
            let Some(engines) = self.engines.get(resource_id) else {
                return Err(MonitorError::UnknownResource(resource_id.to_string()));
            };

            engines
                .drift
                .features()
                .into_iter()
                .map(|feature| {
                    let current: Vec<f64> = recent
                        .iter()
                        .filter_map(|p| p.feature_value(&feature))
                        .collect();
                    engines.drift.detect_drift_with(&feature, &current, method)
                })
                .collect()
        };

        let timestamp = recent
            .last()
            .map_or_else(|| chrono::Utc::now().timestamp_millis(), |p| p.timestamp);

        let mut alerts = Vec::new();
        for result in &results {
            self.metrics.record_drift_check(result);
            self.logger.log_drift(resource_id, result);

            if result.has_drift {
                alerts.extend(self.raise(drift_alert(timestamp, resource_id, result)));
            }
        }

        Ok(DriftReport {
            resource_id: resource_id.to_string(),
            window: recent.len(),
            results,
            alerts,
        })
    }

    /// Stored telemetry for a resource
    pub fn query(&self, query: &TelemetryQuery) -> Vec<TelemetryPoint> {
        self.store.query(query)
    }

    pub fn list_alerts(&self, filter: &AlertFilter) -> Vec<AnomalyAlert> {
        self.alerts.list(filter)
    }

    pub fn get_alert(&self, id: &str) -> Option<AnomalyAlert> {
        self.alerts.get(id)
    }

    /// Move an alert through its lifecycle
    pub fn update_alert_status(&self, id: &str, status: AlertStatus) -> Result<AnomalyAlert> {
        let alert = self
            .alerts
            .update_status(id, status)
            .ok_or_else(|| MonitorError::AlertNotFound(id.to_string()))?;
        self.logger.log_alert_status(id, status);
        Ok(alert)
    }

    /// Resources with telemetry or baselines, sorted
    pub fn resources(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.engines.iter().map(|e| e.key().clone()).collect();
        ids.sort();
        ids
    }

    pub fn contains(&self, resource_id: &str) -> bool {
        self.engines.contains_key(resource_id)
    }

    /// Evict idle resources and old resolved alerts, and expire dedup entries
    pub fn prune(&self) -> PruneReport {
        self.dedup.cleanup();

        let timeout = self.settings.resource_idle_timeout;
        let idle: Vec<String> = self
            .engines
            .iter()
            .filter(|e| e.last_seen.elapsed() >= timeout)
            .map(|e| e.key().clone())
            .collect();

        let mut report = PruneReport::default();
        for resource_id in idle {
            // A point may have arrived since the scan
            if self
                .engines
                .remove_if(&resource_id, |_, e| e.last_seen.elapsed() >= timeout)
                .is_some()
            {
                let points = self.store.remove(&resource_id);
                info!(resource_id = %resource_id, points, "Evicted idle resource");
                report.resources_evicted += 1;
            }
        }

        report.alerts_evicted = self
            .alerts
            .prune_resolved(self.settings.resolved_alert_retention);

        self.metrics.set_resources_monitored(self.engines.len());
        report
    }

    /// Current load, resetting the accepted and rejected counters
    pub fn take_status(&self) -> MonitorStatus {
        MonitorStatus {
            resources: self.engines.len(),
            alerts: self.alerts.len(),
            alert_capacity: self.alerts.capacity(),
            accepted: self.accepted.swap(0, Ordering::Relaxed),
            rejected: self.rejected.swap(0, Ordering::Relaxed),
        }
    }

    fn raise(&self, alert: AnomalyAlert) -> Option<AnomalyAlert> {
        if !self.dedup.admit(&alert) {
            self.metrics.inc_alerts_suppressed();
            self.logger.log_alert_suppressed(&alert);
            return None;
        }

        self.metrics.inc_anomalies_detected(&alert);
        self.logger.log_anomaly(&alert);
        let evicted = self.alerts.insert(alert.clone());
        if evicted > 0 {
            warn!(evicted, capacity = self.alerts.capacity(), "Alert store full, evicted oldest alerts");
        }
        Some(alert)
    }
}

fn drift_alert(timestamp: i64, resource_id: &str, result: &DriftResult) -> AnomalyAlert {
    let severity = match result.severity {
        DriftSeverity::High => AlertSeverity::Critical,
        DriftSeverity::Medium | DriftSeverity::Low => AlertSeverity::Warning,
    };

    AnomalyAlert::open(
        timestamp,
        resource_id,
        AlertType::Drift,
        severity,
        format!(
            "Feature '{}' drifted: {} {:.3} ({} severity)",
            result.feature_name, result.method, result.drift_score, result.severity
        ),
        "Compare recent inputs with the training data and schedule a retrain",
    )
}
