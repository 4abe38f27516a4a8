//! Monitor configuration
//!
//! Layered from built-in defaults, an optional file named by `MONITOR_CONFIG`
//! and `MONITOR_*` environment variables, in that order.

use anyhow::{Context, Result};
use monitor_lib::{AnomalyConfig, DriftConfig, MonitorSettings};
use serde::Deserialize;
use std::time::Duration;

/// Environment variable naming an optional configuration file
const CONFIG_FILE_ENV: &str = "MONITOR_CONFIG";

/// Monitor configuration
#[derive(Debug, Clone, Deserialize)]
pub struct MonitorConfig {
    /// Name attached to every structured log record
    pub instance_name: String,

    /// Port for the ingestion, query, health and metrics API
    pub listen_port: u16,

    /// Required `x-api-key` value; unset disables the check
    #[serde(default)]
    pub api_key: Option<String>,

    /// Points retained per resource
    pub window_capacity: usize,

    /// Recent points scored in a drift report
    pub drift_window: usize,

    /// Alert deduplication window in seconds
    pub dedup_window_secs: u64,

    /// Anomaly rolling window size
    pub anomaly_window_size: usize,

    /// Minimum latency history before spikes are flagged
    pub min_history: usize,

    pub z_threshold: f64,

    pub error_rate_threshold: f64,

    /// Equal-width buckets used by drift scoring
    pub drift_buckets: usize,

    /// Alerts retained before the oldest are evicted
    pub alert_capacity: usize,

    /// Hours a resolved alert is kept
    pub resolved_alert_retention_hours: u64,

    /// Seconds without telemetry after which a resource is forgotten
    pub resource_idle_secs: u64,
}

impl MonitorConfig {
    /// Load configuration from defaults, `MONITOR_CONFIG` and the environment
    pub fn load() -> Result<Self> {
        let file = std::env::var(CONFIG_FILE_ENV).ok();
        Self::build(file.as_deref(), true)
    }

    fn build(file: Option<&str>, with_env: bool) -> Result<Self> {
        let anomaly = AnomalyConfig::default();
        let drift = DriftConfig::default();
        let settings = MonitorSettings::default();

        let mut builder = config::Config::builder()
            .set_default("instance_name", default_instance_name())?
            .set_default("listen_port", 8080)?
            .set_default("window_capacity", settings.window_capacity as u64)?
            .set_default("drift_window", settings.drift_window as u64)?
            .set_default("dedup_window_secs", settings.dedup_window.as_secs())?
            .set_default("anomaly_window_size", anomaly.window_size as u64)?
            .set_default("min_history", anomaly.min_history as u64)?
            .set_default("z_threshold", anomaly.z_threshold)?
            .set_default("error_rate_threshold", anomaly.error_rate_threshold)?
            .set_default("drift_buckets", drift.buckets as u64)?
            .set_default("alert_capacity", settings.alert_capacity as u64)?
            .set_default(
                "resolved_alert_retention_hours",
                settings.resolved_alert_retention.as_secs() / 3600,
            )?
            .set_default("resource_idle_secs", settings.resource_idle_timeout.as_secs())?;

        if let Some(path) = file {
            builder = builder.add_source(config::File::with_name(path).required(true));
        }
        if with_env {
            builder = builder.add_source(config::Environment::with_prefix("MONITOR"));
        }

        let config: MonitorConfig = builder
            .build()
            .context("failed to assemble monitor configuration")?
            .try_deserialize()
            .context("invalid monitor configuration")?;

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.window_capacity == 0 || self.drift_window == 0 || self.anomaly_window_size == 0 {
            anyhow::bail!("window sizes must be positive");
        }
        if self.alert_capacity == 0 {
            anyhow::bail!("alert_capacity must be positive");
        }
        if self.drift_buckets == 0 {
            anyhow::bail!("drift_buckets must be positive");
        }
        if !(self.z_threshold.is_finite() && self.z_threshold > 0.0) {
            anyhow::bail!("z_threshold must be a positive number");
        }
        Ok(())
    }

    /// Engine and store tuning derived from this configuration
    pub fn settings(&self) -> MonitorSettings {
        MonitorSettings {
            anomaly: AnomalyConfig {
                window_size: self.anomaly_window_size,
                min_history: self.min_history,
                z_threshold: self.z_threshold,
                error_rate_threshold: self.error_rate_threshold,
                ..AnomalyConfig::default()
            },
            drift: DriftConfig {
                buckets: self.drift_buckets,
                ..DriftConfig::default()
            },
            window_capacity: self.window_capacity,
            drift_window: self.drift_window,
            dedup_window: Duration::from_secs(self.dedup_window_secs),
            alert_capacity: self.alert_capacity,
            resolved_alert_retention: Duration::from_secs(self.resolved_alert_retention_hours * 3600),
            resource_idle_timeout: Duration::from_secs(self.resource_idle_secs),
        }
    }
}

fn default_instance_name() -> String {
    std::env::var("HOSTNAME").unwrap_or_else(|_| "telemetry-monitor".to_string())
}
