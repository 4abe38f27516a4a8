//! Alert deduplication
//!
//! Suppresses repeats of the same alert type for the same resource within a
//! configurable window, so a sustained incident does not flood the alert store.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};
use std::time::{Duration, Instant};

use crate::models::{AlertType, AnomalyAlert};

/// Default deduplication window (15 minutes)
const DEFAULT_DEDUP_WINDOW_SECS: u64 = 15 * 60;

/// Key for deduplication
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct DedupKey {
    alert_type: AlertType,
    resource_id: String,
}

impl DedupKey {
    fn of(alert: &AnomalyAlert) -> Self {
        Self {
            alert_type: alert.alert_type,
            resource_id: alert.resource_id.clone(),
        }
    }
}

/// Alert gate with a per (resource, type) quiet period
pub struct AlertDeduplicator {
    dedup_window: Duration,
    /// key -> last emission time
    recent_alerts: RwLock<HashMap<DedupKey, Instant>>,
}

impl AlertDeduplicator {
    /// Create a deduplicator with the default 15-minute window
    pub fn new() -> Self {
        Self::with_window(Duration::from_secs(DEFAULT_DEDUP_WINDOW_SECS))
    }

    pub fn with_window(dedup_window: Duration) -> Self {
        Self {
            dedup_window,
            recent_alerts: RwLock::new(HashMap::new()),
        }
    }

    pub fn window(&self) -> Duration {
        self.dedup_window
    }

    /// Check if an alert would be suppressed
    pub fn should_suppress(&self, alert: &AnomalyAlert) -> bool {
        let alerts = self
            .recent_alerts
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        alerts
            .get(&DedupKey::of(alert))
            .is_some_and(|last| last.elapsed() < self.dedup_window)
    }

    /// Admit `alert` if it is not a repeat, recording it when admitted
    pub fn admit(&self, alert: &AnomalyAlert) -> bool {
        if self.dedup_window.is_zero() {
            return true;
        }

        let key = DedupKey::of(alert);
        let mut alerts = self
            .recent_alerts
            .write()
            .unwrap_or_else(PoisonError::into_inner);

        if let Some(last) = alerts.get(&key) {
            if last.elapsed() < self.dedup_window {
                return false;
            }
        }

        alerts.insert(key, Instant::now());
        // Clean up old entries
        alerts.retain(|_, time| time.elapsed() < self.dedup_window);
        true
    }

    /// Clear expired deduplication entries
    pub fn cleanup(&self) {
        let mut alerts = self
            .recent_alerts
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        alerts.retain(|_, time| time.elapsed() < self.dedup_window);
    }

    /// Number of keys currently inside their quiet period
    pub fn tracked(&self) -> usize {
        self.recent_alerts
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

impl Default for AlertDeduplicator {
    fn default() -> Self {
        Self::new()
    }
}
