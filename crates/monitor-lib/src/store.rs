//! In-memory telemetry and alert stores
//!
//! Telemetry is kept per resource in a bounded window with FIFO eviction.
//! Alerts are keyed by id and carry the mutable lifecycle status; the alert
//! store is bounded too and sheds resolved alerts first.

use dashmap::DashMap;
use std::collections::VecDeque;
use std::time::{Duration, Instant};

use crate::models::{AlertStatus, AnomalyAlert, TelemetryPoint};

/// Default number of points retained per resource
pub const DEFAULT_WINDOW_CAPACITY: usize = 1000;

/// Upper bound on points returned by a single query
pub const MAX_QUERY_LIMIT: usize = 1000;

/// Default number of alerts retained
pub const DEFAULT_ALERT_CAPACITY: usize = 10_000;

/// Time-range query over one resource
#[derive(Debug, Clone, Default)]
pub struct TelemetryQuery {
    pub resource_id: String,
    /// Inclusive lower bound in ms
    pub from: Option<i64>,
    /// Inclusive upper bound in ms
    pub to: Option<i64>,
    pub limit: Option<usize>,
}

impl TelemetryQuery {
    pub fn resource(resource_id: impl Into<String>) -> Self {
        Self {
            resource_id: resource_id.into(),
            ..Default::default()
        }
    }
}

/// Bounded per-resource telemetry windows
pub struct TelemetryStore {
    windows: DashMap<String, VecDeque<TelemetryPoint>>,
    capacity: usize,
}

impl TelemetryStore {
    pub fn new(capacity: usize) -> Self {
        Self {
            windows: DashMap::new(),
            capacity: capacity.max(1),
        }
    }

    /// Append a point, evicting the oldest entry of its resource at capacity
    pub fn insert(&self, point: TelemetryPoint) {
        let mut window = self
            .windows
            .entry(point.resource_id.clone())
            .or_insert_with(|| VecDeque::with_capacity(self.capacity.min(1024)));

        while window.len() >= self.capacity {
            window.pop_front();
        }
        window.push_back(point);
    }

    /// Points matching `query`, oldest first, at most `MAX_QUERY_LIMIT`
    ///
    /// When the limit cuts the result, the newest points are kept.
    pub fn query(&self, query: &TelemetryQuery) -> Vec<TelemetryPoint> {
        let Some(window) = self.windows.get(&query.resource_id) else {
            return Vec::new();
        };

        let mut points: Vec<TelemetryPoint> = window
            .iter()
            .filter(|p| query.from.map_or(true, |from| p.timestamp >= from))
            .filter(|p| query.to.map_or(true, |to| p.timestamp <= to))
            .cloned()
            .collect();
        drop(window);

        points.sort_by_key(|p| p.timestamp);

        let limit = query.limit.unwrap_or(MAX_QUERY_LIMIT).min(MAX_QUERY_LIMIT);
        if points.len() > limit {
            points.drain(..points.len() - limit);
        }
        points
    }

    /// The `n` most recent points of a resource by timestamp, oldest first
    pub fn recent(&self, resource_id: &str, n: usize) -> Vec<TelemetryPoint> {
        self.query(&TelemetryQuery {
            resource_id: resource_id.to_string(),
            limit: Some(n),
            ..Default::default()
        })
    }

    pub fn len(&self, resource_id: &str) -> usize {
        self.windows.get(resource_id).map_or(0, |w| w.len())
    }

    pub fn contains(&self, resource_id: &str) -> bool {
        self.windows.contains_key(resource_id)
    }

    /// Drop the window of a resource, returning how many points it held
    pub fn remove(&self, resource_id: &str) -> usize {
        self.windows
            .remove(resource_id)
            .map_or(0, |(_, window)| window.len())
    }

    /// Known resource ids, sorted
    pub fn resources(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.windows.iter().map(|e| e.key().clone()).collect();
        ids.sort();
        ids
    }
}

impl Default for TelemetryStore {
    fn default() -> Self {
        Self::new(DEFAULT_WINDOW_CAPACITY)
    }
}

/// Filter for listing alerts
#[derive(Debug, Clone, Default)]
pub struct AlertFilter {
    pub resource_id: Option<String>,
    pub status: Option<AlertStatus>,
}

struct StoredAlert {
    alert: AnomalyAlert,
    /// Set when the alert enters `resolved`, cleared if it is reopened
    resolved_at: Option<Instant>,
}

/// Alert records with their lifecycle status
///
/// Holds at most `capacity` alerts. On overflow the oldest resolved alert is
/// evicted, or the oldest alert of any status when none is resolved.
pub struct AlertStore {
    alerts: DashMap<String, StoredAlert>,
    capacity: usize,
}

impl Default for AlertStore {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_ALERT_CAPACITY)
    }
}

impl AlertStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            alerts: DashMap::new(),
            capacity: capacity.max(1),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Store an alert, returning the number of alerts evicted to make room
    pub fn insert(&self, alert: AnomalyAlert) -> usize {
        let resolved_at = (alert.status == AlertStatus::Resolved).then(Instant::now);
        self.alerts
            .insert(alert.id.clone(), StoredAlert { alert, resolved_at });

        let mut evicted = 0;
        while self.alerts.len() > self.capacity {
            let Some(victim) = self.eviction_candidate() else {
                break;
            };
            if self.alerts.remove(&victim).is_some() {
                evicted += 1;
            }
        }
        evicted
    }

    fn eviction_candidate(&self) -> Option<String> {
        let oldest = |resolved_only: bool| {
            self.alerts
                .iter()
                .filter(|e| !resolved_only || e.alert.status == AlertStatus::Resolved)
                .min_by(|a, b| {
                    a.alert
                        .timestamp
                        .cmp(&b.alert.timestamp)
                        .then_with(|| a.key().cmp(b.key()))
                })
                .map(|e| e.key().clone())
        };
        oldest(true).or_else(|| oldest(false))
    }

    pub fn get(&self, id: &str) -> Option<AnomalyAlert> {
        self.alerts.get(id).map(|e| e.alert.clone())
    }

    /// Alerts matching `filter`, newest first
    pub fn list(&self, filter: &AlertFilter) -> Vec<AnomalyAlert> {
        let mut alerts: Vec<AnomalyAlert> = self
            .alerts
            .iter()
            .filter(|e| {
                filter
                    .resource_id
                    .as_deref()
                    .map_or(true, |r| e.alert.resource_id == r)
            })
            .filter(|e| filter.status.map_or(true, |s| e.alert.status == s))
            .map(|e| e.alert.clone())
            .collect();

        alerts.sort_by(|a, b| b.timestamp.cmp(&a.timestamp).then_with(|| a.id.cmp(&b.id)));
        alerts
    }

    /// Set the status of an alert, returning the updated record
    pub fn update_status(&self, id: &str, status: AlertStatus) -> Option<AnomalyAlert> {
        let mut entry = self.alerts.get_mut(id)?;
        if status == AlertStatus::Resolved {
            if entry.alert.status != AlertStatus::Resolved {
                entry.resolved_at = Some(Instant::now());
            }
        } else {
            entry.resolved_at = None;
        }
        entry.alert.status = status;
        Some(entry.alert.clone())
    }

    /// Drop alerts resolved at least `retention` ago, returning how many
    pub fn prune_resolved(&self, retention: Duration) -> usize {
        let before = self.alerts.len();
        self.alerts
            .retain(|_, e| e.resolved_at.map_or(true, |at| at.elapsed() < retention));
        before - self.alerts.len()
    }

    pub fn len(&self) -> usize {
        self.alerts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.alerts.is_empty()
    }
}
