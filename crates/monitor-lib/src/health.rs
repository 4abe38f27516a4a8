//! Health tracking for the telemetry monitor
//!
//! Component statuses are derived from [`MonitorStatus`] snapshots taken by
//! the maintenance task; the HTTP layer serves the aggregate on `/healthz`
//! and `/readyz`.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::monitor::MonitorStatus;

/// Component names for health tracking
pub mod components {
    pub const INGEST: &str = "ingest";
    pub const STORE: &str = "store";
    pub const ALERTS: &str = "alerts";
}

/// Resource count above which the store reports degraded
pub const MAX_HEALTHY_RESOURCES: usize = 10_000;

/// Rejected share of ingested points above which ingest reports degraded
pub const MAX_REJECTED_RATIO: f64 = 0.5;

/// Points needed in a status window before the rejected ratio is judged
const MIN_INGEST_SAMPLE: u64 = 20;

/// Health status of a component, ordered from best to worst
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ComponentStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentHealth {
    pub status: ComponentStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Unix millis of the last status change
    pub updated_at: i64,
}

impl ComponentHealth {
    fn new(status: ComponentStatus, message: Option<String>) -> Self {
        Self {
            status,
            message,
            updated_at: chrono::Utc::now().timestamp_millis(),
        }
    }

    pub fn healthy() -> Self {
        Self::new(ComponentStatus::Healthy, None)
    }

    pub fn degraded(message: impl Into<String>) -> Self {
        Self::new(ComponentStatus::Degraded, Some(message.into()))
    }

    pub fn unhealthy(message: impl Into<String>) -> Self {
        Self::new(ComponentStatus::Unhealthy, Some(message.into()))
    }
}

/// Body of `/healthz`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    /// Worst status across components
    pub status: ComponentStatus,
    pub components: HashMap<String, ComponentHealth>,
}

/// Body of `/readyz`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadinessResponse {
    pub ready: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

#[derive(Debug, Default)]
struct HealthState {
    components: HashMap<String, ComponentHealth>,
    ready: bool,
}

/// Shared component health and readiness
#[derive(Debug, Clone, Default)]
pub struct HealthRegistry {
    state: Arc<RwLock<HealthState>>,
}

impl HealthRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register every monitor component as healthy
    pub async fn register_all(&self) {
        let mut state = self.state.write().await;
        for name in [components::INGEST, components::STORE, components::ALERTS] {
            state
                .components
                .insert(name.to_string(), ComponentHealth::healthy());
        }
    }

    /// Replace the health of one component
    ///
    /// The timestamp is kept when neither status nor message changed.
    pub async fn update(&self, name: &str, health: ComponentHealth) {
        let mut state = self.state.write().await;
        let unchanged = state
            .components
            .get(name)
            .is_some_and(|c| c.status == health.status && c.message == health.message);
        if !unchanged {
            state.components.insert(name.to_string(), health);
        }
    }

    pub async fn set_unhealthy(&self, name: &str, message: impl Into<String>) {
        self.update(name, ComponentHealth::unhealthy(message)).await;
    }

    /// Derive component statuses from a monitor load snapshot
    pub async fn apply_status(&self, status: &MonitorStatus) {
        self.update(components::INGEST, ingest_health(status)).await;
        self.update(components::STORE, store_health(status)).await;
        self.update(components::ALERTS, alerts_health(status)).await;
    }

    pub async fn set_ready(&self, ready: bool) {
        self.state.write().await.ready = ready;
    }

    pub async fn health(&self) -> HealthResponse {
        let state = self.state.read().await;
        let status = state
            .components
            .values()
            .map(|c| c.status)
            .max()
            .unwrap_or(ComponentStatus::Healthy);

        HealthResponse {
            status,
            components: state.components.clone(),
        }
    }

    pub async fn readiness(&self) -> ReadinessResponse {
        let ready = self.state.read().await.ready;
        let reason = if !ready {
            Some("Monitor not yet initialized")
        } else if self.health().await.status == ComponentStatus::Unhealthy {
            Some("Critical component unhealthy")
        } else {
            None
        };

        ReadinessResponse {
            ready: reason.is_none(),
            reason: reason.map(str::to_string),
        }
    }
}

fn ingest_health(status: &MonitorStatus) -> ComponentHealth {
    let total = status.accepted + status.rejected;
    if total < MIN_INGEST_SAMPLE {
        return ComponentHealth::healthy();
    }

    let ratio = status.rejected as f64 / total as f64;
    if ratio > MAX_REJECTED_RATIO {
        ComponentHealth::degraded(format!(
            "{} of {} points rejected since last check",
            status.rejected, total
        ))
    } else {
        ComponentHealth::healthy()
    }
}

fn store_health(status: &MonitorStatus) -> ComponentHealth {
    if status.resources > MAX_HEALTHY_RESOURCES {
        ComponentHealth::degraded(format!(
            "{} resources tracked, limit {}",
            status.resources, MAX_HEALTHY_RESOURCES
        ))
    } else {
        ComponentHealth::healthy()
    }
}

fn alerts_health(status: &MonitorStatus) -> ComponentHealth {
    if status.alerts >= status.alert_capacity {
        ComponentHealth::degraded(format!(
            "alert store full ({} alerts), oldest alerts are being evicted",
            status.alerts
        ))
    } else {
        ComponentHealth::healthy()
    }
}
