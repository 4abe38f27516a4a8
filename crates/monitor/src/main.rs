//! Telemetry Monitor - anomaly and drift detection service
//!
//! Accepts telemetry from the client SDK, runs per-resource anomaly and
//! drift detection and serves alerts, health and metrics over HTTP.

use anyhow::{Context, Result};
use monitor_lib::{
    health::{components, HealthRegistry},
    observability::{MonitorMetrics, StructuredLogger},
    TelemetryMonitor,
};
use std::sync::Arc;
use std::time::Duration;
use telemetry_monitor::{api, config};
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const MONITOR_VERSION: &str = env!("CARGO_PKG_VERSION");

/// How often state is pruned and component health re-evaluated
const MAINTENANCE_INTERVAL: Duration = Duration::from_secs(60);

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing with JSON output and env filter
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().json())
        .init();

    info!("Starting telemetry-monitor");

    let config = config::MonitorConfig::load().context("failed to load configuration")?;
    info!(
        instance = %config.instance_name,
        port = config.listen_port,
        auth = config.api_key.is_some(),
        "Monitor configured"
    );

    let health_registry = HealthRegistry::new();
    health_registry.register_all().await;

    let metrics = MonitorMetrics::new();
    let logger = StructuredLogger::new(&config.instance_name);
    let monitor = TelemetryMonitor::new(config.settings(), logger.clone());

    let app_state = Arc::new(api::AppState::new(
        monitor,
        health_registry.clone(),
        metrics,
        config.api_key.clone(),
    ));

    let maintenance = {
        let state = app_state.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(MAINTENANCE_INTERVAL);
            loop {
                ticker.tick().await;
                let pruned = state.monitor.prune();
                if pruned.resources_evicted > 0 || pruned.alerts_evicted > 0 {
                    info!(
                        resources = pruned.resources_evicted,
                        alerts = pruned.alerts_evicted,
                        "Pruned monitor state"
                    );
                }
                state
                    .health_registry
                    .apply_status(&state.monitor.take_status())
                    .await;
            }
        })
    };

    health_registry.set_ready(true).await;
    logger.log_startup(MONITOR_VERSION, &format!("0.0.0.0:{}", config.listen_port));

    let server = api::serve(config.listen_port, app_state);

    tokio::select! {
        result = server => {
            if let Err(e) = &result {
                error!(error = %e, "API server stopped");
                health_registry
                    .set_unhealthy(components::INGEST, format!("API server stopped: {e}"))
                    .await;
            }
            maintenance.abort();
            result?;
        }
        signal = tokio::signal::ctrl_c() => {
            signal.context("failed to listen for shutdown signal")?;
            logger.log_shutdown("SIGINT received");
            health_registry.set_ready(false).await;
            maintenance.abort();
        }
    }

    info!("Shutting down");
    Ok(())
}
