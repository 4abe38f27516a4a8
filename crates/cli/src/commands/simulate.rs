//! Synthetic telemetry generator driven through the client SDK

use anyhow::Result;
use colored::Colorize;
use monitor_lib::{
    FlushReport, PredictionData, RuntimeMetrics, SdkConfig, TelemetryClient,
};
use serde::Serialize;
use std::collections::BTreeMap;
use std::time::Duration;

use crate::client::ApiClient;
use crate::output::{print_info, print_json, print_success, print_warning, OutputFormat};

/// Options for a simulation run
#[derive(Debug, Clone)]
pub struct SimulateOptions {
    pub resource: String,
    pub version: String,
    pub count: usize,
    pub interval: Duration,
    /// Index of the point that carries a latency spike
    pub spike_at: Option<usize>,
    pub batch_size: usize,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SimulateSummary {
    resource_id: String,
    sent: usize,
    delivered: u64,
    failed: u64,
    flushes: u64,
    last_error: Option<String>,
}

/// Latency of point `i`: a slow sine wave around 80ms, six times higher at the spike
pub fn latency_at(i: usize, spike_at: Option<usize>) -> f64 {
    let base = 80.0 + 15.0 * (i as f64 / 6.0).sin();
    if spike_at == Some(i) {
        base * 6.0
    } else {
        base
    }
}

/// Error rate of point `i`; the spike point also fails more requests
pub fn error_rate_at(i: usize, spike_at: Option<usize>) -> f64 {
    if spike_at == Some(i) {
        0.12
    } else {
        0.01
    }
}

fn prediction_at(i: usize) -> PredictionData {
    let mut features = BTreeMap::new();
    features.insert("input_size".to_string(), 200.0 + (i % 40) as f64 * 5.0);
    features.insert("user_age".to_string(), 25.0 + (i % 30) as f64);

    PredictionData {
        features,
        output: 0.5 + 0.4 * (i as f64 / 9.0).cos(),
        confidence: Some(0.9),
        ground_truth: None,
    }
}

/// Send `count` synthetic points for one resource through the SDK
pub async fn run(client: &ApiClient, options: SimulateOptions, format: OutputFormat) -> Result<()> {
    let config = SdkConfig {
        endpoint: client.url("api/telemetry")?.to_string(),
        api_key: client.api_key().map(str::to_string),
        max_buffer_size: options.batch_size,
        ..SdkConfig::default()
    };
    let sdk = TelemetryClient::new(config)?;
    sdk.start();

    if format == OutputFormat::Table {
        print_info(&format!(
            "Sending {} points for {} every {}ms",
            options.count,
            options.resource.cyan(),
            options.interval.as_millis()
        ));
    }

    for i in 0..options.count {
        let metrics = RuntimeMetrics::new(
            latency_at(i, options.spike_at),
            error_rate_at(i, options.spike_at),
        );
        sdk.log_prediction(&options.resource, &options.version, metrics, prediction_at(i));

        if !options.interval.is_zero() {
            tokio::time::sleep(options.interval).await;
        }
    }

    let final_flush: FlushReport = sdk.shutdown().await;
    let stats = sdk.stats();

    let summary = SimulateSummary {
        resource_id: options.resource,
        sent: options.count,
        delivered: stats.points_delivered,
        failed: stats.delivery_failures,
        flushes: stats.flushes,
        last_error: stats.last_error,
    };

    match format {
        OutputFormat::Json => print_json(&summary)?,
        OutputFormat::Table => {
            if summary.failed == 0 {
                print_success(&format!(
                    "Delivered {}/{} points in {} flushes",
                    summary.delivered, summary.sent, summary.flushes
                ));
            } else {
                print_warning(&format!(
                    "Delivered {}/{} points, {} failed (last error: {})",
                    summary.delivered,
                    summary.sent,
                    summary.failed,
                    summary.last_error.as_deref().unwrap_or("unknown")
                ));
            }
            if final_flush.attempted > 0 {
                print_info(&format!("Final flush sent {} points", final_flush.attempted));
            }
        }
    }

    Ok(())
}
