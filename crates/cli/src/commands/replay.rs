//! Offline replay of recorded telemetry through the detection engines

use anyhow::{Context, Result};
use colored::Colorize;
use monitor_lib::{
    AnomalyAlert, AnomalyConfig, AnomalyEngine, DriftEngine, DriftResult, TelemetryPoint,
};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::Path;
use tabled::Tabled;

use crate::output::{
    color_severity, format_score, format_timestamp, print_info, print_json, print_table,
    print_warning, OutputFormat,
};

/// Drift of the second half of a resource's points against the first half
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceDrift {
    pub resource_id: String,
    pub baseline_points: usize,
    pub current_points: usize,
    pub results: Vec<DriftResult>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplaySummary {
    pub points: usize,
    /// Points failing validation, left out of the replay
    pub skipped: usize,
    pub alerts: Vec<AnomalyAlert>,
    pub drift: Vec<ResourceDrift>,
}

/// Run every point through a per-resource engine in timestamp order
pub fn analyze(mut points: Vec<TelemetryPoint>, config: &AnomalyConfig) -> ReplaySummary {
    let total = points.len();
    points.retain(|p| p.validate().is_ok());
    let skipped = total - points.len();
    points.sort_by_key(|p| p.timestamp);

    let mut engines: HashMap<String, AnomalyEngine> = HashMap::new();
    let mut alerts = Vec::new();
    for point in &points {
        let engine = engines
            .entry(point.resource_id.clone())
            .or_insert_with(|| AnomalyEngine::new(config.clone()));
        alerts.extend(engine.observe(point));
    }

    let mut by_resource: BTreeMap<&str, Vec<&TelemetryPoint>> = BTreeMap::new();
    for point in &points {
        by_resource
            .entry(point.resource_id.as_str())
            .or_default()
            .push(point);
    }

    let drift = by_resource
        .into_iter()
        .filter(|(_, pts)| pts.len() >= 2)
        .map(|(resource_id, pts)| split_drift(resource_id, &pts))
        .collect();

    ReplaySummary {
        points: points.len(),
        skipped,
        alerts,
        drift,
    }
}

fn split_drift(resource_id: &str, points: &[&TelemetryPoint]) -> ResourceDrift {
    let (baseline, current) = points.split_at(points.len() / 2);
    let features: BTreeSet<String> = points.iter().flat_map(|p| p.feature_names()).collect();

    let mut engine = DriftEngine::default();
    let mut results = Vec::with_capacity(features.len());
    for feature in &features {
        let extract = |sample: &[&TelemetryPoint]| -> Vec<f64> {
            sample
                .iter()
                .filter_map(|p| p.feature_value(feature))
                .collect()
        };

        engine.set_baseline(feature.as_str(), extract(baseline));
        if engine.has_baseline(feature) {
            results.push(engine.detect_drift(feature, &extract(current)));
        }
    }

    ResourceDrift {
        resource_id: resource_id.to_string(),
        baseline_points: baseline.len(),
        current_points: current.len(),
        results,
    }
}

/// Row for replay alerts table
#[derive(Tabled)]
struct ReplayAlertRow {
    #[tabled(rename = "Time")]
    time: String,
    #[tabled(rename = "Resource")]
    resource: String,
    #[tabled(rename = "Type")]
    alert_type: String,
    #[tabled(rename = "Severity")]
    severity: String,
    #[tabled(rename = "Message")]
    message: String,
}

/// Row for replay drift table
#[derive(Tabled)]
struct ReplayDriftRow {
    #[tabled(rename = "Resource")]
    resource: String,
    #[tabled(rename = "Feature")]
    feature: String,
    #[tabled(rename = "PSI")]
    score: String,
    #[tabled(rename = "Severity")]
    severity: String,
}

/// Replay a JSON array of telemetry points from `path`
pub fn replay_file(path: &Path, config: &AnomalyConfig, format: OutputFormat) -> Result<()> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let points: Vec<TelemetryPoint> =
        serde_json::from_str(&content).context("Expected a JSON array of telemetry points")?;

    let summary = analyze(points, config);

    match format {
        OutputFormat::Json => print_json(&summary)?,
        OutputFormat::Table => {
            println!("{}", "Replay Summary".bold());
            println!("{}", "=".repeat(60));
            println!("Points replayed: {}", summary.points);
            if summary.skipped > 0 {
                print_warning(&format!("{} invalid point(s) skipped", summary.skipped));
            }
            println!();

            println!("{}", "Anomalies".bold());
            let rows: Vec<ReplayAlertRow> = summary
                .alerts
                .iter()
                .map(|a| ReplayAlertRow {
                    time: format_timestamp(a.timestamp),
                    resource: a.resource_id.clone(),
                    alert_type: a.alert_type.to_string(),
                    severity: color_severity(&a.severity.to_string()),
                    message: a.message.clone(),
                })
                .collect();
            print_table(rows, "No anomalies detected");
            println!();

            println!("{}", "Drift (second half vs first half)".bold());
            let rows: Vec<ReplayDriftRow> = summary
                .drift
                .iter()
                .flat_map(|d| {
                    d.results.iter().map(move |r| ReplayDriftRow {
                        resource: d.resource_id.clone(),
                        feature: r.feature_name.clone(),
                        score: format_score(r.drift_score, r.has_drift),
                        severity: color_severity(&r.severity.to_string()),
                    })
                })
                .collect();
            print_table(rows, "Not enough points for drift analysis");

            print_info(&format!(
                "{} anomalies across {} resource(s)",
                summary.alerts.len(),
                summary.drift.len()
            ));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use monitor_lib::{AlertType, DriftSeverity, ResourceType, RuntimeMetrics};

    fn point(resource: &str, ts: i64, latency: f64) -> TelemetryPoint {
        TelemetryPoint::new(
            resource,
            "v1",
            ResourceType::MlModel,
            RuntimeMetrics::new(latency, 0.0),
        )
        .at(ts)
    }

    fn steady(i: i64) -> f64 {
        50.0 + ((i % 5) as f64 - 2.0) * 2.0
    }

    #[test]
    fn test_replay_detects_shift() {
        // Shuffled arrival order must not matter
        let mut points: Vec<TelemetryPoint> = (0..40)
            .rev()
            .map(|i| {
                let latency = if i < 20 { steady(i) } else { 150.0 + steady(i) };
                point("ranker", i, latency)
            })
            .collect();
        points.push(point("ranker", 99, -1.0));

        let summary = analyze(points, &AnomalyConfig::default());

        assert_eq!(summary.points, 40);
        assert_eq!(summary.skipped, 1);
        assert!(!summary.alerts.is_empty());
        assert_eq!(summary.alerts[0].alert_type, AlertType::Latency);
        assert_eq!(summary.alerts[0].timestamp, 20);

        let drift = &summary.drift[0];
        assert_eq!(drift.baseline_points, 20);
        assert_eq!(drift.current_points, 20);
        let latency = drift
            .results
            .iter()
            .find(|r| r.feature_name == "latency_ms")
            .unwrap();
        assert!(latency.has_drift);
        assert_eq!(latency.severity, DriftSeverity::High);
    }

    #[test]
    fn test_single_point_resource_has_no_drift() {
        let summary = analyze(vec![point("solo", 1, 10.0)], &AnomalyConfig::default());
        assert!(summary.drift.is_empty());
        assert!(summary.alerts.is_empty());
    }

    #[test]
    fn test_replay_file_reads_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("points.json");
        let points: Vec<TelemetryPoint> = (0..5).map(|i| point("etl", i, steady(i))).collect();
        std::fs::write(&path, serde_json::to_string(&points).unwrap()).unwrap();

        replay_file(&path, &AnomalyConfig::default(), OutputFormat::Json).unwrap();

        std::fs::write(&path, "{}").unwrap();
        assert!(replay_file(&path, &AnomalyConfig::default(), OutputFormat::Json).is_err());
    }
}
