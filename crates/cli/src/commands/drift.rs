//! Drift report command

use anyhow::Result;
use colored::Colorize;
use monitor_lib::{DriftMethod, DriftReport};
use tabled::Tabled;

use crate::client::ApiClient;
use crate::output::{color_severity, format_score, print_json, print_table, print_warning, OutputFormat};

/// Row for drift table
#[derive(Tabled)]
struct DriftRow {
    #[tabled(rename = "Feature")]
    feature: String,
    #[tabled(rename = "Method")]
    method: String,
    #[tabled(rename = "Score")]
    score: String,
    #[tabled(rename = "Drift")]
    drift: String,
    #[tabled(rename = "Severity")]
    severity: String,
}

/// Show drift of every baselined feature of a resource
pub async fn show_drift(
    client: &ApiClient,
    resource: &str,
    method: DriftMethod,
    format: OutputFormat,
) -> Result<()> {
    let path = format!("api/resources/{}/drift?method={}", resource, method);
    let report: DriftReport = client.get(&path).await?;

    match format {
        OutputFormat::Json => print_json(&report)?,
        OutputFormat::Table => {
            println!("{}", "Drift Report".bold());
            println!("{}", "=".repeat(60));
            println!("Resource: {}", report.resource_id.cyan());
            println!("Window:   {} points", report.window);
            println!();

            if report.results.is_empty() {
                print_warning("No baselines set for this resource");
                return Ok(());
            }

            let rows: Vec<DriftRow> = report
                .results
                .iter()
                .map(|r| DriftRow {
                    feature: r.feature_name.clone(),
                    method: r.method.to_string(),
                    score: format_score(r.drift_score, r.has_drift),
                    drift: if r.has_drift { "yes".red().to_string() } else { "no".to_string() },
                    severity: color_severity(&r.severity.to_string()),
                })
                .collect();
            print_table(rows, "No drift results");

            if !report.alerts.is_empty() {
                println!();
                print_warning(&format!("{} drift alert(s) raised", report.alerts.len()));
            }
        }
    }

    Ok(())
}
