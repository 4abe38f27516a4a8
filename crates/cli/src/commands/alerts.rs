//! Alert listing and lifecycle commands

use anyhow::Result;
use monitor_lib::{AlertStatus, AnomalyAlert};
use tabled::Tabled;

use crate::client::{ApiClient, StatusUpdate};
use crate::output::{
    color_severity, color_status, format_timestamp, print_json, print_success, print_table,
    short_id, OutputFormat,
};

/// Row for alerts table
#[derive(Tabled)]
struct AlertRow {
    #[tabled(rename = "ID")]
    id: String,
    #[tabled(rename = "Time")]
    time: String,
    #[tabled(rename = "Resource")]
    resource: String,
    #[tabled(rename = "Type")]
    alert_type: String,
    #[tabled(rename = "Severity")]
    severity: String,
    #[tabled(rename = "Status")]
    status: String,
    #[tabled(rename = "Message")]
    message: String,
}

impl From<&AnomalyAlert> for AlertRow {
    fn from(alert: &AnomalyAlert) -> Self {
        Self {
            id: short_id(&alert.id),
            time: format_timestamp(alert.timestamp),
            resource: alert.resource_id.clone(),
            alert_type: alert.alert_type.to_string(),
            severity: color_severity(&alert.severity.to_string()),
            status: color_status(&alert.status.to_string()),
            message: alert.message.clone(),
        }
    }
}

/// Build the query string for the alert listing
fn alerts_path(resource: Option<&str>, status: Option<AlertStatus>) -> String {
    let mut params = Vec::new();
    if let Some(resource) = resource {
        params.push(format!("resource_id={}", resource));
    }
    if let Some(status) = status {
        params.push(format!("status={}", status));
    }

    if params.is_empty() {
        "api/alerts".to_string()
    } else {
        format!("api/alerts?{}", params.join("&"))
    }
}

/// List alerts, newest first
pub async fn list_alerts(
    client: &ApiClient,
    resource: Option<String>,
    status: Option<AlertStatus>,
    format: OutputFormat,
) -> Result<()> {
    let alerts: Vec<AnomalyAlert> = client
        .get(&alerts_path(resource.as_deref(), status))
        .await?;

    match format {
        OutputFormat::Json => print_json(&alerts)?,
        OutputFormat::Table => {
            let rows: Vec<AlertRow> = alerts.iter().map(AlertRow::from).collect();
            print_table(rows, "No alerts found");
            if !alerts.is_empty() {
                println!("\nTotal: {} alerts", alerts.len());
            }
        }
    }

    Ok(())
}

/// Move an alert to a new lifecycle status
pub async fn set_status(
    client: &ApiClient,
    id: &str,
    status: AlertStatus,
    format: OutputFormat,
) -> Result<()> {
    let alert: AnomalyAlert = client
        .patch(&format!("api/alerts/{}", id), &StatusUpdate { status })
        .await?;

    match format {
        OutputFormat::Json => print_json(&alert)?,
        OutputFormat::Table => print_success(&format!(
            "Alert {} on {} is now {}",
            short_id(&alert.id),
            alert.resource_id,
            color_status(&alert.status.to_string())
        )),
    }

    Ok(())
}
