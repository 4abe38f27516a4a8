//! Monitor health command

use anyhow::Result;
use colored::Colorize;
use monitor_lib::{HealthResponse, ReadinessResponse};
use serde::Serialize;

use crate::client::ApiClient;
use crate::output::{color_status, format_timestamp, print_json, OutputFormat};

#[derive(Serialize)]
struct HealthSummary {
    health: HealthResponse,
    readiness: ReadinessResponse,
}

/// Show component health and readiness of the monitor
pub async fn show_health(client: &ApiClient, format: OutputFormat) -> Result<()> {
    let (_, health): (u16, HealthResponse) = client.probe("healthz").await?;
    let (_, readiness): (u16, ReadinessResponse) = client.probe("readyz").await?;

    match format {
        OutputFormat::Json => print_json(&HealthSummary { health, readiness })?,
        OutputFormat::Table => {
            let overall = format!("{:?}", health.status).to_lowercase();
            let ready = if readiness.ready { "ready" } else { "not ready" };

            println!("{}", "Monitor Health".bold());
            println!("{}", "=".repeat(50));
            println!("Status:    {}", color_status(&overall));
            println!("Readiness: {}", color_status(ready));
            if let Some(reason) = &readiness.reason {
                println!("Reason:    {}", reason);
            }
            println!();

            let mut components: Vec<_> = health.components.iter().collect();
            components.sort_by(|a, b| a.0.cmp(b.0));
            for (name, component) in components {
                let status = format!("{:?}", component.status).to_lowercase();
                println!(
                    "  {:<16} {:<12} {}",
                    name,
                    color_status(&status),
                    component.message.as_deref().unwrap_or("")
                );
                println!(
                    "  {:<16} since {}",
                    "",
                    format_timestamp(component.updated_at)
                );
            }
        }
    }

    Ok(())
}
