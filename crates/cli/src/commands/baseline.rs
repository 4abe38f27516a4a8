//! Baseline snapshot command

use anyhow::Result;

use crate::client::{ApiClient, BaselineResponse};
use crate::output::{print_info, print_json, print_success, print_warning, OutputFormat};

/// Baseline every feature from the most recent stored points
pub async fn snapshot(
    client: &ApiClient,
    resource: &str,
    points: Option<usize>,
    format: OutputFormat,
) -> Result<()> {
    let path = match points {
        Some(n) => format!("api/resources/{}/baselines?points={}", resource, n),
        None => format!("api/resources/{}/baselines", resource),
    };
    let response: BaselineResponse = client.post_empty(&path).await?;

    match format {
        OutputFormat::Json => print_json(&response)?,
        OutputFormat::Table => {
            if response.features.is_empty() {
                print_warning("No features found in recent telemetry");
            } else {
                print_success(&format!(
                    "Baselined {} feature(s) for {}",
                    response.features.len(),
                    response.resource_id
                ));
                for feature in &response.features {
                    print_info(feature);
                }
            }
        }
    }

    Ok(())
}
