//! Telemetry Monitor CLI
//!
//! A command-line tool for generating and replaying telemetry, managing
//! alerts and inspecting drift on a running telemetry monitor.

mod client;
mod commands;
mod config;
mod output;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use commands::{alerts, baseline, drift, health, replay, simulate};
use monitor_lib::{AlertStatus, AnomalyConfig, DriftMethod};
use std::path::PathBuf;
use std::time::Duration;

/// Telemetry Monitor CLI
#[derive(Parser)]
#[command(name = "tmon")]
#[command(author, version, about = "CLI for the Telemetry Monitor", long_about = None)]
pub struct Cli {
    /// Monitor URL (falls back to ~/.config/tmon/config.json, then http://localhost:8080)
    #[arg(long, env = "TMON_API_URL")]
    pub api_url: Option<String>,

    /// API key sent in the x-api-key header
    #[arg(long, env = "TMON_API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,

    /// Output format
    #[arg(long, short)]
    pub format: Option<output::OutputFormat>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Send synthetic telemetry through the client SDK
    Simulate {
        /// Resource to report for
        #[arg(long, default_value = "demo-model")]
        resource: String,

        /// Resource version
        #[arg(long, default_value = "v1")]
        version: String,

        /// Number of points to send
        #[arg(long, default_value_t = 100)]
        count: usize,

        /// Delay between points in milliseconds
        #[arg(long, default_value_t = 50)]
        interval_ms: u64,

        /// Index of the point that carries a latency spike
        #[arg(long)]
        spike_at: Option<usize>,

        /// SDK buffer size that triggers a flush
        #[arg(long, default_value_t = 50)]
        batch_size: usize,
    },

    /// Replay a JSON array of telemetry points through the detectors offline
    Replay {
        /// Path to the JSON file
        file: PathBuf,

        /// Number of standard deviations considered a spike
        #[arg(long, default_value_t = 3.0)]
        z_threshold: f64,
    },

    /// Manage alerts
    #[command(subcommand)]
    Alerts(AlertsCommands),

    /// Show the drift report of a resource
    Drift {
        /// Resource ID
        resource: String,

        /// Scoring method
        #[arg(long, value_enum, default_value_t = MethodArg::Psi)]
        method: MethodArg,
    },

    /// Baseline every feature from recent telemetry of a resource
    Baseline {
        /// Resource ID
        resource: String,

        /// Number of recent points to use (server default if omitted)
        #[arg(long)]
        points: Option<usize>,
    },

    /// Show monitor health and readiness
    Health,
}

#[derive(Subcommand)]
pub enum AlertsCommands {
    /// List alerts, newest first
    List {
        /// Filter by resource ID
        #[arg(long, short)]
        resource: Option<String>,

        /// Filter by status (open, investigating, resolved)
        #[arg(long)]
        status: Option<String>,
    },

    /// Mark an alert as being investigated
    Ack {
        /// Alert ID
        id: String,
    },

    /// Mark an alert as resolved
    Resolve {
        /// Alert ID
        id: String,
    },
}

/// Drift scoring method
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum MethodArg {
    Psi,
    Kl,
    Wasserstein,
}

impl From<MethodArg> for DriftMethod {
    fn from(arg: MethodArg) -> Self {
        match arg {
            MethodArg::Psi => DriftMethod::Psi,
            MethodArg::Kl => DriftMethod::KlDivergence,
            MethodArg::Wasserstein => DriftMethod::Wasserstein,
        }
    }
}

#[tokio::main]
async fn main() {
    if let Err(e) = run(Cli::parse()).await {
        output::print_error(&format!("{:#}", e));
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let file_config = config::Config::load()?;

    let format = match cli.format {
        Some(format) => format,
        None => file_config
            .default_format
            .as_deref()
            .and_then(|f| output::OutputFormat::from_str(f, true).ok())
            .unwrap_or_default(),
    };

    let (api_url, api_key) = (cli.api_url, cli.api_key);
    let connect = || {
        client::ApiClient::new(
            &file_config.resolve_api_url(api_url.clone()),
            file_config.resolve_api_key(api_key.clone()),
        )
    };

    match cli.command {
        Commands::Simulate {
            resource,
            version,
            count,
            interval_ms,
            spike_at,
            batch_size,
        } => {
            let options = simulate::SimulateOptions {
                resource,
                version,
                count,
                interval: Duration::from_millis(interval_ms),
                spike_at,
                batch_size,
            };
            simulate::run(&connect()?, options, format).await?;
        }
        // Runs offline and needs no client
        Commands::Replay { file, z_threshold } => {
            let anomaly = AnomalyConfig {
                z_threshold,
                ..AnomalyConfig::default()
            };
            replay::replay_file(&file, &anomaly, format)?;
        }
        Commands::Alerts(alerts_cmd) => match alerts_cmd {
            AlertsCommands::List { resource, status } => {
                let status = status
                    .as_deref()
                    .map(str::parse::<AlertStatus>)
                    .transpose()
                    .map_err(anyhow::Error::msg)
                    .context("Invalid --status")?;
                alerts::list_alerts(&connect()?, resource, status, format).await?;
            }
            AlertsCommands::Ack { id } => {
                alerts::set_status(&connect()?, &id, AlertStatus::Investigating, format).await?;
            }
            AlertsCommands::Resolve { id } => {
                alerts::set_status(&connect()?, &id, AlertStatus::Resolved, format).await?;
            }
        },
        Commands::Drift { resource, method } => {
            drift::show_drift(&connect()?, &resource, method.into(), format).await?;
        }
        Commands::Baseline { resource, points } => {
            baseline::snapshot(&connect()?, &resource, points, format).await?;
        }
        Commands::Health => {
            health::show_health(&connect()?, format).await?;
        }
    }

    Ok(())
}
