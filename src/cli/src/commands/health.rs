//! Health check command.
//!
//! Queries the `/health` endpoint and displays service and worker status.

use anyhow::Result;
use clap::Args;

use crate::client::ApiClient;
use crate::output::{self, OutputFormat};

const WORKER_COUNTERS: [(&str, &str); 6] = [
    ("dispatched", "Dispatched"),
    ("active", "Active"),
    ("sent", "Sent"),
    ("failed", "Failed"),
    ("skipped", "Skipped"),
    ("errored", "Errored"),
];

#[derive(Args)]
pub struct HealthArgs {
    /// Include delivery worker counters
    #[arg(short, long)]
    detailed: bool,
}

pub async fn execute(args: HealthArgs, client: &ApiClient, format: OutputFormat) -> Result<()> {
    let health: serde_json::Value = client.get_raw("/health").await?;

    match format {
        OutputFormat::Table => {
            let status = health
                .get("status")
                .and_then(|v| v.as_str())
                .unwrap_or("unknown");

            output::print_header("Service Health");
            output::print_detail("Status", status);
            output::print_detail("API URL", client.base_url());

            if let Some(version) = health.get("version").and_then(|v| v.as_str()) {
                output::print_detail("Version", version);
            }

            if let Some(ts) = health.get("timestamp").and_then(|v| v.as_str()) {
                output::print_detail("Timestamp", ts);
            }

            if args.detailed {
                if let Some(worker) = health.get("worker") {
                    output::print_header("Delivery Worker");
                    for (key, label) in WORKER_COUNTERS {
                        let value = worker
                            .get(key)
                            .and_then(|v| v.as_u64())
                            .map(|n| n.to_string())
                            .unwrap_or_else(|| "?".to_string());
                        output::print_detail(label, &value);
                    }
                }
            }

            if status == "healthy" {
                output::print_success("Service operational");
            } else {
                output::print_error(&format!("Service status: {}", status));
            }
        }
        _ => output::print_item(&health, format)?,
    }

    Ok(())
}
