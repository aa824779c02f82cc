//! Courier CLI - queue, inspect and deliver email jobs from the terminal.

mod client;
mod commands;
mod output;

use anyhow::Result;
use clap::{Parser, Subcommand};

use commands::{email, health};
use output::OutputFormat;

/// Courier - email delivery service CLI
#[derive(Parser)]
#[command(
    name = "courier",
    version,
    about = "Courier - email delivery service",
    long_about = "CLI tool for queuing email jobs, triggering delivery and checking service health.",
    propagate_version = true
)]
pub struct Cli {
    /// Output format
    #[arg(short, long, global = true, default_value = "table")]
    output: OutputFormat,

    /// API server URL
    #[arg(
        long,
        global = true,
        env = "COURIER_API_URL",
        default_value = "http://localhost:8080"
    )]
    api_url: String,

    /// Disable colored output
    #[arg(long, global = true)]
    no_color: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Email job operations
    #[command(subcommand)]
    Email(email::EmailCommands),

    /// Check service health
    Health(health::HealthArgs),
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if cli.no_color {
        colored::control::set_override(false);
    }

    let client = client::ApiClient::new(&cli.api_url)?;
    let format = cli.output;

    let result = match cli.command {
        Commands::Email(cmd) => email::execute(cmd, &client, format).await,
        Commands::Health(args) => health::execute(args, &client, format).await,
    };

    if let Err(e) = result {
        output::print_error(&format!("{:#}", e));
        std::process::exit(1);
    }

    Ok(())
}
