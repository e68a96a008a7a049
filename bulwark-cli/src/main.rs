//! # Bulwark CLI
//!
//! Operator tooling for the bulwark isolation layer.
//!
//! Every command runs against a JSON fixture loaded into an in-memory
//! store:
//! - `health` runs the isolation health check for a principal
//! - `list` lists a collection the way the principal would see it
//! - `audit` dumps the principal's breach records

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

mod commands;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::debug;

use commands::{CliConfig, audit, health, list};

/// Bulwark - tenant-isolation access layer for multi-tenant document stores
#[derive(Parser)]
#[command(name = "bulwark")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Configuration file path (YAML, TOML or JSON)
    #[arg(short, long, global = true)]
    config: Option<String>,

    /// Subcommand to execute
    #[command(subcommand)]
    command: Commands,
}

/// Available CLI commands
#[derive(Subcommand)]
pub enum Commands {
    /// Run the isolation health check for a principal
    Health(health::HealthArgs),

    /// List a collection as seen by a principal
    List(list::ListArgs),

    /// Print a principal's breach records
    Audit(audit::AuditArgs),
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = CliConfig::load(cli.config.as_deref())?;
    if cli.verbose {
        config.logging.level = "debug".to_string();
    }
    let _guards = bulwark_telemetry::logging::init_logging(&config.logging)
        .context("Failed to initialize logging")?;
    debug!(config = ?cli.config, "Configuration loaded");

    match cli.command {
        Commands::Health(args) => health::run(args, &config).await?,
        Commands::List(args) => list::run(args, &config).await?,
        Commands::Audit(args) => audit::run(args, &config).await?,
    }

    Ok(())
}
