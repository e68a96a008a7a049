//! Isolation health check command.

use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use tracing::info;

use bulwark_isolation::health::IsolationHealth;

use super::{CliConfig, open_layer, parse_uid};

/// Arguments for the health command
#[derive(Parser)]
pub struct HealthArgs {
    /// Principal to check
    #[arg(short, long)]
    pub uid: String,

    /// JSON fixture to load into the in-memory store
    #[arg(short, long)]
    pub fixture: PathBuf,
}

/// Runs the check and prints the report as JSON.
///
/// Fails when the report is unhealthy so scripts can branch on the exit code.
pub async fn run(args: HealthArgs, config: &CliConfig) -> Result<()> {
    let health = check(&args, config).await?;
    println!("{}", serde_json::to_string_pretty(&health)?);
    if !health.healthy {
        anyhow::bail!("{} isolation issue(s) found for {}", health.issues.len(), health.uid);
    }
    info!(uid = %health.uid, "Isolation healthy");
    Ok(())
}

async fn check(args: &HealthArgs, config: &CliConfig) -> Result<IsolationHealth> {
    let uid = parse_uid(&args.uid)?;
    let layer = open_layer(config, &args.fixture)?;
    Ok(layer.check_isolation_health(&uid).await)
}
