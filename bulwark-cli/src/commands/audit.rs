//! Breach record dump.

use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use serde::Serialize;
use tracing::warn;

use bulwark_isolation::breach::ViolationRecord;

use super::{CliConfig, open_layer, parse_uid};

/// Arguments for the audit command
#[derive(Parser)]
pub struct AuditArgs {
    /// Principal whose records to print
    #[arg(short, long)]
    pub uid: String,

    /// JSON fixture to load into the in-memory store
    #[arg(short, long)]
    pub fixture: PathBuf,

    /// Fail if any record carries a missing or invalid signature
    #[arg(long)]
    pub verify: bool,
}

#[derive(Debug, Serialize)]
struct AuditEntry {
    #[serde(flatten)]
    record: ViolationRecord,
    #[serde(skip_serializing_if = "Option::is_none")]
    verified: Option<bool>,
}

/// Prints the principal's breach records, newest first.
pub async fn run(args: AuditArgs, config: &CliConfig) -> Result<()> {
    let entries = collect(&args, config).await?;
    println!("{}", serde_json::to_string_pretty(&entries)?);

    let rejected = entries.iter().filter(|e| e.verified == Some(false)).count();
    if rejected > 0 {
        warn!(rejected, "Audit records failed signature verification");
        anyhow::bail!("{rejected} audit record(s) failed signature verification");
    }
    Ok(())
}

async fn collect(args: &AuditArgs, config: &CliConfig) -> Result<Vec<AuditEntry>> {
    let uid = parse_uid(&args.uid)?;
    let layer = open_layer(config, &args.fixture)?;
    let logger = layer.breach_logger();

    let records = logger.records_for(&uid).await?;
    Ok(records
        .into_iter()
        .map(|record| {
            let verified = args.verify.then(|| logger.verify(&record));
            AuditEntry { record, verified }
        })
        .collect())
}
