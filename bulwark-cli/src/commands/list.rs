//! Scoped listing command.

use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use serde_json::Value;
use tracing::info;

use bulwark_core::document::Document;
use bulwark_isolation::admin::Caller;

use super::{CliConfig, open_layer, parse_uid};

/// Arguments for the list command
#[derive(Parser)]
pub struct ListArgs {
    /// Principal issuing the listing
    #[arg(short, long)]
    pub uid: String,

    /// Collection to list
    #[arg(short, long)]
    pub collection: String,

    /// Owner field (defaults to the configured default owner field)
    #[arg(short, long)]
    pub owner_field: Option<String>,

    /// Signed admin claim token, used when admin resolution is claims-based
    #[arg(long)]
    pub claim: Option<String>,

    /// JSON fixture to load into the in-memory store
    #[arg(short, long)]
    pub fixture: PathBuf,
}

/// Prints the documents the principal may see, admin override included.
pub async fn run(args: ListArgs, config: &CliConfig) -> Result<()> {
    let documents = collect(&args, config).await?;
    info!(count = documents.len(), collection = %args.collection, "Listed documents");
    println!("{}", serde_json::to_string_pretty(&documents)?);
    Ok(())
}

async fn collect(args: &ListArgs, config: &CliConfig) -> Result<Vec<Value>> {
    let uid = parse_uid(&args.uid)?;
    let layer = open_layer(config, &args.fixture)?;

    let mut caller = Caller::new(uid);
    if let Some(token) = &args.claim {
        caller = caller.with_claim(token.as_str());
    }
    let documents = layer
        .get_data_with_admin_access(&args.collection, caller, args.owner_field.as_deref())
        .await?;
    Ok(documents.iter().map(Document::to_value).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::tests::fixture_file;
    use serde_json::json;

    fn args(uid: &str, fixture: &tempfile::NamedTempFile) -> ListArgs {
        ListArgs {
            uid: uid.to_string(),
            collection: "projects".to_string(),
            owner_field: Some("founderId".to_string()),
            claim: None,
            fixture: fixture.path().to_path_buf(),
        }
    }

    #[tokio::test]
    async fn test_list_scoped_and_admin() {
        let file = fixture_file(&json!({
            "users/admin1": { "role": "admin" },
            "projects/p1": { "founderId": "alice" },
            "projects/p2": { "founderId": "bob" },
        }));
        let config = CliConfig::default();

        let alice = collect(&args("alice", &file), &config).await.unwrap();
        assert_eq!(alice, [json!({ "id": "p1", "founderId": "alice" })]);

        let admin = collect(&args("admin1", &file), &config).await.unwrap();
        assert_eq!(admin.len(), 2);
    }
}
