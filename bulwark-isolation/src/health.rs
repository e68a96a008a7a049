//! Advisory isolation health check.

use crate::IsolationLayer;
use crate::cache::{isolated_cache_key, validate_cache_key};
use crate::validate::{check_owner, validate_participant};
use bulwark_core::document::{Document, DocumentPath, Fields};
use bulwark_core::principal::Uid;
use serde::Serialize;
use serde_json::{Value, json};
use tracing::{info, instrument, warn};

const PROBE_COLLECTION: &str = "isolation_probe";

/// Result of [`IsolationLayer::check_isolation_health`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IsolationHealth {
    /// Principal the check ran for.
    pub uid: String,
    /// True when no issue was found.
    pub healthy: bool,
    /// One entry per failed check.
    pub issues: Vec<String>,
}

impl IsolationLayer {
    /// Checks the isolation baseline for `uid`.
    ///
    /// The principal's profile must exist, and the pure validators must
    /// reject a foreign principal. The report is advisory: nothing is
    /// blocked on it, and store failures are reported as issues.
    #[instrument(skip(self, uid), fields(uid = %uid))]
    pub async fn check_isolation_health(&self, uid: &Uid) -> IsolationHealth {
        let mut issues = Vec::new();

        match DocumentPath::new(self.config().users_collection.as_str(), uid.as_str()) {
            Ok(path) => match self.store().get(&path).await {
                Ok(Some(_)) => {}
                Ok(None) => issues.push("User document does not exist".to_string()),
                Err(e) => issues.push(format!("User document could not be loaded: {e}")),
            },
            Err(e) => issues.push(format!("User document path is invalid: {e}")),
        }

        issues.extend(self_test(uid));

        let health = IsolationHealth {
            uid: uid.to_string(),
            healthy: issues.is_empty(),
            issues,
        };
        if health.healthy {
            info!("Isolation health check passed");
        } else {
            warn!(issues = ?health.issues, "Isolation health check found issues");
        }
        health
    }
}

/// Runs the pure validators against a principal that is not `uid`.
fn self_test(uid: &Uid) -> Vec<String> {
    let mut issues = Vec::new();
    let Ok(stranger) = Uid::parse(Some(&format!("{uid}~probe"))) else {
        issues.push("Could not derive a probe principal".to_string());
        return issues;
    };

    let mut fields = Fields::new();
    fields.insert("userId".to_string(), Value::String(stranger.to_string()));
    match DocumentPath::new(PROBE_COLLECTION, "owned") {
        Ok(path) => {
            let foreign = Document::new(path, fields);
            if check_owner(&foreign, uid, "userId").is_ok() {
                issues.push("Ownership check accepted a foreign principal".to_string());
            }
        }
        Err(e) => issues.push(format!("Probe document path is invalid: {e}")),
    }

    let own_key = isolated_cache_key(PROBE_COLLECTION, uid, &["health"]);
    let foreign_key = isolated_cache_key(PROBE_COLLECTION, &stranger, &["health"]);
    if validate_cache_key(&own_key, uid).is_err() || validate_cache_key(&foreign_key, uid).is_ok() {
        issues.push("Cache keys are not namespaced by principal".to_string());
    }

    let members = json!([stranger.as_str()]);
    if validate_participant(Some(&members), uid, PROBE_COLLECTION).is_ok() {
        issues.push("Participant check accepted a non-member".to_string());
    }

    issues
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use bulwark_core::error::{IsolationError, Result};
    use bulwark_core::query::Query;
    use bulwark_core::store::{ChangeFeed, DocumentStore, MemoryStore};
    use std::sync::Arc;

    fn uid(raw: &str) -> Uid {
        Uid::parse(Some(raw)).unwrap()
    }

    struct BrokenStore;

    #[async_trait]
    impl DocumentStore for BrokenStore {
        async fn get(&self, _path: &DocumentPath) -> Result<Option<Document>> {
            Err(IsolationError::store("get", "backend offline"))
        }
        async fn query(&self, _query: &Query) -> Result<Vec<Document>> {
            Err(IsolationError::store("query", "backend offline"))
        }
        async fn set(&self, _path: &DocumentPath, _fields: Fields) -> Result<()> {
            Err(IsolationError::store("set", "backend offline"))
        }
        async fn update(&self, _path: &DocumentPath, _fields: Fields) -> Result<()> {
            Err(IsolationError::store("update", "backend offline"))
        }
        async fn delete(&self, _path: &DocumentPath) -> Result<()> {
            Err(IsolationError::store("delete", "backend offline"))
        }
        async fn add(&self, _collection: &str, _fields: Fields) -> Result<String> {
            Err(IsolationError::store("add", "backend offline"))
        }
        fn watch(&self, _query: &Query) -> Result<ChangeFeed> {
            Err(IsolationError::store("watch", "backend offline"))
        }
    }

    #[tokio::test]
    async fn test_healthy_principal() {
        let store =
            MemoryStore::from_fixture(&json!({ "users/alice": { "role": "founder" } })).unwrap();
        let layer = IsolationLayer::with_defaults(Arc::new(store));

        let health = layer.check_isolation_health(&uid("alice")).await;
        assert!(health.healthy, "{:?}", health.issues);
        assert!(health.issues.is_empty());
        assert_eq!(health.uid, "alice");
    }

    #[tokio::test]
    async fn test_missing_profile() {
        let layer = IsolationLayer::with_defaults(Arc::new(MemoryStore::new()));
        let health = layer.check_isolation_health(&uid("ghost")).await;
        assert!(!health.healthy);
        assert_eq!(health.issues, ["User document does not exist"]);
    }

    #[tokio::test]
    async fn test_store_failure_is_an_issue() {
        let layer = IsolationLayer::with_defaults(Arc::new(BrokenStore));
        let health = layer.check_isolation_health(&uid("alice")).await;
        assert!(!health.healthy);
        assert_eq!(health.issues.len(), 1);
        assert!(health.issues[0].contains("backend offline"));
    }

    #[test]
    fn test_self_test_passes() {
        assert!(self_test(&uid("alice")).is_empty());
    }
}
