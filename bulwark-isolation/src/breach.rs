//! Breach logging.
//!
//! Violation records are appended to an audit collection in the same store.
//! Writing is best-effort: a failed audit write is reported through
//! `tracing` and never surfaces to the operation that detected the breach.

use bulwark_core::config::AuditConfig;
use bulwark_core::document::{Document, Fields};
use bulwark_core::error::{IsolationError, Result};
use bulwark_core::principal::Uid;
use bulwark_core::query::Query;
use bulwark_core::store::DocumentStore;
use chrono::{SecondsFormat, Utc};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, error};

type HmacSha256 = Hmac<Sha256>;

/// Record type stamped on every violation record.
pub const BREACH_RECORD_TYPE: &str = "isolation_breach_attempt";

/// An append-only isolation violation record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ViolationRecord {
    /// Always [`BREACH_RECORD_TYPE`].
    #[serde(rename = "type")]
    pub record_type: String,
    /// Principal that attempted the access.
    pub uid: String,
    /// Resource the principal tried to reach.
    pub attempted_resource: String,
    /// Human-readable description of the mismatch.
    pub details: String,
    /// RFC 3339 detection time.
    pub timestamp: String,
    /// Hex HMAC-SHA256 over the unsigned record, when signing is enabled.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
}

impl ViolationRecord {
    /// Creates an unsigned record stamped with the current time.
    #[must_use]
    pub fn new(uid: &Uid, attempted_resource: &str, details: &str) -> Self {
        Self {
            record_type: BREACH_RECORD_TYPE.to_string(),
            uid: uid.to_string(),
            attempted_resource: attempted_resource.to_string(),
            details: details.to_string(),
            timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true),
            signature: None,
        }
    }

    fn signing_payload(&self) -> Result<Vec<u8>> {
        let unsigned = Self {
            signature: None,
            ..self.clone()
        };
        serde_json::to_vec(&unsigned)
            .map_err(|e| IsolationError::malformed("<audit>", e.to_string()))
    }
}

/// Appends and reads back violation records.
#[derive(Clone)]
pub struct BreachLogger {
    store: Arc<dyn DocumentStore>,
    collection: String,
    enabled: bool,
    signing_key: Option<Arc<[u8]>>,
}

impl BreachLogger {
    /// Creates a logger writing to the configured audit collection.
    #[must_use]
    pub fn new(store: Arc<dyn DocumentStore>, config: &AuditConfig) -> Self {
        Self {
            store,
            collection: config.collection.clone(),
            enabled: config.enabled,
            signing_key: config
                .signing_key
                .as_ref()
                .map(|key| Arc::from(key.as_bytes())),
        }
    }

    /// Returns the audit collection.
    #[must_use]
    pub fn collection(&self) -> &str {
        &self.collection
    }

    /// Returns true if records are written.
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Appends a violation record.
    ///
    /// Returns the id of the stored record, or `None` when auditing is
    /// disabled or the write failed.
    pub async fn log(&self, uid: &Uid, attempted_resource: &str, details: &str) -> Option<String> {
        if !self.enabled {
            return None;
        }
        let record = ViolationRecord::new(uid, attempted_resource, details);
        match self.append(record).await {
            Ok(id) => {
                debug!(uid = %uid, resource = attempted_resource, id = %id, "Breach recorded");
                Some(id)
            }
            Err(e) => {
                error!(
                    uid = %uid,
                    resource = attempted_resource,
                    error = %e,
                    "Failed to write breach record"
                );
                None
            }
        }
    }

    async fn append(&self, mut record: ViolationRecord) -> Result<String> {
        if let Some(key) = &self.signing_key {
            record.signature = Some(sign(&record.signing_payload()?, key)?);
        }
        let fields: Fields = Document::encode(&record)?;
        self.store.add(&self.collection, fields).await
    }

    /// Returns true if the record carries a valid signature.
    ///
    /// Always false when signing is not configured.
    #[must_use]
    pub fn verify(&self, record: &ViolationRecord) -> bool {
        let (Some(key), Some(signature)) = (&self.signing_key, &record.signature) else {
            return false;
        };
        let Ok(expected) = hex::decode(signature) else {
            return false;
        };
        let Ok(payload) = record.signing_payload() else {
            return false;
        };
        let Ok(mut mac) = HmacSha256::new_from_slice(key) else {
            return false;
        };
        mac.update(&payload);
        mac.verify_slice(&expected).is_ok()
    }

    /// Returns the stored records for one principal, newest first.
    pub async fn records_for(&self, uid: &Uid) -> Result<Vec<ViolationRecord>> {
        let query = Query::collection(self.collection.as_str()).where_eq("uid", uid.as_str());
        let mut records = self
            .store
            .query(&query)
            .await?
            .iter()
            .map(Document::decode::<ViolationRecord>)
            .collect::<Result<Vec<_>>>()?;
        records.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        Ok(records)
    }
}

impl fmt::Debug for BreachLogger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BreachLogger")
            .field("collection", &self.collection)
            .field("enabled", &self.enabled)
            .field("signed", &self.signing_key.is_some())
            .finish_non_exhaustive()
    }
}

fn sign(data: &[u8], key: &[u8]) -> Result<String> {
    let mut mac = HmacSha256::new_from_slice(key)
        .map_err(|_| IsolationError::store("audit", "invalid HMAC key length"))?;
    mac.update(data);
    Ok(hex::encode(mac.finalize().into_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use bulwark_core::document::DocumentPath;
    use bulwark_core::store::{ChangeFeed, MemoryStore};

    fn uid(raw: &str) -> Uid {
        Uid::parse(Some(raw)).unwrap()
    }

    fn logger(store: Arc<dyn DocumentStore>, key: Option<&str>) -> BreachLogger {
        let config = AuditConfig {
            signing_key: key.map(str::to_string),
            ..AuditConfig::default()
        };
        BreachLogger::new(store, &config)
    }

    /// Store that refuses every write.
    struct ReadOnlyStore(MemoryStore);

    #[async_trait]
    impl DocumentStore for ReadOnlyStore {
        async fn get(&self, path: &DocumentPath) -> Result<Option<Document>> {
            self.0.get(path).await
        }
        async fn query(&self, query: &Query) -> Result<Vec<Document>> {
            self.0.query(query).await
        }
        async fn set(&self, _: &DocumentPath, _: Fields) -> Result<()> {
            Err(IsolationError::store("set", "read-only"))
        }
        async fn update(&self, _: &DocumentPath, _: Fields) -> Result<()> {
            Err(IsolationError::store("update", "read-only"))
        }
        async fn delete(&self, _: &DocumentPath) -> Result<()> {
            Err(IsolationError::store("delete", "read-only"))
        }
        async fn add(&self, _: &str, _: Fields) -> Result<String> {
            Err(IsolationError::store("add", "read-only"))
        }
        fn watch(&self, query: &Query) -> Result<ChangeFeed> {
            self.0.watch(query)
        }
    }

    #[tokio::test]
    async fn test_log_writes_record() {
        let store = Arc::new(MemoryStore::new());
        let breach = logger(store.clone(), None);

        let id = breach.log(&uid("alice"), "projects/p1", "owner mismatch").await;
        assert!(id.is_some());
        assert_eq!(store.collection_len("security_logs"), 1);

        let records = breach.records_for(&uid("alice")).await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].record_type, BREACH_RECORD_TYPE);
        assert_eq!(records[0].attempted_resource, "projects/p1");
        assert!(records[0].signature.is_none());
        assert!(!breach.verify(&records[0]));
    }

    #[tokio::test]
    async fn test_records_are_camel_case() {
        let store = Arc::new(MemoryStore::new());
        let breach = logger(store.clone(), None);
        breach.log(&uid("alice"), "files/f9", "x").await;

        let docs = store
            .query(&Query::collection("security_logs"))
            .await
            .unwrap();
        assert_eq!(docs[0].get("attemptedResource"), Some(&serde_json::json!("files/f9")));
        assert_eq!(docs[0].get("type"), Some(&serde_json::json!(BREACH_RECORD_TYPE)));
    }

    #[tokio::test]
    async fn test_records_for_filters_and_orders() {
        let breach = logger(Arc::new(MemoryStore::new()), None);
        breach.log(&uid("alice"), "projects/p1", "first").await;
        breach.log(&uid("bob"), "projects/p2", "other").await;
        tokio::time::sleep(std::time::Duration::from_millis(2)).await;
        breach.log(&uid("alice"), "projects/p3", "second").await;

        let records = breach.records_for(&uid("alice")).await.unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].details, "second");
        assert_eq!(records[1].details, "first");
    }

    #[tokio::test]
    async fn test_signed_records_verify() {
        let breach = logger(Arc::new(MemoryStore::new()), Some("audit-key"));
        breach.log(&uid("alice"), "deals/d1", "not a participant").await;

        let mut record = breach.records_for(&uid("alice")).await.unwrap().remove(0);
        assert!(record.signature.is_some());
        assert!(breach.verify(&record));

        record.details = "nothing happened".to_string();
        assert!(!breach.verify(&record));
    }

    #[tokio::test]
    async fn test_verify_with_other_key_fails() {
        let store: Arc<dyn DocumentStore> = Arc::new(MemoryStore::new());
        let writer = logger(Arc::clone(&store), Some("key-1"));
        let reader = logger(store, Some("key-2"));
        writer.log(&uid("alice"), "files/f1", "x").await;

        let record = reader.records_for(&uid("alice")).await.unwrap().remove(0);
        assert!(!reader.verify(&record));
        assert!(writer.verify(&record));
    }

    #[tokio::test]
    async fn test_write_failure_is_swallowed() {
        let breach = logger(Arc::new(ReadOnlyStore(MemoryStore::new())), None);
        assert!(breach.log(&uid("alice"), "projects/p1", "x").await.is_none());
    }

    #[tokio::test]
    async fn test_disabled_logger_writes_nothing() {
        let store = Arc::new(MemoryStore::new());
        let config = AuditConfig {
            enabled: false,
            ..AuditConfig::default()
        };
        let breach = BreachLogger::new(store.clone(), &config);
        assert!(breach.log(&uid("alice"), "projects/p1", "x").await.is_none());
        assert_eq!(store.document_count(), 0);
    }
}
