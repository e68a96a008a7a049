//! In-memory document store.

use super::{ChangeFeed, DocumentStore, FeedSender, Snapshot};
use crate::document::{Document, DocumentPath, Fields, validate_collection_path};
use crate::error::{IsolationError, Result};
use crate::query::Query;
use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use std::collections::BTreeMap;
use tracing::{debug, trace};
use uuid::Uuid;

type Collections = BTreeMap<String, BTreeMap<String, Fields>>;

struct Watcher {
    query: Query,
    sender: FeedSender,
    sequence: u64,
}

impl Watcher {
    /// Sends the current result set. Returns false once the feed is gone.
    fn emit(&mut self, data: &Collections) -> bool {
        let snapshot = Snapshot {
            sequence: self.sequence,
            documents: evaluate(data, &self.query),
        };
        self.sequence += 1;
        self.sender.send(Ok(snapshot)).is_ok()
    }
}

/// Document store held entirely in process memory.
///
/// Documents are kept per collection in id order. Every write re-evaluates
/// the watchers of the touched collection and pushes them a fresh snapshot
/// while the write lock is still held, so snapshots follow write order.
#[derive(Default)]
pub struct MemoryStore {
    data: RwLock<Collections>,
    watchers: Mutex<Vec<Watcher>>,
}

impl MemoryStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a store from a fixture object mapping document paths to fields.
    ///
    /// ```
    /// use bulwark_core::store::MemoryStore;
    /// use serde_json::json;
    ///
    /// let store = MemoryStore::from_fixture(&json!({
    ///     "users/alice": { "role": "admin" },
    ///     "projects/p1": { "founderId": "alice" },
    /// })).unwrap();
    /// assert_eq!(store.document_count(), 2);
    /// ```
    pub fn from_fixture(fixture: &Value) -> Result<Self> {
        let Value::Object(entries) = fixture else {
            return Err(IsolationError::malformed(
                "<fixture>",
                "fixture must be an object of path -> fields",
            ));
        };
        let store = Self::new();
        {
            let mut data = store.data.write();
            for (raw_path, value) in entries {
                let path = DocumentPath::parse(raw_path)?;
                let Value::Object(fields) = value else {
                    return Err(IsolationError::malformed(
                        raw_path.as_str(),
                        "fixture documents must be objects",
                    ));
                };
                data.entry(path.collection().to_string())
                    .or_default()
                    .insert(path.id().to_string(), fields.clone());
            }
        }
        Ok(store)
    }

    /// Returns the total number of stored documents.
    #[must_use]
    pub fn document_count(&self) -> usize {
        self.data.read().values().map(BTreeMap::len).sum()
    }

    /// Returns the number of documents in one collection.
    #[must_use]
    pub fn collection_len(&self, collection: &str) -> usize {
        self.data.read().get(collection).map_or(0, BTreeMap::len)
    }

    /// Returns the number of change-feeds still attached.
    ///
    /// Feeds whose receiver was dropped are pruned on the next emission and
    /// by this call.
    #[must_use]
    pub fn watcher_count(&self) -> usize {
        let mut watchers = self.watchers.lock();
        watchers.retain(|w| !w.sender.is_closed());
        watchers.len()
    }

    fn publish(&self, data: &Collections, collection: &str) {
        let mut watchers = self.watchers.lock();
        watchers.retain_mut(|watcher| {
            if watcher.query.collection_path() != collection {
                return !watcher.sender.is_closed();
            }
            watcher.emit(data)
        });
        trace!(collection, watchers = watchers.len(), "Published snapshots");
    }
}

fn evaluate(data: &Collections, query: &Query) -> Vec<Document> {
    let Some(documents) = data.get(query.collection_path()) else {
        return Vec::new();
    };
    let matching = documents.iter().filter_map(|(id, fields)| {
        let path = DocumentPath::new(query.collection_path(), id.as_str()).ok()?;
        let document = Document::new(path, fields.clone());
        query.matches(&document).then_some(document)
    });
    match query.max_results() {
        Some(limit) => matching.take(limit).collect(),
        None => matching.collect(),
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn get(&self, path: &DocumentPath) -> Result<Option<Document>> {
        let data = self.data.read();
        Ok(data
            .get(path.collection())
            .and_then(|docs| docs.get(path.id()))
            .map(|fields| Document::new(path.clone(), fields.clone())))
    }

    async fn query(&self, query: &Query) -> Result<Vec<Document>> {
        validate_collection_path(query.collection_path())?;
        Ok(evaluate(&self.data.read(), query))
    }

    async fn set(&self, path: &DocumentPath, fields: Fields) -> Result<()> {
        let mut data = self.data.write();
        data.entry(path.collection().to_string())
            .or_default()
            .insert(path.id().to_string(), fields);
        debug!(path = %path, "Document set");
        self.publish(&data, path.collection());
        Ok(())
    }

    async fn update(&self, path: &DocumentPath, fields: Fields) -> Result<()> {
        let mut data = self.data.write();
        let existing = data
            .get_mut(path.collection())
            .and_then(|docs| docs.get_mut(path.id()))
            .ok_or_else(|| IsolationError::not_found(path.to_string()))?;
        for (key, value) in fields {
            existing.insert(key, value);
        }
        debug!(path = %path, "Document updated");
        self.publish(&data, path.collection());
        Ok(())
    }

    async fn delete(&self, path: &DocumentPath) -> Result<()> {
        let mut data = self.data.write();
        let removed = data
            .get_mut(path.collection())
            .and_then(|docs| docs.remove(path.id()))
            .is_some();
        if removed {
            debug!(path = %path, "Document deleted");
            self.publish(&data, path.collection());
        }
        Ok(())
    }

    async fn add(&self, collection: &str, fields: Fields) -> Result<String> {
        let id = Uuid::new_v4().simple().to_string();
        let path = DocumentPath::new(collection, id.as_str())?;
        self.set(&path, fields).await?;
        Ok(id)
    }

    fn watch(&self, query: &Query) -> Result<ChangeFeed> {
        validate_collection_path(query.collection_path())?;
        let data = self.data.read();
        let (sender, feed) = ChangeFeed::channel();
        let mut watcher = Watcher {
            query: query.clone(),
            sender,
            sequence: 0,
        };
        watcher.emit(&data);
        self.watchers.lock().push(watcher);
        debug!(query = %query, "Change-feed opened");
        Ok(feed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn fields(value: Value) -> Fields {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected object"),
        }
    }

    fn path(raw: &str) -> DocumentPath {
        DocumentPath::parse(raw).unwrap()
    }

    #[tokio::test]
    async fn test_set_get_delete() {
        let store = MemoryStore::new();
        store
            .set(&path("projects/p1"), fields(json!({ "founderId": "alice" })))
            .await
            .unwrap();

        let doc = store.get(&path("projects/p1")).await.unwrap().unwrap();
        assert_eq!(doc.get("founderId"), Some(&json!("alice")));

        store.delete(&path("projects/p1")).await.unwrap();
        assert!(store.get(&path("projects/p1")).await.unwrap().is_none());
        store.delete(&path("projects/p1")).await.unwrap();
    }

    #[tokio::test]
    async fn test_update_merges_and_requires_existing() {
        let store = MemoryStore::new();
        store
            .set(&path("files/f1"), fields(json!({ "name": "a", "userId": "alice" })))
            .await
            .unwrap();
        store
            .update(&path("files/f1"), fields(json!({ "name": "b" })))
            .await
            .unwrap();

        let doc = store.get(&path("files/f1")).await.unwrap().unwrap();
        assert_eq!(doc.get("name"), Some(&json!("b")));
        assert_eq!(doc.get("userId"), Some(&json!("alice")));

        let err = store
            .update(&path("files/missing"), fields(json!({ "name": "c" })))
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_query_filters_and_limit() {
        let store = MemoryStore::from_fixture(&json!({
            "notifications/n1": { "userId": "alice" },
            "notifications/n2": { "userId": "bob" },
            "notifications/n3": { "userId": "alice" },
        }))
        .unwrap();

        let query = Query::collection("notifications").where_eq("userId", "alice");
        assert_eq!(store.query(&query).await.unwrap().len(), 2);
        assert_eq!(store.query(&query.limit(1)).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_add_generates_ids() {
        let store = MemoryStore::new();
        let a = store.add("security_logs", Fields::new()).await.unwrap();
        let b = store.add("security_logs", Fields::new()).await.unwrap();
        assert_ne!(a, b);
        assert_eq!(store.collection_len("security_logs"), 2);
    }

    #[tokio::test]
    async fn test_watch_emits_in_write_order() {
        let store = MemoryStore::new();
        let query = Query::collection("projects").where_eq("founderId", "alice");
        let mut feed = store.watch(&query).unwrap();

        let first = feed.next().await.unwrap().unwrap();
        assert_eq!(first.sequence, 0);
        assert!(first.documents.is_empty());

        store
            .set(&path("projects/p1"), fields(json!({ "founderId": "alice" })))
            .await
            .unwrap();
        store
            .set(&path("projects/p2"), fields(json!({ "founderId": "bob" })))
            .await
            .unwrap();

        let second = feed.next().await.unwrap().unwrap();
        assert_eq!(second.sequence, 1);
        assert_eq!(second.documents.len(), 1);

        let third = feed.next().await.unwrap().unwrap();
        assert_eq!(third.sequence, 2);
        assert_eq!(third.documents.len(), 1);
    }

    #[tokio::test]
    async fn test_dropped_feed_is_pruned() {
        let store = MemoryStore::new();
        let feed = store.watch(&Query::collection("projects")).unwrap();
        assert_eq!(store.watcher_count(), 1);

        drop(feed);
        assert_eq!(store.watcher_count(), 0);
    }

    #[test]
    fn test_fixture_rejects_bad_paths() {
        assert!(MemoryStore::from_fixture(&json!({ "projects": {} })).is_err());
        assert!(MemoryStore::from_fixture(&json!({ "projects/p1": 3 })).is_err());
        assert!(MemoryStore::from_fixture(&json!([])).is_err());
    }
}
