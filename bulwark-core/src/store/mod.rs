//! Document store contract.
//!
//! The isolation layer never owns data; it is a client of a store that
//! provides fetch-by-path, filtered queries, writes and a change-feed. Any
//! backend implementing [`DocumentStore`] can sit underneath it.
//!
//! # Example
//!
//! ```
//! use bulwark_core::document::DocumentPath;
//! use bulwark_core::store::{DocumentStore, MemoryStore};
//! use serde_json::json;
//!
//! # async fn example() -> bulwark_core::error::Result<()> {
//! let store = MemoryStore::new();
//! let path = DocumentPath::parse("projects/p1")?;
//! store.set(&path, json!({ "founderId": "alice" }).as_object().unwrap().clone()).await?;
//! assert!(store.get(&path).await?.is_some());
//! # Ok(())
//! # }
//! ```

mod memory;

pub use memory::MemoryStore;

use crate::document::{Document, DocumentPath, Fields};
use crate::error::Result;
use crate::query::Query;
use async_trait::async_trait;
use tokio::sync::mpsc;

/// One emission of a change-feed: the full result set of the watched query
/// at a point in time.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    /// Monotonic sequence number within one feed, starting at 0.
    pub sequence: u64,
    /// Documents currently matching the query.
    pub documents: Vec<Document>,
}

/// Sending half of a change-feed, held by the store.
pub type FeedSender = mpsc::UnboundedSender<Result<Snapshot>>;

/// Receiving half of a change-feed.
///
/// Snapshots arrive in the order the store emits them. Dropping the feed
/// detaches it from the store.
#[derive(Debug)]
pub struct ChangeFeed {
    receiver: mpsc::UnboundedReceiver<Result<Snapshot>>,
}

impl ChangeFeed {
    /// Creates a connected sender/feed pair.
    #[must_use]
    pub fn channel() -> (FeedSender, Self) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (sender, Self { receiver })
    }

    /// Waits for the next snapshot.
    ///
    /// Returns `None` once the store has closed the feed.
    pub async fn next(&mut self) -> Option<Result<Snapshot>> {
        self.receiver.recv().await
    }

    /// Returns the next snapshot if one is already queued.
    pub fn try_next(&mut self) -> Option<Result<Snapshot>> {
        self.receiver.try_recv().ok()
    }
}

/// Backend contract consumed by the isolation layer.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Fetches a document by path.
    async fn get(&self, path: &DocumentPath) -> Result<Option<Document>>;

    /// Returns every document matching the query.
    async fn query(&self, query: &Query) -> Result<Vec<Document>>;

    /// Creates or overwrites a document.
    async fn set(&self, path: &DocumentPath, fields: Fields) -> Result<()>;

    /// Merges fields into an existing document.
    ///
    /// Fails with `NotFound` if the document does not exist.
    async fn update(&self, path: &DocumentPath, fields: Fields) -> Result<()>;

    /// Deletes a document. Deleting a missing document is not an error.
    async fn delete(&self, path: &DocumentPath) -> Result<()>;

    /// Appends a document under a store-generated id and returns the id.
    async fn add(&self, collection: &str, fields: Fields) -> Result<String>;

    /// Opens a change-feed over the query's result set.
    ///
    /// The first snapshot is the current result set.
    fn watch(&self, query: &Query) -> Result<ChangeFeed>;
}
