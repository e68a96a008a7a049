//! Typed resource facades.
//!
//! Each facade pins the owner or participant field for one resource type
//! and is built only from the isolation primitives on [`IsolationLayer`].
//! Owned resources (projects, notifications, files) are checked for
//! ownership; shared resources (chat rooms, deals) for membership.

pub mod chats;
pub mod deals;
pub mod files;
pub mod notifications;
pub mod projects;

use crate::IsolationLayer;
use bulwark_core::document::Document;
use bulwark_core::error::{IsolationError, Result};
use bulwark_core::principal::Uid;
use chrono::{SecondsFormat, Utc};
use serde::de::DeserializeOwned;
use uuid::Uuid;

use self::chats::Chats;
use self::deals::Deals;
use self::files::Files;
use self::notifications::Notifications;
use self::projects::Projects;

impl IsolationLayer {
    /// Project operations, owned through `founderId`.
    #[must_use]
    pub fn projects(&self) -> Projects<'_> {
        Projects { layer: self }
    }

    /// Chat room operations, shared through `participants`.
    #[must_use]
    pub fn chats(&self) -> Chats<'_> {
        Chats { layer: self }
    }

    /// Notification operations, owned through `userId`.
    #[must_use]
    pub fn notifications(&self) -> Notifications<'_> {
        Notifications { layer: self }
    }

    /// File metadata operations, owned through `userId`.
    #[must_use]
    pub fn files(&self) -> Files<'_> {
        Files { layer: self }
    }

    /// Deal operations, shared through `participants`.
    #[must_use]
    pub fn deals(&self) -> Deals<'_> {
        Deals { layer: self }
    }
}

fn new_id() -> String {
    Uuid::new_v4().simple().to_string()
}

fn timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn decode_all<T: DeserializeOwned>(documents: &[Document]) -> Result<Vec<T>> {
    documents.iter().map(Document::decode).collect()
}

/// Reads back a document the caller just wrote.
async fn read_owned<T: DeserializeOwned>(
    layer: &IsolationLayer,
    collection: &str,
    id: &str,
    uid: &Uid,
    owner_field: &str,
) -> Result<T> {
    layer
        .get_isolated_document(collection, id, uid, Some(owner_field))
        .await?
        .ok_or_else(|| IsolationError::not_found(format!("{collection}/{id}")))?
        .decode()
}
