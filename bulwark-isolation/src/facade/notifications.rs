//! Per-principal notifications.

use super::{decode_all, new_id, read_owned};
use crate::IsolationLayer;
use bulwark_core::document::{Document, Fields};
use bulwark_core::error::Result;
use bulwark_core::principal::Uid;
use futures::future::try_join_all;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, instrument};

/// Notification collection.
pub const NOTIFICATIONS_COLLECTION: &str = "notifications";

/// Owner field of a notification.
pub const RECIPIENT_FIELD: &str = "userId";

/// Page size used when the caller does not pick one.
pub const DEFAULT_NOTIFICATION_LIMIT: usize = 50;

/// A stored notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    /// Document id.
    #[serde(default)]
    pub id: String,
    /// Recipient.
    pub user_id: String,
    /// Headline.
    pub title: String,
    /// Optional longer text.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
    /// Whether the recipient has seen it.
    #[serde(default)]
    pub read: bool,
    /// Creation time, RFC 3339.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
}

/// Payload for a new notification.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewNotification {
    /// Headline.
    pub title: String,
    /// Optional longer text.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
}

#[derive(Serialize)]
struct Unread<'a> {
    #[serde(flatten)]
    notification: &'a NewNotification,
    read: bool,
}

/// Notification operations for one layer.
#[derive(Debug, Clone, Copy)]
pub struct Notifications<'a> {
    pub(super) layer: &'a IsolationLayer,
}

impl Notifications<'_> {
    /// Creates an unread notification addressed to `uid`.
    pub async fn create(&self, uid: &Uid, notification: &NewNotification) -> Result<Notification> {
        let id = new_id();
        let fields = Document::encode(&Unread {
            notification,
            read: false,
        })?;
        self.layer
            .set_isolated_document(
                NOTIFICATIONS_COLLECTION,
                &id,
                uid,
                fields,
                Some(RECIPIENT_FIELD),
            )
            .await?;
        read_owned(self.layer, NOTIFICATIONS_COLLECTION, &id, uid, RECIPIENT_FIELD).await
    }

    /// Lists `uid`'s notifications, at most `limit` (default 50).
    ///
    /// The limit is applied after every record has been re-verified.
    #[instrument(skip(self, uid), fields(uid = %uid))]
    pub async fn list(&self, uid: &Uid, limit: Option<usize>) -> Result<Vec<Notification>> {
        let mut documents = self
            .layer
            .list_isolated_documents(NOTIFICATIONS_COLLECTION, uid, Some(RECIPIENT_FIELD), None)
            .await?;
        documents.truncate(limit.unwrap_or(DEFAULT_NOTIFICATION_LIMIT));
        decode_all(&documents)
    }

    /// Marks one of `uid`'s notifications as read.
    pub async fn mark_read(&self, id: &str, uid: &Uid) -> Result<()> {
        self.layer
            .update_isolated_document(
                NOTIFICATIONS_COLLECTION,
                id,
                uid,
                read_flag(),
                Some(RECIPIENT_FIELD),
            )
            .await
    }

    /// Marks every unread notification of `uid` as read and returns how
    /// many were updated.
    #[instrument(skip(self, uid), fields(uid = %uid))]
    pub async fn mark_all_read(&self, uid: &Uid) -> Result<usize> {
        let documents = self
            .layer
            .list_isolated_documents(NOTIFICATIONS_COLLECTION, uid, Some(RECIPIENT_FIELD), None)
            .await?;
        let unread: Vec<_> = documents
            .iter()
            .filter(|doc| doc.get("read") != Some(&Value::Bool(true)))
            .collect();

        try_join_all(unread.iter().map(|doc| self.mark_read(doc.id(), uid))).await?;
        debug!(count = unread.len(), "Marked notifications read");
        Ok(unread.len())
    }
}

fn read_flag() -> Fields {
    let mut fields = Fields::new();
    fields.insert("read".to_string(), Value::Bool(true));
    fields
}

#[cfg(test)]
mod tests {
    use super::*;
    use bulwark_core::error::ErrorKind;
    use bulwark_core::store::MemoryStore;
    use serde_json::json;
    use std::sync::Arc;

    fn uid(raw: &str) -> Uid {
        Uid::parse(Some(raw)).unwrap()
    }

    fn layer_with(count: usize) -> IsolationLayer {
        let mut fixture = serde_json::Map::new();
        for i in 0..count {
            fixture.insert(
                format!("notifications/n{i:03}"),
                json!({ "userId": "alice", "title": format!("#{i}"), "read": i % 2 == 0 }),
            );
        }
        fixture.insert(
            "notifications/other".to_string(),
            json!({ "userId": "bob", "title": "not yours" }),
        );
        let store = MemoryStore::from_fixture(&Value::Object(fixture)).unwrap();
        IsolationLayer::with_defaults(Arc::new(store))
    }

    #[tokio::test]
    async fn test_list_defaults_to_fifty() {
        let layer = layer_with(60);
        let alice = uid("alice");
        assert_eq!(layer.notifications().list(&alice, None).await.unwrap().len(), 50);
        assert_eq!(layer.notifications().list(&alice, Some(5)).await.unwrap().len(), 5);
        assert!(
            layer
                .notifications()
                .list(&alice, None)
                .await
                .unwrap()
                .iter()
                .all(|n| n.user_id == "alice")
        );
    }

    #[tokio::test]
    async fn test_create_is_unread() {
        let layer = layer_with(0);
        let created = layer
            .notifications()
            .create(
                &uid("bob"),
                &NewNotification {
                    title: "welcome".to_string(),
                    body: None,
                },
            )
            .await
            .unwrap();
        assert_eq!(created.user_id, "bob");
        assert!(!created.read);
    }

    #[tokio::test]
    async fn test_mark_read() {
        let layer = layer_with(2);
        layer.notifications().mark_read("n001", &uid("alice")).await.unwrap();

        let err = layer
            .notifications()
            .mark_read("other", &uid("alice"))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::OwnershipViolation);
    }

    #[tokio::test]
    async fn test_mark_all_read() {
        let layer = layer_with(4);
        let alice = uid("alice");
        assert_eq!(layer.notifications().mark_all_read(&alice).await.unwrap(), 2);
        assert!(
            layer
                .notifications()
                .list(&alice, None)
                .await
                .unwrap()
                .iter()
                .all(|n| n.read)
        );
        assert_eq!(layer.notifications().mark_all_read(&alice).await.unwrap(), 0);

        let bob = layer.notifications().list(&uid("bob"), None).await.unwrap();
        assert!(!bob[0].read);
    }
}
