//! Deals, shared between their participants.

use super::{decode_all, new_id};
use crate::IsolationLayer;
use bulwark_core::document::Document;
use bulwark_core::error::Result;
use bulwark_core::principal::Uid;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};

/// Deal collection.
pub const DEALS_COLLECTION: &str = "deals";

/// A stored deal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Deal {
    /// Document id.
    #[serde(default)]
    pub id: String,
    /// Deal title.
    pub title: String,
    /// Principals allowed to read and edit the deal.
    pub participants: Vec<String>,
    /// Principal that opened the deal.
    #[serde(default)]
    pub created_by: String,
    /// Pipeline status, free-form.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    /// Deal size in the deal's currency.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amount: Option<f64>,
    /// Creation time, RFC 3339.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
    /// Last write time, RFC 3339.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<String>,
}

/// Payload for opening a deal.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NewDeal {
    /// Deal title.
    pub title: String,
    /// Counterparties. The creator is added automatically.
    pub participants: Vec<Uid>,
    /// Initial status.
    pub status: Option<String>,
    /// Deal size.
    pub amount: Option<f64>,
}

/// Partial update of a deal. The participant list cannot be changed here.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DealPatch {
    /// New title.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// New status.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    /// New amount.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amount: Option<f64>,
}

/// Deal operations for one layer.
#[derive(Debug, Clone, Copy)]
pub struct Deals<'a> {
    pub(super) layer: &'a IsolationLayer,
}

impl Deals<'_> {
    /// Opens a deal. The creator is always a participant.
    #[instrument(skip(self, uid, deal), fields(uid = %uid))]
    pub async fn create(&self, uid: &Uid, deal: NewDeal) -> Result<Deal> {
        let record = Deal {
            id: new_id(),
            title: deal.title,
            participants: deal.participants.iter().map(Uid::to_string).collect(),
            created_by: uid.to_string(),
            status: deal.status,
            amount: deal.amount,
            created_at: None,
            updated_at: None,
        };
        let record: Deal = self
            .layer
            .create_shared_document(
                DEALS_COLLECTION,
                &record.id,
                uid,
                Document::encode(&record)?,
                None,
            )
            .await?
            .decode()?;
        info!(deal_id = %record.id, "Deal created");
        Ok(record)
    }

    /// Fetches a deal `uid` participates in.
    pub async fn get(&self, id: &str, uid: &Uid) -> Result<Deal> {
        self.layer
            .get_shared_document(DEALS_COLLECTION, id, uid, None)
            .await?
            .decode()
    }

    /// Lists the deals `uid` participates in.
    pub async fn list(&self, uid: &Uid) -> Result<Vec<Deal>> {
        let documents = self
            .layer
            .list_participant_documents(DEALS_COLLECTION, uid, None)
            .await?;
        decode_all(&documents)
    }

    /// Applies a partial update to a deal `uid` participates in.
    pub async fn update(&self, id: &str, uid: &Uid, patch: &DealPatch) -> Result<()> {
        let fields = Document::encode(patch)?;
        self.layer
            .update_shared_document(DEALS_COLLECTION, id, uid, fields, None)
            .await
    }
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

    fn layer() -> IsolationLayer {
        let store = MemoryStore::from_fixture(&json!({
            "deals/d1": { "title": "Series A", "participants": ["alice", "bob"], "amount": 2.5 },
            "deals/d2": { "title": "Bridge", "participants": ["carol"] },
        }))
        .unwrap();
        IsolationLayer::with_defaults(Arc::new(store))
    }

    #[tokio::test]
    async fn test_create_includes_creator() {
        let layer = layer();
        let deal = layer
            .deals()
            .create(
                &uid("carol"),
                NewDeal {
                    title: "Seed".to_string(),
                    participants: vec![uid("dave")],
                    ..NewDeal::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(deal.participants, ["carol", "dave"]);
        assert_eq!(deal.created_at, deal.updated_at);
        assert!(deal.created_at.is_some());

        let fetched = layer.deals().get(&deal.id, &uid("dave")).await.unwrap();
        assert_eq!(fetched.title, "Seed");
        assert_eq!(layer.deals().list(&uid("carol")).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_non_participant_rejected() {
        let layer = layer();
        let err = layer.deals().get("d1", &uid("carol")).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotParticipant);

        let patch = DealPatch {
            status: Some("closed".to_string()),
            ..DealPatch::default()
        };
        let err = layer
            .deals()
            .update("d1", &uid("carol"), &patch)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotParticipant);
    }

    #[tokio::test]
    async fn test_participant_update() {
        let layer = layer();
        let patch = DealPatch {
            status: Some("term sheet".to_string()),
            ..DealPatch::default()
        };
        layer.deals().update("d1", &uid("bob"), &patch).await.unwrap();

        let deal = layer.deals().get("d1", &uid("alice")).await.unwrap();
        assert_eq!(deal.status.as_deref(), Some("term sheet"));
        assert_eq!(deal.amount, Some(2.5));
        assert_eq!(deal.participants, ["alice", "bob"]);
        assert!(deal.updated_at.is_some());
    }
}
