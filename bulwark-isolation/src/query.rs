//! Isolated and participant queries.
//!
//! Queries built here are only the first line of defence. Every listing
//! re-verifies each returned record before handing it out, so a store that
//! ignores a filter or serves a stale index still cannot leak a foreign
//! record.

use crate::IsolationLayer;
use crate::admin::Caller;
use crate::validate::{PARTICIPANTS_FIELD, check_owner, validate_participant};
use bulwark_core::document::{Document, validate_collection_path};
use bulwark_core::error::Result;
use bulwark_core::principal::Uid;
use bulwark_core::query::Query;
use tracing::{debug, instrument};

/// Builds `collection WHERE owner_field == uid`.
///
/// ```
/// use bulwark_core::principal::Uid;
/// use bulwark_isolation::query::create_isolated_query;
///
/// let uid = Uid::parse(Some("alice")).unwrap();
/// let query = create_isolated_query("projects", &uid, "founderId");
/// assert_eq!(query.to_string(), r#"projects WHERE founderId == "alice""#);
/// ```
#[must_use]
pub fn create_isolated_query(collection: &str, uid: &Uid, owner_field: &str) -> Query {
    Query::collection(collection).where_eq(owner_field, uid.as_str())
}

/// Builds `collection WHERE participants_field ARRAY-CONTAINS uid`.
#[must_use]
pub fn create_participant_query(collection: &str, uid: &Uid, participants_field: &str) -> Query {
    Query::collection(collection).where_array_contains(participants_field, uid.as_str())
}

impl IsolationLayer {
    /// Lists the documents of `collection` owned by `uid`.
    ///
    /// Records that fail re-verification are dropped and breach-logged.
    #[instrument(skip(self, uid), fields(uid = %uid))]
    pub async fn list_isolated_documents(
        &self,
        collection: &str,
        uid: &Uid,
        owner_field: Option<&str>,
        limit: Option<usize>,
    ) -> Result<Vec<Document>> {
        validate_collection_path(collection)?;
        let owner_field = self.owner_field(owner_field);
        let mut query = create_isolated_query(collection, uid, owner_field);
        if let Some(limit) = limit {
            query = query.limit(limit);
        }
        let documents = self.store().query(&query).await?;
        Ok(self.retain_owned(documents, uid, owner_field).await)
    }

    /// Lists the shared documents of `collection` that list `uid` as a
    /// participant.
    ///
    /// Membership is re-checked on every record.
    #[instrument(skip(self, uid), fields(uid = %uid))]
    pub async fn list_participant_documents(
        &self,
        collection: &str,
        uid: &Uid,
        participants_field: Option<&str>,
    ) -> Result<Vec<Document>> {
        validate_collection_path(collection)?;
        let field = participants_field.unwrap_or(PARTICIPANTS_FIELD);
        let query = create_participant_query(collection, uid, field);
        let documents = self.store().query(&query).await?;

        let mut visible = Vec::with_capacity(documents.len());
        for document in documents {
            let resource = document.path().to_string();
            match validate_participant(document.get(field), uid, &resource) {
                Ok(()) => visible.push(document),
                Err(e) => {
                    self.reject(uid, &resource, e).await;
                }
            }
        }
        Ok(visible)
    }

    /// Lists `collection` with admin override.
    ///
    /// Admins see the whole collection. Everyone else gets exactly the
    /// documents they own, as [`list_isolated_documents`](Self::list_isolated_documents).
    #[instrument(skip(self, caller))]
    pub async fn get_data_with_admin_access(
        &self,
        collection: &str,
        caller: impl Into<Caller> + Send,
        owner_field: Option<&str>,
    ) -> Result<Vec<Document>> {
        let caller = caller.into();
        validate_collection_path(collection)?;
        if self.is_admin(caller.clone()).await? {
            debug!(uid = %caller.uid(), collection, "Admin override, returning full collection");
            return self.store().query(&Query::collection(collection)).await;
        }
        self.list_isolated_documents(collection, caller.uid(), owner_field, None)
            .await
    }

    /// Keeps the documents owned by `uid`, breach-logging the rest.
    pub(crate) async fn retain_owned(
        &self,
        documents: Vec<Document>,
        uid: &Uid,
        owner_field: &str,
    ) -> Vec<Document> {
        let mut owned = Vec::with_capacity(documents.len());
        for document in documents {
            match check_owner(&document, uid, owner_field) {
                Ok(()) => owned.push(document),
                Err(e) => {
                    self.reject(uid, &document.path().to_string(), e).await;
                }
            }
        }
        owned
    }
}
