//! Principal, ownership and participant validation.

use crate::IsolationLayer;
use crate::facade::chats::CHAT_ROOMS_COLLECTION;
use bulwark_core::document::{Document, DocumentPath};
use bulwark_core::error::{IsolationError, Result};
use bulwark_core::principal::Uid;
use serde_json::Value;
use tracing::{debug, instrument, warn};

/// Default name of the participant array on shared resources.
pub const PARTICIPANTS_FIELD: &str = "participants";

/// Validates a candidate principal identifier.
///
/// Missing, blank and (for untyped callers, see [`Uid::from_value`])
/// non-string identifiers are rejected with `InvalidPrincipal`.
pub fn validate_uid(candidate: Option<&str>) -> Result<Uid> {
    Uid::parse(candidate).inspect_err(|e| warn!("Rejected principal: {e}"))
}

/// Compares a document's owner field to `uid`.
///
/// Pure: fetches nothing and records nothing. An absent owner is a
/// mismatch; a non-string owner is `MalformedDocument`.
pub fn check_owner(document: &Document, uid: &Uid, owner_field: &str) -> Result<()> {
    match document.owner(owner_field)? {
        Some(owner) if uid.matches(owner) => Ok(()),
        _ => Err(IsolationError::ownership_violation(
            uid.as_str(),
            document.path().to_string(),
        )),
    }
}

/// Checks that `uid` is listed in a participant array.
///
/// Pure: callers load the shared document first. A missing or non-array
/// value counts as "not a participant".
pub fn validate_participant(participants: Option<&Value>, uid: &Uid, resource: &str) -> Result<()> {
    let is_member = match participants {
        Some(Value::Array(members)) => members.iter().any(|m| m.as_str() == Some(uid.as_str())),
        _ => false,
    };
    if is_member {
        Ok(())
    } else {
        Err(IsolationError::not_participant(uid.as_str(), resource))
    }
}

impl IsolationLayer {
    /// Validates a candidate principal identifier.
    pub fn validate(&self, candidate: Option<&str>) -> Result<Uid> {
        validate_uid(candidate)
    }

    /// Fetches a document and asserts that `uid` owns it.
    ///
    /// Fails with `NotFound` when the document is absent and with
    /// `OwnershipViolation` (recorded in the breach log) on a mismatch.
    /// Returns the fetched document on success.
    #[instrument(skip(self, uid), fields(uid = %uid))]
    pub async fn validate_ownership(
        &self,
        path: &DocumentPath,
        uid: &Uid,
        owner_field: Option<&str>,
    ) -> Result<Document> {
        let owner_field = self.owner_field(owner_field);
        let Some(document) = self.store().get(path).await? else {
            return Err(IsolationError::not_found(path.to_string()));
        };
        if let Err(e) = check_owner(&document, uid, owner_field) {
            return Err(self.reject(uid, &path.to_string(), e).await);
        }
        debug!(path = %path, "Ownership validated");
        Ok(document)
    }

    /// Fetches a shared document and asserts that `uid` is a participant.
    ///
    /// `participants_field` defaults to `participants`.
    #[instrument(skip(self, uid), fields(uid = %uid))]
    pub async fn get_shared_document(
        &self,
        collection: &str,
        id: &str,
        uid: &Uid,
        participants_field: Option<&str>,
    ) -> Result<Document> {
        let path = DocumentPath::new(collection, id)?;
        let field = participants_field.unwrap_or(PARTICIPANTS_FIELD);
        let Some(document) = self.store().get(&path).await? else {
            return Err(IsolationError::not_found(path.to_string()));
        };
        let resource = path.to_string();
        if let Err(e) = validate_participant(document.get(field), uid, &resource) {
            return Err(self.reject(uid, &resource, e).await);
        }
        Ok(document)
    }

    /// Asserts that `uid` may access a chat room.
    pub async fn validate_chat_access(&self, room_id: &str, uid: &Uid) -> Result<Document> {
        self.get_shared_document(CHAT_ROOMS_COLLECTION, room_id, uid, None)
            .await
    }
}
