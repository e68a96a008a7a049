//! Isolated CRUD.
//!
//! Writes force the owner field to the caller, so a payload can never name
//! another principal as owner. Updates and deletes validate ownership with
//! a full fetch first.

use crate::IsolationLayer;
use crate::validate::{PARTICIPANTS_FIELD, check_owner, validate_participant};
use bulwark_core::document::{
    CREATED_AT_FIELD, Document, DocumentPath, Fields, ID_FIELD, UPDATED_AT_FIELD, now_timestamp,
};
use bulwark_core::error::{ErrorKind, IsolationError, Result};
use bulwark_core::principal::Uid;
use serde_json::Value;
use tracing::{debug, instrument};

impl IsolationLayer {
    /// Fetches a document owned by `uid`.
    ///
    /// Returns `None` if the document does not exist. A document owned by
    /// someone else raises `OwnershipViolation`, or reads as `None` when
    /// `conceal_foreign_documents` is set; the breach is recorded either way.
    #[instrument(skip(self, uid), fields(uid = %uid))]
    pub async fn get_isolated_document(
        &self,
        collection: &str,
        id: &str,
        uid: &Uid,
        owner_field: Option<&str>,
    ) -> Result<Option<Document>> {
        let path = DocumentPath::new(collection, id)?;
        let owner_field = self.owner_field(owner_field);
        let Some(document) = self.store().get(&path).await? else {
            return Ok(None);
        };
        match check_owner(&document, uid, owner_field) {
            Ok(()) => Ok(Some(document)),
            Err(e) => {
                let concealable = e.kind() == ErrorKind::OwnershipViolation;
                let e = self.reject(uid, &path.to_string(), e).await;
                if concealable && self.config().conceal_foreign_documents {
                    Ok(None)
                } else {
                    Err(e)
                }
            }
        }
    }

    /// Creates or overwrites a document owned by `uid`.
    ///
    /// The owner field is forced to `uid` whatever the payload says.
    /// `createdAt` keeps the payload's value, then the stored value, then
    /// falls back to now; `updatedAt` is always now. Overwriting a document
    /// owned by someone else is an `OwnershipViolation`.
    #[instrument(skip(self, uid, data), fields(uid = %uid))]
    pub async fn set_isolated_document(
        &self,
        collection: &str,
        id: &str,
        uid: &Uid,
        mut data: Fields,
        owner_field: Option<&str>,
    ) -> Result<()> {
        let path = DocumentPath::new(collection, id)?;
        let owner_field = self.owner_field(owner_field);

        let existing = self.store().get(&path).await?;
        if let Some(existing) = &existing
            && let Err(e) = check_owner(existing, uid, owner_field)
        {
            return Err(self.reject(uid, &path.to_string(), e).await);
        }

        if let Some(Value::String(claimed)) = data.get(owner_field)
            && !uid.matches(claimed)
        {
            debug!(path = %path, claimed = %claimed, "Overriding spoofed owner field");
        }
        data.insert(owner_field.to_string(), Value::String(uid.to_string()));
        data.remove(ID_FIELD);

        let now = now_timestamp();
        if !data.contains_key(CREATED_AT_FIELD) {
            let created = existing
                .as_ref()
                .and_then(|doc| doc.get(CREATED_AT_FIELD))
                .cloned()
                .unwrap_or_else(|| now.clone());
            data.insert(CREATED_AT_FIELD.to_string(), created);
        }
        data.insert(UPDATED_AT_FIELD.to_string(), now);

        self.store().set(&path, data).await
    }

    /// Partially updates a document owned by `uid`.
    ///
    /// Any attempt to change the owner field is stripped from the payload.
    #[instrument(skip(self, uid, data), fields(uid = %uid))]
    pub async fn update_isolated_document(
        &self,
        collection: &str,
        id: &str,
        uid: &Uid,
        mut data: Fields,
        owner_field: Option<&str>,
    ) -> Result<()> {
        let path = DocumentPath::new(collection, id)?;
        let owner_field = self.owner_field(owner_field);
        self.validate_ownership(&path, uid, Some(owner_field)).await?;

        if data.remove(owner_field).is_some() {
            debug!(path = %path, owner_field, "Stripped owner field from update");
        }
        data.remove(ID_FIELD);
        data.insert(UPDATED_AT_FIELD.to_string(), now_timestamp());

        self.store().update(&path, data).await
    }

    /// Deletes a document owned by `uid`.
    #[instrument(skip(self, uid), fields(uid = %uid))]
    pub async fn delete_isolated_document(
        &self,
        collection: &str,
        id: &str,
        uid: &Uid,
        owner_field: Option<&str>,
    ) -> Result<()> {
        let path = DocumentPath::new(collection, id)?;
        self.validate_ownership(&path, uid, owner_field).await?;
        self.store().delete(&path).await
    }

    /// Partially updates a shared document `uid` participates in.
    ///
    /// The participant list itself cannot be rewritten through this call.
    #[instrument(skip(self, uid, data), fields(uid = %uid))]
    pub async fn update_shared_document(
        &self,
        collection: &str,
        id: &str,
        uid: &Uid,
        mut data: Fields,
        participants_field: Option<&str>,
    ) -> Result<()> {
        let field = participants_field.unwrap_or(PARTICIPANTS_FIELD);
        let document = self
            .get_shared_document(collection, id, uid, Some(field))
            .await?;

        if data.remove(field).is_some() {
            debug!(path = %document.path(), "Stripped participant list from update");
        }
        data.remove(ID_FIELD);
        data.insert(UPDATED_AT_FIELD.to_string(), now_timestamp());

        self.store().update(document.path(), data).await
    }

    /// Creates a shared document with `uid` as its first participant.
    ///
    /// The payload's participant array is kept in order without duplicates,
    /// and `uid` is added if absent. Overwriting an existing document is
    /// only allowed for one of its participants. Timestamps are stamped
    /// as in [`set_isolated_document`](Self::set_isolated_document).
    #[instrument(skip(self, uid, data), fields(uid = %uid))]
    pub async fn create_shared_document(
        &self,
        collection: &str,
        id: &str,
        uid: &Uid,
        mut data: Fields,
        participants_field: Option<&str>,
    ) -> Result<Document> {
        let path = DocumentPath::new(collection, id)?;
        let field = participants_field.unwrap_or(PARTICIPANTS_FIELD);

        let existing = self.store().get(&path).await?;
        if let Some(existing) = &existing
            && let Err(e) = validate_participant(existing.get(field), uid, &path.to_string())
        {
            return Err(self.reject(uid, &path.to_string(), e).await);
        }

        let participants = participant_list(uid, data.get(field), &path)?;
        data.insert(field.to_string(), Value::Array(participants));
        data.remove(ID_FIELD);

        let now = now_timestamp();
        if !data.contains_key(CREATED_AT_FIELD) {
            let created = existing
                .as_ref()
                .and_then(|doc| doc.get(CREATED_AT_FIELD))
                .cloned()
                .unwrap_or_else(|| now.clone());
            data.insert(CREATED_AT_FIELD.to_string(), created);
        }
        data.insert(UPDATED_AT_FIELD.to_string(), now);

        self.store().set(&path, data.clone()).await?;
        debug!(path = %path, "Shared document created");
        Ok(Document::new(path, data))
    }
}

/// The creator first, then every other listed principal once.
fn participant_list(
    creator: &Uid,
    listed: Option<&Value>,
    path: &DocumentPath,
) -> Result<Vec<Value>> {
    let others = match listed {
        None | Some(Value::Null) => &[][..],
        Some(Value::Array(members)) => members.as_slice(),
        Some(_) => {
            return Err(IsolationError::malformed(
                path.to_string(),
                "participants must be an array of UIDs",
            ));
        }
    };
    let mut participants = vec![Value::String(creator.to_string())];
    for member in others {
        let Some(member) = member.as_str() else {
            return Err(IsolationError::malformed(
                path.to_string(),
                "participants must be an array of UIDs",
            ));
        };
        if !participants.iter().any(|p| p.as_str() == Some(member)) {
            participants.push(Value::String(member.to_string()));
        }
    }
    Ok(participants)
}
