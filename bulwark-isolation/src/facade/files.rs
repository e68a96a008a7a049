//! File metadata and isolated storage paths.

use super::{decode_all, new_id, read_owned};
use crate::IsolationLayer;
use crate::namespace::UserNamespace;
use bulwark_core::document::Document;
use bulwark_core::error::{IsolationError, Result};
use bulwark_core::principal::Uid;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};

/// File metadata collection.
pub const FILES_COLLECTION: &str = "files";

/// Owner field of a file record.
pub const UPLOADER_FIELD: &str = "userId";

/// Object storage path for a file owned by `uid`: `users/{uid}/files/{name}`.
///
/// Names that could escape the principal's prefix are refused.
///
/// ```
/// use bulwark_core::principal::Uid;
/// use bulwark_isolation::facade::files::storage_path;
///
/// let uid = Uid::parse(Some("alice")).unwrap();
/// assert_eq!(storage_path(&uid, "deck.pdf").unwrap(), "users/alice/files/deck.pdf");
/// assert!(storage_path(&uid, "../bob/deck.pdf").is_err());
/// ```
pub fn storage_path(uid: &Uid, name: &str) -> Result<String> {
    if name.trim().is_empty() || name.contains('/') || name.contains("..") {
        return Err(IsolationError::malformed(
            name,
            "file names must be non-empty and contain no '/' or '..'",
        ));
    }
    Ok(format!("{}/{name}", UserNamespace::Files.path(uid)?))
}

/// Metadata of a stored file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileRecord {
    /// Document id.
    #[serde(default)]
    pub id: String,
    /// Uploading principal.
    pub user_id: String,
    /// File name, unique per principal only by convention.
    pub name: String,
    /// Location in object storage, see [`storage_path`].
    pub storage_path: String,
    /// Size in bytes.
    #[serde(default)]
    pub size: u64,
    /// MIME type.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
    /// Registration time, RFC 3339.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
}

/// Payload for registering an uploaded file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewFile {
    /// File name.
    pub name: String,
    /// Size in bytes.
    #[serde(default)]
    pub size: u64,
    /// MIME type.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct Registration<'a> {
    #[serde(flatten)]
    file: &'a NewFile,
    storage_path: String,
}

/// File operations for one layer.
#[derive(Debug, Clone, Copy)]
pub struct Files<'a> {
    pub(super) layer: &'a IsolationLayer,
}

impl Files<'_> {
    /// Records an uploaded file under `uid`'s storage prefix.
    #[instrument(skip(self, uid, file), fields(uid = %uid))]
    pub async fn register(&self, uid: &Uid, file: &NewFile) -> Result<FileRecord> {
        let storage_path = storage_path(uid, &file.name)?;
        let id = new_id();
        let fields = Document::encode(&Registration { file, storage_path })?;
        self.layer
            .set_isolated_document(FILES_COLLECTION, &id, uid, fields, Some(UPLOADER_FIELD))
            .await?;
        info!(file_id = %id, name = %file.name, "File registered");
        read_owned(self.layer, FILES_COLLECTION, &id, uid, UPLOADER_FIELD).await
    }

    /// Fetches one of `uid`'s file records.
    pub async fn get(&self, id: &str, uid: &Uid) -> Result<Option<FileRecord>> {
        self.layer
            .get_isolated_document(FILES_COLLECTION, id, uid, Some(UPLOADER_FIELD))
            .await?
            .as_ref()
            .map(Document::decode)
            .transpose()
    }

    /// Lists `uid`'s files.
    pub async fn list(&self, uid: &Uid) -> Result<Vec<FileRecord>> {
        let documents = self
            .layer
            .list_isolated_documents(FILES_COLLECTION, uid, Some(UPLOADER_FIELD), None)
            .await?;
        decode_all(&documents)
    }

    /// Deletes one of `uid`'s file records.
    pub async fn delete(&self, id: &str, uid: &Uid) -> Result<()> {
        self.layer
            .delete_isolated_document(FILES_COLLECTION, id, uid, Some(UPLOADER_FIELD))
            .await
    }
}
