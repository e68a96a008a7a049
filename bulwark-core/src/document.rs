//! Untyped documents and their paths.
//!
//! The store speaks in JSON objects. Typed resources cross into and out of
//! that representation only through [`Document::decode`] and
//! [`Document::encode`], which is where malformed payloads are caught.

use crate::error::{IsolationError, Result};
use crate::principal::json_type_name;
use chrono::{SecondsFormat, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// Field map of a document.
pub type Fields = Map<String, Value>;

/// Field carrying a document's identifier in decoded representations.
pub const ID_FIELD: &str = "id";

/// Field stamped with the creation time on isolated writes.
pub const CREATED_AT_FIELD: &str = "createdAt";

/// Field stamped with the last update time on isolated writes.
pub const UPDATED_AT_FIELD: &str = "updatedAt";

/// Returns the current time as a store timestamp value (RFC 3339, UTC).
#[must_use]
pub fn now_timestamp() -> Value {
    Value::String(Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true))
}

/// Validates a slash-separated collection path such as `projects` or
/// `chat_rooms/r1/messages`.
pub fn validate_collection_path(path: &str) -> Result<()> {
    let segments: Vec<&str> = path.split('/').collect();
    if segments.iter().any(|s| s.trim().is_empty()) {
        return Err(IsolationError::malformed(path, "empty path segment"));
    }
    if segments.len() % 2 == 0 {
        return Err(IsolationError::malformed(
            path,
            "collection paths must have an odd number of segments",
        ));
    }
    Ok(())
}

/// Fully-qualified location of a document: `collection/id`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DocumentPath {
    collection: String,
    id: String,
}

impl DocumentPath {
    /// Creates a path from a collection path and a document id.
    pub fn new(collection: impl Into<String>, id: impl Into<String>) -> Result<Self> {
        let collection = collection.into();
        let id = id.into();
        validate_collection_path(&collection)?;
        if id.trim().is_empty() || id.contains('/') {
            return Err(IsolationError::malformed(
                format!("{collection}/{id}"),
                "document ids must be non-empty and contain no '/'",
            ));
        }
        Ok(Self { collection, id })
    }

    /// Parses a full document path such as `projects/p1`.
    pub fn parse(full: &str) -> Result<Self> {
        let Some((collection, id)) = full.rsplit_once('/') else {
            return Err(IsolationError::malformed(
                full,
                "document paths have the form collection/id",
            ));
        };
        Self::new(collection, id)
    }

    /// Returns the collection path.
    #[must_use]
    pub fn collection(&self) -> &str {
        &self.collection
    }

    /// Returns the document id.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Returns the path of a sub-collection under this document.
    pub fn child_collection(&self, name: &str) -> Result<String> {
        let path = format!("{self}/{name}");
        validate_collection_path(&path)?;
        Ok(path)
    }
}

impl fmt::Display for DocumentPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.collection, self.id)
    }
}

/// A document read from the store.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    path: DocumentPath,
    fields: Fields,
}

impl Document {
    /// Creates a document from its path and fields.
    #[must_use]
    pub fn new(path: DocumentPath, fields: Fields) -> Self {
        Self { path, fields }
    }

    /// Returns the document path.
    #[must_use]
    pub fn path(&self) -> &DocumentPath {
        &self.path
    }

    /// Returns the document id.
    #[must_use]
    pub fn id(&self) -> &str {
        self.path.id()
    }

    /// Returns the document fields.
    #[must_use]
    pub fn fields(&self) -> &Fields {
        &self.fields
    }

    /// Consumes the document, returning its fields.
    #[must_use]
    pub fn into_fields(self) -> Fields {
        self.fields
    }

    /// Returns a single field.
    #[must_use]
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    /// Reads the owner field.
    ///
    /// Returns `Ok(None)` when the field is absent or null and an error when
    /// it holds anything other than a string, so a malformed owner can never
    /// slip through an equality check.
    pub fn owner(&self, owner_field: &str) -> Result<Option<&str>> {
        match self.fields.get(owner_field) {
            None | Some(Value::Null) => Ok(None),
            Some(Value::String(owner)) => Ok(Some(owner)),
            Some(other) => Err(IsolationError::malformed(
                self.path.to_string(),
                format!(
                    "owner field '{owner_field}' must be a string, got {}",
                    json_type_name(other)
                ),
            )),
        }
    }

    /// Returns the document as a JSON object with its id under `"id"`.
    #[must_use]
    pub fn to_value(&self) -> Value {
        let mut object = self.fields.clone();
        object.insert(ID_FIELD.to_string(), Value::String(self.id().to_string()));
        Value::Object(object)
    }

    /// Decodes the document into a typed resource.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_value(self.to_value())
            .map_err(|e| IsolationError::malformed(self.path.to_string(), e.to_string()))
    }

    /// Encodes a typed value into document fields.
    ///
    /// The `"id"` key is dropped: ids live in the path, never in the payload.
    pub fn encode<T: Serialize>(value: &T) -> Result<Fields> {
        match serde_json::to_value(value) {
            Ok(Value::Object(mut fields)) => {
                fields.remove(ID_FIELD);
                Ok(fields)
            }
            Ok(other) => Err(IsolationError::malformed(
                "<payload>",
                format!("documents must be objects, got {}", json_type_name(&other)),
            )),
            Err(e) => Err(IsolationError::malformed("<payload>", e.to_string())),
        }
    }
}
