//! Projects, owned by their founder.

use super::{decode_all, new_id, read_owned};
use crate::IsolationLayer;
use bulwark_core::document::Document;
use bulwark_core::error::Result;
use bulwark_core::principal::Uid;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};

/// Project collection.
pub const PROJECTS_COLLECTION: &str = "projects";

/// Owner field of a project.
pub const FOUNDER_FIELD: &str = "founderId";

/// A stored project.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Project {
    /// Document id.
    #[serde(default)]
    pub id: String,
    /// Owning principal.
    pub founder_id: String,
    /// Display name.
    pub name: String,
    /// Free-form description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Funding stage, free-form.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stage: Option<String>,
    /// Creation time, RFC 3339.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
    /// Last write time, RFC 3339.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<String>,
}

/// Payload for creating a project.
///
/// Carries no owner: the founder is always the creating principal.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewProject {
    /// Display name.
    pub name: String,
    /// Free-form description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Funding stage.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stage: Option<String>,
}

/// Partial update of a project. Unset fields are left alone.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectPatch {
    /// Display name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Free-form description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Funding stage.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stage: Option<String>,
}

/// Project operations for one layer.
#[derive(Debug, Clone, Copy)]
pub struct Projects<'a> {
    pub(super) layer: &'a IsolationLayer,
}

impl Projects<'_> {
    /// Creates a project founded by `uid`.
    #[instrument(skip(self, uid, project), fields(uid = %uid))]
    pub async fn create(&self, uid: &Uid, project: &NewProject) -> Result<Project> {
        let id = new_id();
        let fields = Document::encode(project)?;
        self.layer
            .set_isolated_document(PROJECTS_COLLECTION, &id, uid, fields, Some(FOUNDER_FIELD))
            .await?;
        info!(project_id = %id, "Project created");
        read_owned(self.layer, PROJECTS_COLLECTION, &id, uid, FOUNDER_FIELD).await
    }

    /// Fetches one of `uid`'s projects.
    pub async fn get(&self, id: &str, uid: &Uid) -> Result<Option<Project>> {
        self.layer
            .get_isolated_document(PROJECTS_COLLECTION, id, uid, Some(FOUNDER_FIELD))
            .await?
            .as_ref()
            .map(Document::decode)
            .transpose()
    }

    /// Lists the projects founded by `uid`.
    pub async fn list(&self, uid: &Uid) -> Result<Vec<Project>> {
        let documents = self
            .layer
            .list_isolated_documents(PROJECTS_COLLECTION, uid, Some(FOUNDER_FIELD), None)
            .await?;
        decode_all(&documents)
    }

    /// Applies a partial update to one of `uid`'s projects.
    pub async fn update(&self, id: &str, uid: &Uid, patch: &ProjectPatch) -> Result<()> {
        let fields = Document::encode(patch)?;
        self.layer
            .update_isolated_document(PROJECTS_COLLECTION, id, uid, fields, Some(FOUNDER_FIELD))
            .await
    }

    /// Deletes one of `uid`'s projects.
    pub async fn delete(&self, id: &str, uid: &Uid) -> Result<()> {
        self.layer
            .delete_isolated_document(PROJECTS_COLLECTION, id, uid, Some(FOUNDER_FIELD))
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
            "projects/p1": { "founderId": "bob", "name": "Bob's" },
            "projects/p2": { "founderId": "alice", "name": "Alice's", "stage": "seed" },
        }))
        .unwrap();
        IsolationLayer::with_defaults(Arc::new(store))
    }

    #[tokio::test]
    async fn test_create_and_list() {
        let layer = layer();
        let alice = uid("alice");
        let created = layer
            .projects()
            .create(
                &alice,
                &NewProject {
                    name: "Rocket".to_string(),
                    ..NewProject::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(created.founder_id, "alice");
        assert!(created.created_at.is_some());
        assert!(!created.id.is_empty());

        let mut names: Vec<_> = layer
            .projects()
            .list(&alice)
            .await
            .unwrap()
            .into_iter()
            .map(|p| p.name)
            .collect();
        names.sort();
        assert_eq!(names, ["Alice's", "Rocket"]);
    }

    #[tokio::test]
    async fn test_get_decodes_typed_project() {
        let layer = layer();
        let project = layer.projects().get("p2", &uid("alice")).await.unwrap().unwrap();
        assert_eq!(project.id, "p2");
        assert_eq!(project.stage.as_deref(), Some("seed"));
        assert!(layer.projects().get("nope", &uid("alice")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_update_foreign_project_rejected() {
        let layer = layer();
        let patch = ProjectPatch {
            name: Some("hijacked".to_string()),
            ..ProjectPatch::default()
        };
        let err = layer
            .projects()
            .update("p1", &uid("alice"), &patch)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::OwnershipViolation);

        layer.projects().update("p2", &uid("alice"), &patch).await.unwrap();
        let project = layer.projects().get("p2", &uid("alice")).await.unwrap().unwrap();
        assert_eq!(project.name, "hijacked");
        assert_eq!(project.stage.as_deref(), Some("seed"));
    }

    #[tokio::test]
    async fn test_delete() {
        let layer = layer();
        assert!(layer.projects().delete("p1", &uid("alice")).await.is_err());
        layer.projects().delete("p2", &uid("alice")).await.unwrap();
        assert!(layer.projects().list(&uid("alice")).await.unwrap().is_empty());
    }
}
