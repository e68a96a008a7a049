//! # Bulwark Isolation
//!
//! Tenant-isolation access layer for a shared, multi-tenant document store.
//!
//! Every read, write and live subscription issued through an
//! [`IsolationLayer`] is scoped to the principal that issued it:
//! - owned resources are filtered and re-verified on `ownerField == uid`
//! - shared resources require membership in a `participants` array
//! - admin principals may bypass owner filtering when explicitly requested
//! - every detected mismatch raises a typed error and lands in the breach log
//!
//! # Example
//!
//! ```
//! use bulwark_core::prelude::*;
//! use bulwark_isolation::IsolationLayer;
//! use serde_json::json;
//! use std::sync::Arc;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> bulwark_core::error::Result<()> {
//! let layer = IsolationLayer::with_defaults(Arc::new(MemoryStore::new()));
//! let alice = Uid::parse(Some("alice"))?;
//!
//! let mut data = Fields::new();
//! data.insert("name".into(), json!("x"));
//! data.insert("userId".into(), json!("mallory"));
//! layer.set_isolated_document("files", "f1", &alice, data, None).await?;
//!
//! let stored = layer.get_isolated_document("files", "f1", &alice, None).await?.unwrap();
//! assert_eq!(stored.get("userId"), Some(&json!("alice")));
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::module_name_repetitions)]

mod layer;

/// Admin override resolution
pub mod admin;

/// Breach logging
pub mod breach;

/// Cache key namespacing
pub mod cache;

/// Isolated CRUD
pub mod crud;

/// Resource facades
pub mod facade;

/// Isolation health checks
pub mod health;

/// Per-principal storage namespaces
pub mod namespace;

/// Isolated and participant queries
pub mod query;

/// Foreign-record sanitizing
pub mod sanitize;

/// Isolated subscriptions
pub mod subscription;

/// Principal, ownership and participant validation
pub mod validate;

pub use layer::IsolationLayer;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::IsolationLayer;
    pub use crate::admin::{
        AdminClaims, AdminResolver, Caller, ClaimAdminResolver, ProfileAdminResolver,
    };
    pub use crate::breach::{BreachLogger, ViolationRecord};
    pub use crate::cache::{IsolatedCache, isolated_cache_key, validate_cache_key};
    pub use crate::facade::chats::{ChatRoom, Message};
    pub use crate::facade::deals::{Deal, DealPatch, NewDeal};
    pub use crate::facade::files::{FileRecord, NewFile};
    pub use crate::facade::notifications::{NewNotification, Notification};
    pub use crate::facade::projects::{NewProject, Project, ProjectPatch};
    pub use crate::health::IsolationHealth;
    pub use crate::namespace::{SHARED_COLLECTIONS, UserNamespace};
    pub use crate::sanitize::{SENSITIVE_FIELDS, sanitize_data_for_user, sanitize_document};
    pub use crate::subscription::{ScopeMode, SubscriptionHandle, SubscriptionPhase};
    pub use crate::validate::{check_owner, validate_participant, validate_uid};
}
