//! # Bulwark Core
//!
//! Shared building blocks for the bulwark tenant-isolation layer.
//!
//! This crate provides:
//! - The `IsolationError` type and its `ErrorKind` codes
//! - The `Uid` principal newtype and its validation
//! - Untyped `Document` payloads with typed encode/decode at the boundary
//! - The `DocumentStore` contract consumed by the isolation layer, including
//!   the change-feed primitive, and an in-memory implementation
//! - Configuration loading (YAML/TOML/JSON) with environment overrides
//!
//! # Example
//!
//! ```
//! use bulwark_core::principal::Uid;
//! use bulwark_core::query::Query;
//!
//! let uid = Uid::parse(Some("alice")).unwrap();
//! let query = Query::collection("projects").where_eq("founderId", uid.as_str());
//! assert_eq!(query.collection_path(), "projects");
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::module_name_repetitions)]

/// Error types
pub mod error;

/// Configuration management
pub mod config;

/// Principal identifiers
pub mod principal;

/// Untyped documents and document paths
pub mod document;

/// Store queries
pub mod query;

/// Document store contract and in-memory implementation
pub mod store;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::config::*;
    pub use crate::document::*;
    pub use crate::error::*;
    pub use crate::principal::*;
    pub use crate::query::*;
    pub use crate::store::*;
}
