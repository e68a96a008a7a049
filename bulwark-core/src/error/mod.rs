//! Error types for the isolation layer.
//!
//! Every failure the isolation layer raises is an [`IsolationError`]. The
//! four access-control outcomes (`InvalidPrincipal`, `NotFound`,
//! `OwnershipViolation`, `NotParticipant`) are what application code is
//! expected to match on; the remaining variants report malformed payloads,
//! rejected admin claims and backend failures.
//!
//! ```
//! use bulwark_core::error::{ErrorKind, IsolationError};
//!
//! let err = IsolationError::ownership_violation("alice", "projects/p1");
//! assert_eq!(err.kind(), ErrorKind::OwnershipViolation);
//! assert!(err.is_access_denied());
//! ```

mod config;

pub use config::ConfigError;

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Stable code identifying the category of an [`IsolationError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Missing or malformed principal identifier.
    InvalidPrincipal,
    /// The addressed document does not exist.
    NotFound,
    /// The owner field of a document does not match the principal.
    OwnershipViolation,
    /// The principal is absent from a shared resource's participant list.
    NotParticipant,
    /// A document failed the boundary schema check.
    MalformedDocument,
    /// An admin claim could not be verified.
    InvalidClaim,
    /// The underlying store failed.
    Store,
}

impl ErrorKind {
    /// Returns the snake-case code for this kind.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::InvalidPrincipal => "invalid_principal",
            Self::NotFound => "not_found",
            Self::OwnershipViolation => "ownership_violation",
            Self::NotParticipant => "not_participant",
            Self::MalformedDocument => "malformed_document",
            Self::InvalidClaim => "invalid_claim",
            Self::Store => "store",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// Errors raised by the isolation layer.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum IsolationError {
    /// The principal identifier is missing, not a string, or blank.
    #[error("Invalid principal: {reason}")]
    InvalidPrincipal {
        /// Why the principal was rejected.
        reason: String,
    },

    /// The document does not exist.
    #[error("Document not found: {path}")]
    NotFound {
        /// Path of the missing document.
        path: String,
    },

    /// The document is owned by a different principal.
    #[error("Ownership violation: principal '{uid}' does not own '{path}'")]
    OwnershipViolation {
        /// Principal that attempted the access.
        uid: String,
        /// Path of the document.
        path: String,
    },

    /// The principal is not a member of the shared resource.
    #[error("Principal '{uid}' is not a participant in {resource}")]
    NotParticipant {
        /// Principal that attempted the access.
        uid: String,
        /// Description of the shared resource.
        resource: String,
    },

    /// The document could not be validated against its expected shape.
    #[error("Malformed document at '{path}': {reason}")]
    MalformedDocument {
        /// Path (or collection) of the document.
        path: String,
        /// What was wrong with it.
        reason: String,
    },

    /// An admin claim token was rejected.
    #[error("Invalid admin claim: {reason}")]
    InvalidClaim {
        /// Why verification failed.
        reason: String,
    },

    /// The underlying document store reported a failure.
    #[error("Store error during {operation}: {reason}")]
    Store {
        /// Store operation that failed.
        operation: String,
        /// Backend-provided reason.
        reason: String,
    },
}

impl IsolationError {
    /// Creates a new invalid principal error.
    #[must_use]
    pub fn invalid_principal(reason: impl Into<String>) -> Self {
        Self::InvalidPrincipal {
            reason: reason.into(),
        }
    }

    /// Creates a new not found error.
    #[must_use]
    pub fn not_found(path: impl Into<String>) -> Self {
        Self::NotFound { path: path.into() }
    }

    /// Creates a new ownership violation error.
    #[must_use]
    pub fn ownership_violation(uid: impl Into<String>, path: impl Into<String>) -> Self {
        Self::OwnershipViolation {
            uid: uid.into(),
            path: path.into(),
        }
    }

    /// Creates a new not participant error.
    #[must_use]
    pub fn not_participant(uid: impl Into<String>, resource: impl Into<String>) -> Self {
        Self::NotParticipant {
            uid: uid.into(),
            resource: resource.into(),
        }
    }

    /// Creates a new malformed document error.
    #[must_use]
    pub fn malformed(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::MalformedDocument {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Creates a new invalid claim error.
    #[must_use]
    pub fn invalid_claim(reason: impl Into<String>) -> Self {
        Self::InvalidClaim {
            reason: reason.into(),
        }
    }

    /// Creates a new store error.
    #[must_use]
    pub fn store(operation: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Store {
            operation: operation.into(),
            reason: reason.into(),
        }
    }

    /// Returns the kind code of this error.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidPrincipal { .. } => ErrorKind::InvalidPrincipal,
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::OwnershipViolation { .. } => ErrorKind::OwnershipViolation,
            Self::NotParticipant { .. } => ErrorKind::NotParticipant,
            Self::MalformedDocument { .. } => ErrorKind::MalformedDocument,
            Self::InvalidClaim { .. } => ErrorKind::InvalidClaim,
            Self::Store { .. } => ErrorKind::Store,
        }
    }

    /// Returns true if the error should be shown to end users as "access denied".
    #[must_use]
    pub const fn is_access_denied(&self) -> bool {
        matches!(
            self,
            Self::InvalidPrincipal { .. }
                | Self::OwnershipViolation { .. }
                | Self::NotParticipant { .. }
                | Self::InvalidClaim { .. }
        )
    }

    /// Returns true if the error should be shown to end users as "not found".
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Returns true if the error is an isolation violation worth auditing.
    #[must_use]
    pub const fn is_violation(&self) -> bool {
        matches!(
            self,
            Self::OwnershipViolation { .. } | Self::NotParticipant { .. }
        )
    }
}

/// A specialized Result type for isolation operations.
pub type Result<T> = std::result::Result<T, IsolationError>;
