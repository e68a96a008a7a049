//! Per-principal storage namespaces.
//!
//! Data that belongs to exactly one principal lives under `users/{uid}`.
//! Resources shared between principals live in top-level collections and are
//! guarded by an owner field or a participant array instead.

use std::fmt;

use bulwark_core::error::{IsolationError, Result};
use bulwark_core::principal::Uid;

use crate::facade::chats::CHAT_ROOMS_COLLECTION;
use crate::facade::deals::DEALS_COLLECTION;
use crate::facade::projects::{FOUNDER_FIELD, PROJECTS_COLLECTION};
use crate::validate::PARTICIPANTS_FIELD;

/// Root of every per-principal namespace.
pub const USERS_ROOT: &str = "users";

/// A collection scoped to one principal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UserNamespace {
    /// The principal's profile document itself.
    Profile,
    /// Private projects.
    Projects,
    /// Private messages.
    Messages,
    /// Notifications.
    Notifications,
    /// Uploaded files.
    Files,
    /// Private chats.
    Chats,
    /// Private deals.
    Deals,
    /// Contacts.
    Contacts,
    /// Settings.
    Settings,
    /// Activity feed.
    Activities,
}

impl UserNamespace {
    /// Every namespace, profile first.
    pub const ALL: [Self; 10] = [
        Self::Profile,
        Self::Projects,
        Self::Messages,
        Self::Notifications,
        Self::Files,
        Self::Chats,
        Self::Deals,
        Self::Contacts,
        Self::Settings,
        Self::Activities,
    ];

    /// Path segment under `users/{uid}`, `None` for the profile.
    #[must_use]
    pub const fn segment(self) -> Option<&'static str> {
        match self {
            Self::Profile => None,
            Self::Projects => Some("projects"),
            Self::Messages => Some("messages"),
            Self::Notifications => Some("notifications"),
            Self::Files => Some("files"),
            Self::Chats => Some("chats"),
            Self::Deals => Some("deals"),
            Self::Contacts => Some("contacts"),
            Self::Settings => Some("settings"),
            Self::Activities => Some("activities"),
        }
    }

    /// Resolves the namespace for `uid`.
    ///
    /// ```
    /// use bulwark_core::principal::Uid;
    /// use bulwark_isolation::namespace::UserNamespace;
    ///
    /// let uid = Uid::parse(Some("alice")).unwrap();
    /// assert_eq!(UserNamespace::Profile.path(&uid).unwrap(), "users/alice");
    /// assert_eq!(UserNamespace::Notifications.path(&uid).unwrap(), "users/alice/notifications");
    /// ```
    pub fn path(self, uid: &Uid) -> Result<String> {
        let root = user_root(uid)?;
        Ok(match self.segment() {
            Some(segment) => format!("{root}/{segment}"),
            None => root,
        })
    }
}

impl fmt::Display for UserNamespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.segment().unwrap_or("profile"))
    }
}

/// Top-level collections shared between principals, with the field that
/// guards them.
pub const SHARED_COLLECTIONS: [(&str, &str); 3] = [
    (PROJECTS_COLLECTION, FOUNDER_FIELD),
    (CHAT_ROOMS_COLLECTION, PARTICIPANTS_FIELD),
    (DEALS_COLLECTION, PARTICIPANTS_FIELD),
];

/// `users/{uid}`, refusing a uid that would step outside its own prefix.
pub fn user_root(uid: &Uid) -> Result<String> {
    let raw = uid.as_str();
    if raw.contains('/') || raw == "." || raw.contains("..") {
        return Err(IsolationError::invalid_principal(
            "UID cannot be used as a storage prefix",
        ));
    }
    Ok(format!("{USERS_ROOT}/{raw}"))
}
