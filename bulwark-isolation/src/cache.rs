//! Cache key namespacing.
//!
//! Keys have the form `resource:uid:param1:param2...`, so an entry cached
//! for one principal can never be looked up by another. The uid segment is
//! escaped (`%` as `%25`, `:` as `%3A`) so a uid containing `:` cannot
//! borrow another principal's prefix. Entries also remember their owner,
//! and every access through [`IsolatedCache`] checks it.

use std::borrow::Cow;

use bulwark_core::error::{IsolationError, Result};
use bulwark_core::principal::Uid;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tracing::{debug, warn};

fn uid_segment(uid: &Uid) -> Cow<'_, str> {
    let raw = uid.as_str();
    if raw.contains([':', '%']) {
        Cow::Owned(raw.replace('%', "%25").replace(':', "%3A"))
    } else {
        Cow::Borrowed(raw)
    }
}

fn foreign_entry(uid: &Uid, key: &str) -> IsolationError {
    warn!(uid = %uid, key, "Cache entry belongs to another principal");
    IsolationError::ownership_violation(uid.as_str(), format!("cache:{key}"))
}

/// Builds the cache key for `resource` scoped to `uid`.
///
/// ```
/// use bulwark_core::principal::Uid;
/// use bulwark_isolation::cache::isolated_cache_key;
///
/// let uid = Uid::parse(Some("alice")).unwrap();
/// assert_eq!(isolated_cache_key("projects", &uid, &["page", "2"]), "projects:alice:page:2");
/// assert_eq!(isolated_cache_key("projects", &uid, &[]), "projects:alice:");
///
/// let team = Uid::parse(Some("org:team")).unwrap();
/// assert_eq!(isolated_cache_key("projects", &team, &["all"]), "projects:org%3Ateam:all");
/// ```
#[must_use]
pub fn isolated_cache_key(resource: &str, uid: &Uid, params: &[&str]) -> String {
    format!("{resource}:{}:{}", uid_segment(uid), params.join(":"))
}

/// Checks that `key` is namespaced to `uid`.
pub fn validate_cache_key(key: &str, uid: &Uid) -> Result<()> {
    let scoped = key
        .split_once(':')
        .is_some_and(|(resource, rest)| {
            !resource.is_empty()
                && rest
                    .strip_prefix(uid_segment(uid).as_ref())
                    .is_some_and(|tail| tail.starts_with(':'))
        });
    if scoped {
        Ok(())
    } else {
        warn!(uid = %uid, key, "Cache key not namespaced to principal");
        Err(IsolationError::ownership_violation(
            uid.as_str(),
            format!("cache:{key}"),
        ))
    }
}

/// Concurrent cache whose entries are always keyed by principal.
#[derive(Debug)]
pub struct IsolatedCache<V> {
    entries: DashMap<String, (Uid, V)>,
}

impl<V> Default for IsolatedCache<V> {
    fn default() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }
}

impl<V: Clone> IsolatedCache<V> {
    /// Creates an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores a value for `uid`, returning the previous one.
    ///
    /// An entry already held by another principal under the same key is
    /// left untouched and the write is rejected.
    pub fn insert(
        &self,
        resource: &str,
        uid: &Uid,
        params: &[&str],
        value: V,
    ) -> Result<Option<V>> {
        let key = isolated_cache_key(resource, uid, params);
        match self.entries.entry(key) {
            Entry::Occupied(entry) if entry.get().0 != *uid => Err(foreign_entry(uid, entry.key())),
            Entry::Occupied(mut entry) => Ok(Some(entry.insert((uid.clone(), value)).1)),
            Entry::Vacant(entry) => {
                entry.insert((uid.clone(), value));
                Ok(None)
            }
        }
    }

    /// Returns the value cached for `uid`.
    pub fn get(&self, resource: &str, uid: &Uid, params: &[&str]) -> Result<Option<V>> {
        let key = isolated_cache_key(resource, uid, params);
        self.read(&key, uid)
    }

    fn read(&self, key: &str, uid: &Uid) -> Result<Option<V>> {
        match self.entries.get(key) {
            Some(entry) if entry.value().0 != *uid => Err(foreign_entry(uid, key)),
            Some(entry) => Ok(Some(entry.value().1.clone())),
            None => Ok(None),
        }
    }

    /// Looks up a raw key on behalf of `uid`.
    ///
    /// Keys not namespaced to `uid` are rejected, and so are entries stored
    /// for another principal.
    pub fn get_key(&self, key: &str, uid: &Uid) -> Result<Option<V>> {
        validate_cache_key(key, uid)?;
        self.read(key, uid)
    }

    /// Removes every entry belonging to `uid` and returns how many were removed.
    pub fn clear_user(&self, uid: &Uid) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, (owner, _)| owner != uid);
        let removed = before.saturating_sub(self.entries.len());
        debug!(uid = %uid, removed, "Cleared user cache");
        removed
    }

    /// Returns the number of cached entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if the cache is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
