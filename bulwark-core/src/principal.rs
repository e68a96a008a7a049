//! Principal identifiers.
//!
//! A [`Uid`] is the opaque identifier of an already-authenticated caller.
//! Constructing one is the single chokepoint every isolation operation goes
//! through: a missing, non-string or blank identifier never becomes a `Uid`.

use crate::error::{IsolationError, Result};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

/// Validated principal identifier.
///
/// Any non-blank string is accepted. A uid containing `/` cannot address a
/// document of its own (such as a profile in the users collection), so
/// profile-based lookups treat it as having no profile.
///
/// ```
/// use bulwark_core::principal::Uid;
///
/// let uid = Uid::parse(Some("alice")).unwrap();
/// assert_eq!(uid.as_str(), "alice");
/// assert!(Uid::parse(None).is_err());
/// assert!(Uid::parse(Some("   ")).is_err());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct Uid(String);

impl Uid {
    /// Validates a candidate identifier.
    ///
    /// The value is kept verbatim; surrounding whitespace is only used to
    /// reject blank identifiers.
    pub fn parse(candidate: Option<&str>) -> Result<Self> {
        let Some(value) = candidate else {
            return Err(IsolationError::invalid_principal(
                "missing UID, authentication required",
            ));
        };
        if value.trim().is_empty() {
            return Err(IsolationError::invalid_principal(
                "empty UID, authentication required",
            ));
        }
        Ok(Self(value.to_string()))
    }

    /// Validates a candidate identifier taken from an untyped payload.
    pub fn from_value(candidate: Option<&Value>) -> Result<Self> {
        match candidate {
            None | Some(Value::Null) => Self::parse(None),
            Some(Value::String(s)) => Self::parse(Some(s)),
            Some(other) => Err(IsolationError::invalid_principal(format!(
                "UID must be a string, got {}",
                json_type_name(other)
            ))),
        }
    }

    /// Returns the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns true if `value` names this principal.
    #[must_use]
    pub fn matches(&self, value: &str) -> bool {
        self.0 == value
    }
}

impl fmt::Display for Uid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Uid {
    type Err = IsolationError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(Some(s))
    }
}

impl AsRef<str> for Uid {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl<'de> Deserialize<'de> for Uid {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        Self::parse(Some(&raw)).map_err(serde::de::Error::custom)
    }
}

/// Returns a short name for the JSON type of `value`.
pub(crate) const fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use serde_json::json;

    #[test]
    fn test_parse_valid() {
        let uid = Uid::parse(Some("alice")).unwrap();
        assert_eq!(uid.to_string(), "alice");
        assert!(uid.matches("alice"));
        assert!(!uid.matches("bob"));
    }

    #[test]
    fn test_parse_rejects_missing_and_blank() {
        for candidate in [None, Some(""), Some(" \t\n")] {
            let err = Uid::parse(candidate).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::InvalidPrincipal);
        }
    }

    #[test]
    fn test_from_value() {
        assert!(Uid::from_value(Some(&json!("bob"))).is_ok());
        assert!(Uid::from_value(Some(&Value::Null)).is_err());
        assert!(Uid::from_value(None).is_err());

        let err = Uid::from_value(Some(&json!(42))).unwrap_err();
        assert!(err.to_string().contains("number"));
    }

    #[test]
    fn test_deserialize_validates() {
        let uid: Uid = serde_json::from_str("\"carol\"").unwrap();
        assert_eq!(uid.as_str(), "carol");
        assert!(serde_json::from_str::<Uid>("\"\"").is_err());
    }
}
