//! Isolation layer configuration.

use super::traits::{Configurable, EnvOverride, Validatable};
use crate::document::validate_collection_path;
use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Top-level configuration of an isolation layer.
///
/// Every field has a default, so an empty file is a valid configuration.
///
/// ```
/// use bulwark_core::config::{IsolationConfig, Validatable};
///
/// let config = IsolationConfig::default();
/// assert_eq!(config.default_owner_field, "userId");
/// assert_eq!(config.audit.collection, "security_logs");
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IsolationConfig {
    /// Owner field used when an operation does not name one.
    pub default_owner_field: String,

    /// Collection holding principal profile documents, keyed by UID.
    pub users_collection: String,

    /// Report a foreign document as absent from `get` instead of raising
    /// an ownership violation. The breach record is written either way.
    pub conceal_foreign_documents: bool,

    /// Breach logging.
    pub audit: AuditConfig,

    /// Admin override resolution.
    pub admin: AdminConfig,

    /// Live subscriptions.
    pub subscriptions: SubscriptionConfig,
}

impl Default for IsolationConfig {
    fn default() -> Self {
        Self {
            default_owner_field: "userId".to_string(),
            users_collection: "users".to_string(),
            conceal_foreign_documents: false,
            audit: AuditConfig::default(),
            admin: AdminConfig::default(),
            subscriptions: SubscriptionConfig::default(),
        }
    }
}

/// Breach log configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuditConfig {
    /// Whether violation records are written at all.
    pub enabled: bool,

    /// Audit collection receiving violation records.
    pub collection: String,

    /// HMAC key used to sign records. Unsigned when absent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signing_key: Option<String>,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            collection: "security_logs".to_string(),
            signing_key: None,
        }
    }
}

/// Where admin status comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdminSource {
    /// Role marker on the principal's own profile document.
    #[default]
    Profile,
    /// Signed claim token issued by the identity provider.
    Claims,
}

impl fmt::Display for AdminSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Profile => f.write_str("profile"),
            Self::Claims => f.write_str("claims"),
        }
    }
}

impl FromStr for AdminSource {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "profile" => Ok(Self::Profile),
            "claims" => Ok(Self::Claims),
            other => Err(format!("unknown admin source '{other}', expected profile or claims")),
        }
    }
}

/// Admin override configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdminConfig {
    /// Source of admin status.
    pub source: AdminSource,

    /// Profile field holding the role marker.
    pub role_field: String,

    /// Role marker value granting admin.
    pub admin_role: String,

    /// Profile field holding an explicit boolean admin flag.
    pub flag_field: String,

    /// Claim verification settings, required when `source` is `claims`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub claims: Option<ClaimsConfig>,
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            source: AdminSource::Profile,
            role_field: "role".to_string(),
            admin_role: "admin".to_string(),
            flag_field: "isAdmin".to_string(),
            claims: None,
        }
    }
}

/// Verification settings for HS256 admin claim tokens.
#[derive(Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ClaimsConfig {
    /// Shared HMAC secret.
    pub secret: String,

    /// Required `iss` claim.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub issuer: Option<String>,

    /// Required `aud` claim.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audience: Option<String>,
}

impl fmt::Debug for ClaimsConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClaimsConfig")
            .field("secret", &"<redacted>")
            .field("issuer", &self.issuer)
            .field("audience", &self.audience)
            .finish()
    }
}

/// What a subscription does when a delivered record fails re-verification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OnViolation {
    /// Drop the record, log the breach and keep the feed open.
    #[default]
    Drop,
    /// Deliver the violation to the callback and end the feed.
    Terminate,
}

impl FromStr for OnViolation {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "drop" => Ok(Self::Drop),
            "terminate" => Ok(Self::Terminate),
            other => Err(format!("unknown violation policy '{other}', expected drop or terminate")),
        }
    }
}

/// Subscription configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SubscriptionConfig {
    /// Default violation policy for new subscriptions.
    pub on_violation: OnViolation,
}

fn require_non_empty(value: &str, field: &str) -> Result<(), ConfigError> {
    if value.trim().is_empty() {
        return Err(ConfigError::invalid_value(field, "must not be empty"));
    }
    Ok(())
}

fn require_collection(value: &str, field: &str) -> Result<(), ConfigError> {
    require_non_empty(value, field)?;
    validate_collection_path(value).map_err(|e| ConfigError::invalid_value(field, e.to_string()))
}

impl Validatable for IsolationConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        require_non_empty(&self.default_owner_field, "default_owner_field")?;
        require_collection(&self.users_collection, "users_collection")?;
        self.audit.validate()?;
        self.admin.validate()
    }
}

impl Validatable for AuditConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        require_collection(&self.collection, "audit.collection")?;
        if let Some(key) = &self.signing_key {
            require_non_empty(key, "audit.signing_key")?;
        }
        Ok(())
    }
}

impl Validatable for AdminConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        require_non_empty(&self.role_field, "admin.role_field")?;
        require_non_empty(&self.admin_role, "admin.admin_role")?;
        require_non_empty(&self.flag_field, "admin.flag_field")?;
        if self.source == AdminSource::Claims {
            match &self.claims {
                None => return Err(ConfigError::missing_field_in_section("claims", "admin")),
                Some(claims) if claims.secret.is_empty() => {
                    return Err(ConfigError::missing_field_in_section("secret", "admin.claims"));
                }
                Some(_) => {}
            }
        }
        Ok(())
    }
}

impl Configurable for IsolationConfig {
    fn apply_overrides_from(
        &mut self,
        prefix: &str,
        lookup: &dyn Fn(&str) -> Option<String>,
    ) -> Result<(), ConfigError> {
        EnvOverride::apply_string(
            lookup,
            &format!("{prefix}_DEFAULT_OWNER_FIELD"),
            &mut self.default_owner_field,
        );
        EnvOverride::apply_string(
            lookup,
            &format!("{prefix}_USERS_COLLECTION"),
            &mut self.users_collection,
        );
        EnvOverride::apply_bool(
            lookup,
            &format!("{prefix}_CONCEAL_FOREIGN_DOCUMENTS"),
            &mut self.conceal_foreign_documents,
        )?;

        EnvOverride::apply_bool(
            lookup,
            &format!("{prefix}_AUDIT_ENABLED"),
            &mut self.audit.enabled,
        )?;
        EnvOverride::apply_string(
            lookup,
            &format!("{prefix}_AUDIT_COLLECTION"),
            &mut self.audit.collection,
        );
        EnvOverride::apply_optional_string(
            lookup,
            &format!("{prefix}_AUDIT_SIGNING_KEY"),
            &mut self.audit.signing_key,
        );

        EnvOverride::apply_parsed(
            lookup,
            &format!("{prefix}_ADMIN_SOURCE"),
            &mut self.admin.source,
        )?;
        if let Some(secret) = lookup(&format!("{prefix}_ADMIN_CLAIMS_SECRET")) {
            self.admin.claims.get_or_insert_with(ClaimsConfig::default).secret = secret;
        }

        EnvOverride::apply_parsed(
            lookup,
            &format!("{prefix}_SUBSCRIPTIONS_ON_VIOLATION"),
            &mut self.subscriptions.on_violation,
        )
    }

    fn env_var_names(prefix: &str) -> Vec<String> {
        [
            "DEFAULT_OWNER_FIELD",
            "USERS_COLLECTION",
            "CONCEAL_FOREIGN_DOCUMENTS",
            "AUDIT_ENABLED",
            "AUDIT_COLLECTION",
            "AUDIT_SIGNING_KEY",
            "ADMIN_SOURCE",
            "ADMIN_CLAIMS_SECRET",
            "SUBSCRIPTIONS_ON_VIOLATION",
        ]
        .iter()
        .map(|name| format!("{prefix}_{name}"))
        .collect()
    }
}
