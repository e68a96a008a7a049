//! Admin override resolution.
//!
//! Admin status is resolved fresh on every call. Two sources exist:
//! - [`ProfileAdminResolver`] reads a role marker or boolean flag from the
//!   principal's own profile document in the store.
//! - [`ClaimAdminResolver`] verifies an HS256 token issued by the identity
//!   provider; nothing written to the store can grant admin in this mode.

use crate::IsolationLayer;
use async_trait::async_trait;
use bulwark_core::config::{AdminConfig, ClaimsConfig};
use bulwark_core::document::DocumentPath;
use bulwark_core::error::{IsolationError, Result};
use bulwark_core::principal::Uid;
use bulwark_core::store::DocumentStore;
use jsonwebtoken::{Algorithm, DecodingKey, TokenData, Validation, decode};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, instrument, warn};

/// A principal together with the credential it presented, if any.
#[derive(Clone, PartialEq, Eq)]
pub struct Caller {
    uid: Uid,
    claim: Option<String>,
}

impl Caller {
    /// Creates a caller without a claim token.
    #[must_use]
    pub fn new(uid: Uid) -> Self {
        Self { uid, claim: None }
    }

    /// Attaches a signed claim token.
    #[must_use]
    pub fn with_claim(mut self, token: impl Into<String>) -> Self {
        self.claim = Some(token.into());
        self
    }

    /// Returns the principal.
    #[must_use]
    pub fn uid(&self) -> &Uid {
        &self.uid
    }

    /// Returns the claim token, if one was presented.
    #[must_use]
    pub fn claim(&self) -> Option<&str> {
        self.claim.as_deref()
    }
}

impl From<Uid> for Caller {
    fn from(uid: Uid) -> Self {
        Self::new(uid)
    }
}

impl From<&Uid> for Caller {
    fn from(uid: &Uid) -> Self {
        Self::new(uid.clone())
    }
}

impl fmt::Debug for Caller {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Caller")
            .field("uid", &self.uid)
            .field("claim", &self.claim.as_ref().map(|_| "<token>"))
            .finish()
    }
}

/// Decides whether a caller bypasses owner filtering.
#[async_trait]
pub trait AdminResolver: Send + Sync {
    /// Returns true if the caller is an administrator.
    async fn is_admin(&self, caller: &Caller) -> Result<bool>;
}

/// Resolves admin status from the principal's profile document.
pub struct ProfileAdminResolver {
    store: Arc<dyn DocumentStore>,
    users_collection: String,
    role_field: String,
    admin_role: String,
    flag_field: String,
}

impl ProfileAdminResolver {
    /// Creates a resolver reading profiles from `users_collection`.
    #[must_use]
    pub fn new(
        store: Arc<dyn DocumentStore>,
        users_collection: &str,
        config: &AdminConfig,
    ) -> Self {
        Self {
            store,
            users_collection: users_collection.to_string(),
            role_field: config.role_field.clone(),
            admin_role: config.admin_role.clone(),
            flag_field: config.flag_field.clone(),
        }
    }
}

#[async_trait]
impl AdminResolver for ProfileAdminResolver {
    async fn is_admin(&self, caller: &Caller) -> Result<bool> {
        // A uid containing '/' cannot name a profile document, so it has none.
        let users = self.users_collection.as_str();
        let Ok(path) = DocumentPath::new(users, caller.uid().as_str()) else {
            debug!(uid = %caller.uid(), "UID cannot address a profile, not an admin");
            return Ok(false);
        };
        let Some(profile) = self.store.get(&path).await? else {
            debug!(uid = %caller.uid(), "No profile document, not an admin");
            return Ok(false);
        };
        let by_role = profile
            .get(&self.role_field)
            .and_then(Value::as_str)
            .is_some_and(|role| role == self.admin_role);
        let by_flag = profile.get(&self.flag_field) == Some(&Value::Bool(true));
        Ok(by_role || by_flag)
    }
}

/// Claims carried by an admin token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdminClaims {
    /// Subject; must equal the caller's UID.
    pub sub: String,
    /// Expiration time (Unix timestamp).
    pub exp: i64,
    /// Role marker.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    /// Explicit admin flag.
    #[serde(default)]
    pub admin: bool,
    /// Issuer.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iss: Option<String>,
    /// Audience.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aud: Option<String>,
}

/// Resolves admin status from a verified HS256 claim token.
///
/// A caller without a token is not an admin. A token that fails
/// verification, or that names another subject, is an error.
pub struct ClaimAdminResolver {
    key: DecodingKey,
    validation: Validation,
    admin_role: String,
}

impl ClaimAdminResolver {
    /// Creates a resolver from claim verification settings.
    #[must_use]
    pub fn new(claims: &ClaimsConfig, admin: &AdminConfig) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        if let Some(issuer) = &claims.issuer {
            validation.set_issuer(&[issuer]);
        }
        match &claims.audience {
            Some(audience) => validation.set_audience(&[audience]),
            None => validation.validate_aud = false,
        }
        Self {
            key: DecodingKey::from_secret(claims.secret.as_bytes()),
            validation,
            admin_role: admin.admin_role.clone(),
        }
    }

    /// Verifies a token and returns its claims.
    pub fn verify(&self, token: &str) -> Result<AdminClaims> {
        let data: TokenData<AdminClaims> = decode(token, &self.key, &self.validation)
            .map_err(|e| IsolationError::invalid_claim(e.to_string()))?;
        Ok(data.claims)
    }
}

#[async_trait]
impl AdminResolver for ClaimAdminResolver {
    async fn is_admin(&self, caller: &Caller) -> Result<bool> {
        let Some(token) = caller.claim() else {
            return Ok(false);
        };
        let claims = self.verify(token)?;
        if !caller.uid().matches(&claims.sub) {
            warn!(
                uid = %caller.uid(),
                subject = %claims.sub,
                "Admin claim presented for another subject"
            );
            return Err(IsolationError::invalid_claim(format!(
                "token subject '{}' does not match principal '{}'",
                claims.sub,
                caller.uid()
            )));
        }
        Ok(claims.admin || claims.role.as_deref() == Some(self.admin_role.as_str()))
    }
}

impl IsolationLayer {
    /// Returns true if the caller is an administrator.
    ///
    /// Resolved fresh on every call.
    #[instrument(skip(self, caller))]
    pub async fn is_admin(&self, caller: impl Into<Caller> + Send) -> Result<bool> {
        let caller = caller.into();
        let admin = self.admin_resolver().is_admin(&caller).await?;
        debug!(uid = %caller.uid(), admin, "Resolved admin status");
        Ok(admin)
    }
}
