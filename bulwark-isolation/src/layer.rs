//! The isolation layer handle.

use crate::admin::{AdminResolver, ClaimAdminResolver, ProfileAdminResolver};
use crate::breach::BreachLogger;
use bulwark_core::config::{AdminSource, IsolationConfig, Validatable};
use bulwark_core::error::{ConfigError, IsolationError};
use bulwark_core::principal::Uid;
use bulwark_core::store::DocumentStore;
use std::fmt;
use std::sync::Arc;
use tracing::{info, warn};

/// Trust-enforcing client of a [`DocumentStore`].
///
/// The store is injected, never reached through a global, so several layers
/// with different configurations may share one store. Cloning is cheap and
/// every clone enforces the same configuration.
#[derive(Clone)]
pub struct IsolationLayer {
    store: Arc<dyn DocumentStore>,
    config: Arc<IsolationConfig>,
    breach: BreachLogger,
    admin: Arc<dyn AdminResolver>,
}

impl IsolationLayer {
    /// Creates a layer over `store` after validating `config`.
    pub fn new(
        store: Arc<dyn DocumentStore>,
        config: IsolationConfig,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        let admin: Arc<dyn AdminResolver> = match config.admin.source {
            AdminSource::Profile => Arc::new(ProfileAdminResolver::new(
                Arc::clone(&store),
                &config.users_collection,
                &config.admin,
            )),
            AdminSource::Claims => {
                let claims = config
                    .admin
                    .claims
                    .as_ref()
                    .ok_or_else(|| ConfigError::missing_field_in_section("claims", "admin"))?;
                Arc::new(ClaimAdminResolver::new(claims, &config.admin))
            }
        };
        info!(
            admin_source = %config.admin.source,
            audit = config.audit.enabled,
            signed = config.audit.signing_key.is_some(),
            "Isolation layer initialized"
        );
        Ok(Self::assemble(store, config, admin))
    }

    /// Creates a layer with the default configuration.
    #[must_use]
    pub fn with_defaults(store: Arc<dyn DocumentStore>) -> Self {
        let config = IsolationConfig::default();
        let admin = Arc::new(ProfileAdminResolver::new(
            Arc::clone(&store),
            &config.users_collection,
            &config.admin,
        ));
        Self::assemble(store, config, admin)
    }

    fn assemble(
        store: Arc<dyn DocumentStore>,
        config: IsolationConfig,
        admin: Arc<dyn AdminResolver>,
    ) -> Self {
        let breach = BreachLogger::new(Arc::clone(&store), &config.audit);
        Self {
            store,
            config: Arc::new(config),
            breach,
            admin,
        }
    }

    /// Replaces the admin resolver.
    #[must_use]
    pub fn with_admin_resolver(mut self, resolver: Arc<dyn AdminResolver>) -> Self {
        self.admin = resolver;
        self
    }

    /// Returns the underlying store.
    #[must_use]
    pub fn store(&self) -> &Arc<dyn DocumentStore> {
        &self.store
    }

    /// Returns the active configuration.
    #[must_use]
    pub fn config(&self) -> &IsolationConfig {
        &self.config
    }

    /// Returns the breach logger.
    #[must_use]
    pub fn breach_logger(&self) -> &BreachLogger {
        &self.breach
    }

    pub(crate) fn admin_resolver(&self) -> &Arc<dyn AdminResolver> {
        &self.admin
    }

    pub(crate) fn owner_field<'a>(&'a self, owner_field: Option<&'a str>) -> &'a str {
        owner_field.unwrap_or(&self.config.default_owner_field)
    }

    /// Records a detected violation and hands the error back for raising.
    pub(crate) async fn reject(
        &self,
        uid: &Uid,
        resource: &str,
        error: IsolationError,
    ) -> IsolationError {
        warn!(uid = %uid, resource, kind = %error.kind(), "Isolation violation: {error}");
        self.breach.log(uid, resource, &error.to_string()).await;
        error
    }
}

impl fmt::Debug for IsolationLayer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IsolationLayer")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
