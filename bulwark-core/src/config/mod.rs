//! Configuration management.
//!
//! Configuration files may be YAML, TOML or JSON; the format is picked from
//! the file extension. Values can then be overridden from `BULWARK_*`
//! environment variables and are validated before use.
//!
//! # Example
//!
//! ```rust,ignore
//! use bulwark_core::config::{ConfigLoader, IsolationConfig};
//!
//! let config: IsolationConfig = ConfigLoader::new()
//!     .with_env_prefix("BULWARK")
//!     .load_config("bulwark.yaml")?;
//! ```

mod isolation_config;
mod loader;
mod traits;

pub use isolation_config::{
    AdminConfig, AdminSource, AuditConfig, ClaimsConfig, IsolationConfig, OnViolation,
    SubscriptionConfig,
};
pub use loader::{ConfigFormat, ConfigLoader};
pub use traits::{Configurable, EnvOverride, Validatable};
