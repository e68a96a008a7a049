//! Configuration traits for validation and environment overrides.

use crate::error::ConfigError;
use std::str::FromStr;

/// Trait for types that can be validated.
///
/// ```rust
/// use bulwark_core::config::Validatable;
/// use bulwark_core::error::ConfigError;
///
/// struct AuditSettings {
///     collection: String,
/// }
///
/// impl Validatable for AuditSettings {
///     fn validate(&self) -> Result<(), ConfigError> {
///         if self.collection.is_empty() {
///             return Err(ConfigError::missing_field("collection"));
///         }
///         Ok(())
///     }
/// }
///
/// assert!(AuditSettings { collection: String::new() }.validate().is_err());
/// ```
pub trait Validatable {
    /// Validates the configuration.
    fn validate(&self) -> Result<(), ConfigError>;
}

/// Trait for types that support environment variable overrides.
pub trait Configurable: Sized {
    /// Applies overrides read from the process environment.
    ///
    /// # Arguments
    ///
    /// * `prefix` - The environment variable prefix (e.g., "BULWARK")
    fn apply_env_overrides(&mut self, prefix: &str) -> Result<(), ConfigError> {
        self.apply_overrides_from(prefix, &|name| std::env::var(name).ok())
    }

    /// Applies overrides read through `lookup`.
    ///
    /// `lookup` maps a variable name to its value, if set.
    fn apply_overrides_from(
        &mut self,
        prefix: &str,
        lookup: &dyn Fn(&str) -> Option<String>,
    ) -> Result<(), ConfigError>;

    /// Returns the environment variable names that can override this configuration.
    fn env_var_names(prefix: &str) -> Vec<String>;
}

/// Helpers that apply a single override to a configuration field.
pub struct EnvOverride;

impl EnvOverride {
    /// Overrides a string value.
    pub fn apply_string(lookup: &dyn Fn(&str) -> Option<String>, name: &str, target: &mut String) {
        if let Some(value) = lookup(name) {
            *target = value;
        }
    }

    /// Overrides an optional string value.
    pub fn apply_optional_string(
        lookup: &dyn Fn(&str) -> Option<String>,
        name: &str,
        target: &mut Option<String>,
    ) {
        if let Some(value) = lookup(name) {
            *target = Some(value);
        }
    }

    /// Overrides a boolean value. Accepts `true/false`, `1/0`, `yes/no`, `on/off`.
    pub fn apply_bool(
        lookup: &dyn Fn(&str) -> Option<String>,
        name: &str,
        target: &mut bool,
    ) -> Result<(), ConfigError> {
        let Some(value) = lookup(name) else {
            return Ok(());
        };
        match value.to_lowercase().as_str() {
            "true" | "1" | "yes" | "on" => *target = true,
            "false" | "0" | "no" | "off" => *target = false,
            _ => {
                return Err(ConfigError::InvalidEnvVar {
                    name: name.to_string(),
                    reason: format!("expected a boolean, got '{value}'"),
                });
            }
        }
        Ok(())
    }

    /// Overrides any value implementing [`FromStr`].
    pub fn apply_parsed<T>(
        lookup: &dyn Fn(&str) -> Option<String>,
        name: &str,
        target: &mut T,
    ) -> Result<(), ConfigError>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        if let Some(value) = lookup(name) {
            *target = value.parse().map_err(|e: T::Err| ConfigError::InvalidEnvVar {
                name: name.to_string(),
                reason: e.to_string(),
            })?;
        }
        Ok(())
    }
}
