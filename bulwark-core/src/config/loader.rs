//! Configuration loader supporting YAML, TOML and JSON.

use super::traits::{Configurable, Validatable};
use crate::error::ConfigError;
use serde::de::DeserializeOwned;
use std::path::Path;
use tracing::debug;

/// Supported configuration file formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConfigFormat {
    /// YAML format (.yaml, .yml)
    #[default]
    Yaml,
    /// TOML format (.toml)
    Toml,
    /// JSON format (.json)
    Json,
}

impl ConfigFormat {
    /// Detects the format from a file extension.
    #[must_use]
    pub fn from_path(path: &Path) -> Option<Self> {
        path.extension()
            .and_then(|ext| ext.to_str())
            .and_then(|ext| match ext.to_lowercase().as_str() {
                "yaml" | "yml" => Some(Self::Yaml),
                "toml" => Some(Self::Toml),
                "json" => Some(Self::Json),
                _ => None,
            })
    }

    /// Returns the file extension for this format.
    #[must_use]
    pub const fn extension(&self) -> &'static str {
        match self {
            Self::Yaml => "yaml",
            Self::Toml => "toml",
            Self::Json => "json",
        }
    }
}

/// Configuration loader with format detection, environment overrides and
/// validation.
#[derive(Debug, Clone)]
pub struct ConfigLoader {
    env_prefix: Option<String>,
    validate: bool,
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigLoader {
    /// Creates a loader that validates but applies no environment overrides.
    #[must_use]
    pub fn new() -> Self {
        Self {
            env_prefix: None,
            validate: true,
        }
    }

    /// Sets the environment variable prefix for overrides.
    #[must_use]
    pub fn with_env_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.env_prefix = Some(prefix.into());
        self
    }

    /// Sets whether [`load_config`](Self::load_config) validates. Default is `true`.
    #[must_use]
    pub fn with_validation(mut self, validate: bool) -> Self {
        self.validate = validate;
        self
    }

    /// Returns the environment variable prefix, if set.
    #[must_use]
    pub fn env_prefix(&self) -> Option<&str> {
        self.env_prefix.as_deref()
    }

    /// Loads a configuration file, applies environment overrides and validates.
    pub fn load_config<T, P>(&self, path: P) -> Result<T, ConfigError>
    where
        T: DeserializeOwned + Configurable + Validatable,
        P: AsRef<Path>,
    {
        let config = self.load_file(path)?;
        self.finish(config)
    }

    /// Applies environment overrides and validation to an already-built value.
    pub fn finish<T>(&self, mut config: T) -> Result<T, ConfigError>
    where
        T: Configurable + Validatable,
    {
        if let Some(prefix) = &self.env_prefix {
            config.apply_env_overrides(prefix)?;
        }
        if self.validate {
            config.validate()?;
        }
        Ok(config)
    }

    /// Loads configuration from a file, detecting the format from its extension.
    pub fn load_file<T, P>(&self, path: P) -> Result<T, ConfigError>
    where
        T: DeserializeOwned,
        P: AsRef<Path>,
    {
        let path = path.as_ref();
        let format = ConfigFormat::from_path(path).ok_or_else(|| ConfigError::InvalidFormat {
            path: path.display().to_string(),
            reason: "Unrecognized file extension. Supported: .yaml, .yml, .toml, .json".to_string(),
        })?;

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::FileReadError {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;

        debug!(path = %path.display(), format = format.extension(), "Loading configuration");
        self.parse(&content, format, &path.display().to_string())
    }

    /// Loads configuration from a string with the specified format.
    pub fn load_str<T>(&self, content: &str, format: ConfigFormat) -> Result<T, ConfigError>
    where
        T: DeserializeOwned,
    {
        self.parse(content, format, "<string>")
    }

    #[allow(clippy::unused_self)]
    fn parse<T>(&self, content: &str, format: ConfigFormat, origin: &str) -> Result<T, ConfigError>
    where
        T: DeserializeOwned,
    {
        let invalid = |kind: &str, e: &dyn std::fmt::Display| ConfigError::InvalidFormat {
            path: origin.to_string(),
            reason: format!("{kind} parse error: {e}"),
        };
        match format {
            ConfigFormat::Yaml => serde_yaml::from_str(content).map_err(|e| invalid("YAML", &e)),
            ConfigFormat::Toml => toml::from_str(content).map_err(|e| invalid("TOML", &e)),
            ConfigFormat::Json => serde_json::from_str(content).map_err(|e| invalid("JSON", &e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::IsolationConfig;
    use std::io::Write;

    #[test]
    fn test_format_detection() {
        assert_eq!(
            ConfigFormat::from_path(Path::new("bulwark.yml")),
            Some(ConfigFormat::Yaml)
        );
        assert_eq!(
            ConfigFormat::from_path(Path::new("bulwark.TOML")),
            Some(ConfigFormat::Toml)
        );
        assert_eq!(
            ConfigFormat::from_path(Path::new("bulwark.json")),
            Some(ConfigFormat::Json)
        );
        assert_eq!(ConfigFormat::from_path(Path::new("bulwark.ini")), None);
        assert_eq!(ConfigFormat::from_path(Path::new("bulwark")), None);
    }

    #[test]
    fn test_load_yaml_file() {
        let mut file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
        writeln!(
            file,
            "default_owner_field: ownerId\naudit:\n  collection: audit_trail\n"
        )
        .unwrap();

        let config: IsolationConfig = ConfigLoader::new().load_config(file.path()).unwrap();
        assert_eq!(config.default_owner_field, "ownerId");
        assert_eq!(config.audit.collection, "audit_trail");
        assert!(config.audit.enabled);
    }

    #[test]
    fn test_load_toml_str() {
        let toml = r#"
users_collection = "profiles"

[subscriptions]
on_violation = "terminate"
"#;
        let config: IsolationConfig = ConfigLoader::new()
            .load_str(toml, ConfigFormat::Toml)
            .unwrap();
        assert_eq!(config.users_collection, "profiles");
        assert_eq!(
            config.subscriptions.on_violation,
            crate::config::OnViolation::Terminate
        );
    }

    #[test]
    fn test_load_rejects_unknown_extension() {
        let file = tempfile::Builder::new().suffix(".ini").tempfile().unwrap();
        let err = ConfigLoader::new()
            .load_file::<IsolationConfig, _>(file.path())
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidFormat { .. }));
    }

    #[test]
    fn test_load_missing_file() {
        let err = ConfigLoader::new()
            .load_file::<IsolationConfig, _>("/nonexistent/bulwark.yaml")
            .unwrap_err();
        assert!(matches!(err, ConfigError::FileReadError { .. }));
    }

    #[test]
    fn test_load_config_validates() {
        let mut file = tempfile::Builder::new().suffix(".json").tempfile().unwrap();
        write!(file, r#"{{ "default_owner_field": "" }}"#).unwrap();

        let loader = ConfigLoader::new();
        assert!(loader.load_config::<IsolationConfig, _>(file.path()).is_err());

        let unchecked: IsolationConfig = loader
            .with_validation(false)
            .load_config(file.path())
            .unwrap();
        assert!(unchecked.default_owner_field.is_empty());
    }
}
