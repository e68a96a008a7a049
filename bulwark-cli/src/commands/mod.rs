//! Command implementations and shared setup.

pub mod audit;
pub mod health;
pub mod list;

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use bulwark_core::config::{ConfigLoader, Configurable, EnvOverride, IsolationConfig, Validatable};
use bulwark_core::error::ConfigError;
use bulwark_core::principal::Uid;
use bulwark_core::store::MemoryStore;
use bulwark_isolation::IsolationLayer;
use bulwark_telemetry::logging::{LogConfig, LogFormat, LogOutput};

/// Environment variable prefix for configuration overrides.
pub const ENV_PREFIX: &str = "BULWARK";

/// Top-level configuration file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CliConfig {
    /// Isolation layer settings.
    pub isolation: IsolationConfig,
    /// Logging settings.
    pub logging: LogConfig,
}

impl Default for CliConfig {
    fn default() -> Self {
        Self {
            isolation: IsolationConfig::default(),
            logging: LogConfig {
                format: LogFormat::Pretty,
                outputs: vec![LogOutput::Stderr],
                ..LogConfig::default()
            },
        }
    }
}

impl CliConfig {
    /// Loads `path` if given, otherwise starts from defaults. Environment
    /// overrides and validation apply either way.
    pub fn load(path: Option<&str>) -> Result<Self> {
        let loader = ConfigLoader::new().with_env_prefix(ENV_PREFIX);
        let config = match path {
            Some(path) => loader
                .load_config(path)
                .with_context(|| format!("Failed to load configuration from {path}"))?,
            None => loader
                .finish(Self::default())
                .context("Invalid configuration")?,
        };
        Ok(config)
    }
}

impl Validatable for CliConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        self.isolation.validate()?;
        if self.logging.outputs.is_empty() {
            return Err(ConfigError::missing_field_in_section("outputs", "logging"));
        }
        Ok(())
    }
}

impl Configurable for CliConfig {
    fn apply_overrides_from(
        &mut self,
        prefix: &str,
        lookup: &dyn Fn(&str) -> Option<String>,
    ) -> Result<(), ConfigError> {
        self.isolation.apply_overrides_from(prefix, lookup)?;
        EnvOverride::apply_string(lookup, &format!("{prefix}_LOG_LEVEL"), &mut self.logging.level);
        Ok(())
    }

    fn env_var_names(prefix: &str) -> Vec<String> {
        let mut names = IsolationConfig::env_var_names(prefix);
        names.push(format!("{prefix}_LOG_LEVEL"));
        names
    }
}

/// Loads a `{ "collection/id": { ...fields } }` fixture into a fresh store.
pub fn load_fixture(path: &Path) -> Result<MemoryStore> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read fixture {}", path.display()))?;
    let fixture: Value = serde_json::from_str(&content).context("Failed to parse fixture JSON")?;
    let store = MemoryStore::from_fixture(&fixture).context("Invalid fixture")?;
    Ok(store)
}

/// Builds an isolation layer over the fixture at `path`.
pub fn open_layer(config: &CliConfig, path: &Path) -> Result<IsolationLayer> {
    let store = load_fixture(path)?;
    let layer = IsolationLayer::new(Arc::new(store), config.isolation.clone())
        .context("Failed to build isolation layer")?;
    Ok(layer)
}

/// Validates a principal given on the command line.
pub fn parse_uid(raw: &str) -> Result<Uid> {
    Uid::parse(Some(raw)).context("Invalid --uid")
}
