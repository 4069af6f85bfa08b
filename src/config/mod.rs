//! Configuration management for module-host
//!
//! Handles configuration loading and validation for the lifecycle manager.

use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::module::registry::ModuleManifestEntry;
use crate::module::sandbox::{SandboxConfig, SandboxOptions};

/// Default sandbox applied when a caller does not pass one
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SandboxSettings {
    /// Isolate modules in the default engine
    #[serde(default)]
    pub enabled: bool,

    /// Give each sandbox its own global scope
    #[serde(default)]
    pub multi_mode: bool,
}

impl SandboxSettings {
    pub fn to_config(&self) -> SandboxConfig {
        if self.enabled {
            SandboxConfig::Default(SandboxOptions {
                multi_mode: self.multi_mode,
            })
        } else {
            SandboxConfig::Disabled
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log filter (e.g. "info", "module_host=debug"); RUST_LOG takes precedence
    #[serde(default)]
    pub filter: Option<String>,

    /// Emit JSON lines (requires the `json-logging` feature)
    #[serde(default)]
    pub json_format: bool,
}

/// Lifecycle manager configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoaderConfig {
    /// Default sandbox settings
    #[serde(default)]
    pub sandbox: SandboxSettings,

    /// Upper bound on a single module load, in seconds (unset = wait forever)
    #[serde(default)]
    pub load_timeout_secs: Option<u64>,

    /// Logging configuration
    #[serde(default)]
    pub logging: Option<LoggingConfig>,

    /// Modules registered at startup
    #[serde(default)]
    pub modules: Vec<ModuleManifestEntry>,
}

impl LoaderConfig {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {:?}", path))?;
        Self::from_toml_str(&contents)
    }

    /// Parse configuration from TOML
    pub fn from_toml_str(contents: &str) -> anyhow::Result<Self> {
        let config: LoaderConfig =
            toml::from_str(contents).context("Failed to parse loader config TOML")?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.load_timeout_secs == Some(0) {
            return Err(anyhow::anyhow!(
                "load_timeout_secs must be greater than 0 (omit it to disable the timeout)"
            ));
        }

        crate::module::registry::ModuleManifest {
            modules: self.modules.clone(),
        }
        .validate()?;

        Ok(())
    }

    pub fn load_timeout(&self) -> Option<Duration> {
        self.load_timeout_secs.map(Duration::from_secs)
    }
}
