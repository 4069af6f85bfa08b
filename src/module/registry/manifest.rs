//! Module manifest parsing and validation
//!
//! Module lists can be declared in TOML:
//!
//! ```toml
//! [[modules]]
//! name = "header"
//! url = ["https://cdn.example.com/header/index.js", "https://cdn.example.com/header/index.css"]
//!
//! [[modules]]
//! name = "footer"
//! url = "https://cdn.example.com/footer/index.js"
//! ```

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;

use crate::module::assets::AssetUrls;
use crate::module::registry::descriptor::ModuleDescriptor;
use crate::module::traits::ModuleError;

/// One `[[modules]]` entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleManifestEntry {
    /// Module name
    pub name: String,
    /// Script and style locators
    #[serde(default)]
    pub url: Option<AssetUrls>,
}

impl ModuleManifestEntry {
    pub fn to_descriptor(&self) -> ModuleDescriptor {
        let descriptor = ModuleDescriptor::new(self.name.clone());
        match &self.url {
            Some(url) => descriptor.with_url(url.clone()),
            None => descriptor,
        }
    }
}

/// Module list manifest
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleManifest {
    #[serde(default)]
    pub modules: Vec<ModuleManifestEntry>,
}

impl ModuleManifest {
    /// Load manifest from file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ModuleError> {
        let contents = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            ModuleError::InvalidManifest(format!("Failed to read manifest file: {}", e))
        })?;
        Self::from_toml_str(&contents)
    }

    /// Parse and validate a manifest
    pub fn from_toml_str(contents: &str) -> Result<Self, ModuleError> {
        let manifest: ModuleManifest = toml::from_str(contents).map_err(|e| {
            ModuleError::InvalidManifest(format!("Failed to parse manifest TOML: {}", e))
        })?;
        manifest.validate()?;
        Ok(manifest)
    }

    /// Names must be present and unique
    pub fn validate(&self) -> Result<(), ModuleError> {
        let mut seen = HashSet::new();
        for entry in &self.modules {
            if entry.name.is_empty() {
                return Err(ModuleError::InvalidManifest(
                    "Module name cannot be empty".to_string(),
                ));
            }
            if !seen.insert(entry.name.as_str()) {
                return Err(ModuleError::InvalidManifest(format!(
                    "Duplicate module name: {}",
                    entry.name
                )));
            }
        }
        Ok(())
    }

    pub fn to_descriptors(&self) -> Vec<ModuleDescriptor> {
        self.modules.iter().map(ModuleManifestEntry::to_descriptor).collect()
    }
}
