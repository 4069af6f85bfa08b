//! Declarative module registry
//!
//! Holds the latest registered descriptor list. Registration replaces the list
//! wholesale.

use std::sync::{PoisonError, RwLock};
use tracing::{info, warn};

use crate::module::registry::descriptor::ModuleDescriptor;

/// Registered module descriptors
#[derive(Debug, Default)]
pub struct ModuleRegistry {
    modules: RwLock<Vec<ModuleDescriptor>>,
}

impl ModuleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the registered list
    pub fn register(&self, modules: Vec<ModuleDescriptor>) {
        for module in &modules {
            if !module.has_load_strategy() {
                warn!(
                    "url and render cannot both be empty. name: {}",
                    module.name
                );
            }
        }
        info!("Registered {} modules", modules.len());
        *self.modules.write().unwrap_or_else(PoisonError::into_inner) = modules;
    }

    /// Current list (empty when nothing is registered)
    pub fn modules(&self) -> Vec<ModuleDescriptor> {
        self.modules
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Look up a registered descriptor by name
    pub fn find(&self, name: &str) -> Option<ModuleDescriptor> {
        self.modules
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .find(|module| module.name == name)
            .cloned()
    }

    pub fn clear(&self) {
        self.modules
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}
