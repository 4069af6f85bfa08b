//! Module registry
//!
//! Declarative module descriptors, TOML manifests and the registered list.

pub mod descriptor;
pub mod manifest;
pub mod registry;

pub use descriptor::ModuleDescriptor;
pub use manifest::{ModuleManifest, ModuleManifestEntry};
pub use registry::ModuleRegistry;
