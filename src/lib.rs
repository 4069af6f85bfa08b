//! Module Host - runtime module lifecycle manager
//!
//! Loads independently built UI modules (script + style assets, or an in-process
//! render value), evaluates them once per name inside an optional sandbox, and
//! mounts / unmounts them into targets of a host application.
//!
//! ## Design Principles
//!
//! 1. **At-most-once loading**: concurrent loads of one module share one task
//! 2. **Shared styles**: stylesheets attach on first use and detach on last release
//! 3. **Pluggable collaborators**: script evaluation, sandbox engine and host output
//!    are traits; the crate ships defaults for each
//! 4. **Explicit state**: every manager instance owns its registry and caches

pub mod config;
pub mod module;
pub mod utils;

pub use config::{LoaderConfig, LoggingConfig, SandboxSettings};
pub use module::{
    ModuleDescriptor, ModuleError, ModuleExports, ModuleLoader, ModuleManager, MountTarget,
};
