//! Module execution cache
//!
//! Fetches and evaluates a module's executable assets once per module name.

pub mod loader;

pub use loader::ModuleLoader;
