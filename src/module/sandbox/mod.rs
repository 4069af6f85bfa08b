//! Execution sandbox adapter
//!
//! Resolves a caller's sandbox configuration into a sandbox instance owned by a
//! single runtime entry.

pub mod adapter;
pub mod scoped;

pub use adapter::{SandboxAdapter, SandboxConfig, SandboxOptions};
pub use scoped::{ScopedSandbox, ScopedSandboxEngine};
