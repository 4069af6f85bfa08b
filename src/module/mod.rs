//! Module system for module-host
//!
//! Composes independently built UI modules into a host at runtime.
//!
//! ## Architecture
//!
//! - **Asset classification**: a module's locators split into scripts and styles
//! - **Execution cache**: scripts are fetched and evaluated once per module name
//! - **Sandboxing**: each runtime entry owns its sandbox and clears it on unmount
//! - **Shared styles**: stylesheets are reference counted across modules
//! - **Lifecycle manager**: load / mount / unmount / reset with per-name dedup

pub mod assets;
pub mod host;
pub mod loader;
pub mod manager;
pub mod registry;
pub mod sandbox;
pub mod traits;

pub use assets::{classify, AssetUrls, ClassifiedAssets, StyleRefCounter};
pub use host::MemoryHost;
pub use loader::ModuleLoader;
pub use manager::{LoadedModule, ModuleManager};
pub use registry::{ModuleDescriptor, ModuleManifest, ModuleRegistry};
pub use sandbox::{SandboxAdapter, SandboxConfig, SandboxOptions, ScopedSandbox, ScopedSandboxEngine};
pub use traits::{
    Component, ComponentHandle, ExecutionCache, ExecutionTask, HostAttachment, ModuleError,
    ModuleExports, ModuleState, MountFn, MountTarget, Props, Sandbox, SandboxEngine,
    SandboxFactory, ScriptEvaluator, UnmountFn,
};
