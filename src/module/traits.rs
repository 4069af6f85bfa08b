//! Module system traits and interfaces
//!
//! Defines the core value types that flow through the lifecycle manager and the
//! collaborator traits the manager drives: the execution cache, the sandbox
//! engine and the host attachment surface.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

use crate::module::sandbox::SandboxOptions;

/// Opaque, mount-capable value (a component, a render function, a view tree...)
///
/// The manager never inspects it; it only hands it to the resolved mount function.
pub type ComponentHandle = Arc<dyn Any + Send + Sync>;

/// Properties passed through to a module's mount function
pub type Props = serde_json::Value;

/// Mount function: `mount(component, target, props)`
pub type MountFn =
    Arc<dyn Fn(Component, &MountTarget, &Props) -> Result<(), ModuleError> + Send + Sync>;

/// Unmount function: `unmount(target)`
pub type UnmountFn = Arc<dyn Fn(&MountTarget) -> Result<(), ModuleError> + Send + Sync>;

/// Module lifecycle state as observed by the manager
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ModuleState {
    /// No runtime entry and no load in flight
    Unloaded,
    /// A load is in flight
    Loading,
    /// Exports are cached, nothing mounted
    Loaded,
    /// Mounted into this many targets
    Mounted(usize),
}

/// Attachment point in the host's rendered output
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MountTarget(String);

impl MountTarget {
    /// Create a target from its host identifier (element id, selector, slot name)
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MountTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for MountTarget {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

/// Evaluated module namespace
///
/// Produced by the execution cache for script modules, or derived from the
/// descriptor itself for modules that supply a render value directly.
#[derive(Clone, Default)]
pub struct ModuleExports {
    /// Default export slot
    pub default: Option<ComponentHandle>,
    /// Exported mount capability
    pub mount: Option<MountFn>,
    /// Exported unmount capability
    pub unmount: Option<UnmountFn>,
    /// Remaining named exports
    pub namespace: serde_json::Map<String, serde_json::Value>,
}

impl ModuleExports {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_default(mut self, component: ComponentHandle) -> Self {
        self.default = Some(component);
        self
    }

    pub fn with_mount(mut self, mount: MountFn) -> Self {
        self.mount = Some(mount);
        self
    }

    pub fn with_unmount(mut self, unmount: UnmountFn) -> Self {
        self.unmount = Some(unmount);
        self
    }

    pub fn with_export(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.namespace.insert(key.into(), value);
        self
    }
}

impl fmt::Debug for ModuleExports {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModuleExports")
            .field("default", &self.default.is_some())
            .field("mount", &self.mount.is_some())
            .field("unmount", &self.unmount.is_some())
            .field("namespace", &self.namespace)
            .finish()
    }
}

/// Component handed to a mount function, in resolution order
#[derive(Clone)]
pub enum Component {
    /// The module's default export
    Default(ComponentHandle),
    /// The descriptor's render value
    Render(ComponentHandle),
    /// The raw exports, when neither of the above exists
    Exports(Arc<ModuleExports>),
}

impl Component {
    /// Downcast the wrapped handle (not available for raw exports)
    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        match self {
            Component::Default(handle) | Component::Render(handle) => handle.downcast_ref::<T>(),
            Component::Exports(_) => None,
        }
    }

    /// Whether two components refer to the same underlying value
    pub fn same_as(&self, other: &Component) -> bool {
        match (self, other) {
            (Component::Default(a), Component::Default(b))
            | (Component::Render(a), Component::Render(b)) => Arc::ptr_eq(a, b),
            (Component::Exports(a), Component::Exports(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl fmt::Debug for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Component::Default(_) => f.write_str("Component::Default"),
            Component::Render(_) => f.write_str("Component::Render"),
            Component::Exports(exports) => f.debug_tuple("Component::Exports").field(exports).finish(),
        }
    }
}

/// One fetch+evaluate unit submitted to the execution cache
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionTask {
    /// Module name (dedup key)
    pub name: String,
    /// Executable asset locators, in evaluation order
    pub urls: Vec<String>,
}

/// Isolated evaluation context owned by a single runtime entry
///
/// Evaluators write module globals through the sandbox they receive instead of
/// the host scope. Sandboxes without a global scope keep the default methods,
/// which store nothing.
pub trait Sandbox: Send + Sync {
    /// Write a global visible to code evaluated in this sandbox
    fn set_global(&self, _key: &str, _value: serde_json::Value) {}

    /// Read a global as seen from inside this sandbox
    fn get_global(&self, _key: &str) -> Option<serde_json::Value> {
        None
    }

    /// Tear down the isolated state. Sandboxes without teardown keep the default no-op.
    fn clear(&self) {}
}

/// Caller-supplied sandbox constructor, invoked with no arguments
pub trait SandboxFactory: Send + Sync {
    fn construct(&self) -> Arc<dyn Sandbox>;
}

impl<F> SandboxFactory for F
where
    F: Fn() -> Arc<dyn Sandbox> + Send + Sync,
{
    fn construct(&self) -> Arc<dyn Sandbox> {
        self()
    }
}

/// Default isolation engine, constructed with an options object
pub trait SandboxEngine: Send + Sync {
    fn create(&self, options: &SandboxOptions) -> Arc<dyn Sandbox>;
}

/// Fetch + evaluate primitive behind the default execution cache
#[async_trait]
pub trait ScriptEvaluator: Send + Sync {
    /// Fetch and evaluate the task's scripts, optionally inside `sandbox`.
    ///
    /// `Ok(None)` means the scripts ran but produced no usable exports.
    async fn evaluate(
        &self,
        task: &ExecutionTask,
        sandbox: Option<Arc<dyn Sandbox>>,
    ) -> Result<Option<ModuleExports>, ModuleError>;
}

/// Module execution cache
///
/// Submitting the same task name twice before the first completes must return
/// the same pending result.
#[async_trait]
pub trait ExecutionCache: Send + Sync {
    async fn execute(
        &self,
        task: ExecutionTask,
        sandbox: Option<Arc<dyn Sandbox>>,
    ) -> Result<Option<Arc<ModuleExports>>, ModuleError>;

    /// Discard the pending or completed task for `name`; the next request starts over
    fn cancel(&self, name: &str);

    /// Cancel and discard every pending and completed task
    fn cancel_all(&self);
}

/// Host output surface used to attach and detach style resources
#[async_trait]
pub trait HostAttachment: Send + Sync {
    /// Insert a style node tagged with `module`.
    ///
    /// Resolves once the resource settles, even if it failed to load. Fails only
    /// when there is no root to attach to.
    async fn append_style(&self, module: &str, url: &str) -> Result<(), ModuleError>;

    /// Remove style nodes tagged with `module`, restricted to `removal` when given.
    ///
    /// Returns the number of nodes removed.
    async fn remove_styles(&self, module: &str, removal: Option<&[String]>) -> usize;
}

/// Module system errors
#[derive(Debug, Clone, Error)]
pub enum ModuleError {
    #[error("load or exec module failed: {0}")]
    LoadError(String),

    #[error("Style attachment failed: {0}")]
    AttachmentError(String),

    #[error("Module not found: {0}")]
    ModuleNotFound(String),

    #[error("Invalid module manifest: {0}")]
    InvalidManifest(String),

    #[error("Module load cancelled: {0}")]
    Cancelled(String),

    #[error("Timeout waiting for module {0} to load")]
    Timeout(String),

    #[error("Module operation failed: {0}")]
    OperationError(String),
}
