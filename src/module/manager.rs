//! Module manager for orchestrating all modules
//!
//! Handles the module lifecycle: load (deduplicated per name), mount, unmount and
//! global reset, together with shared style resources and sandbox teardown.

use futures::future::{try_join_all, BoxFuture, FutureExt, Shared};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::config::LoaderConfig;
use crate::module::assets::{classify, StyleRefCounter};
use crate::module::registry::{ModuleDescriptor, ModuleManifest, ModuleRegistry};
use crate::module::sandbox::{SandboxAdapter, SandboxConfig};
use crate::module::traits::{
    Component, ExecutionCache, ExecutionTask, HostAttachment, ModuleError, ModuleExports,
    ModuleState, MountFn, MountTarget, Props, Sandbox, UnmountFn,
};
use crate::utils::with_custom_timeout;

const LOAD_FAILED: &str = "load or exec module failed";

/// Resolved mount function and component of a loaded module
#[derive(Clone)]
pub struct LoadedModule {
    pub mount: MountFn,
    pub component: Component,
}

impl std::fmt::Debug for LoadedModule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoadedModule")
            .field("component", &self.component)
            .finish_non_exhaustive()
    }
}

/// Runtime entry of a loaded module
struct ModuleEntry {
    /// Correlates log lines of one load
    instance_id: Uuid,
    exports: Arc<ModuleExports>,
    /// Owned by this entry only
    sandbox: Option<Arc<dyn Sandbox>>,
    styles: Vec<String>,
}

type LoadFuture = Shared<BoxFuture<'static, Result<Arc<ModuleEntry>, ModuleError>>>;

struct PendingLoad {
    id: u64,
    future: LoadFuture,
}

#[derive(Default)]
struct ModuleTable {
    entries: HashMap<String, Arc<ModuleEntry>>,
    pending: HashMap<String, PendingLoad>,
    /// Live mounts per module
    mounted: HashMap<String, usize>,
    /// Successful loads per module whose style references are still held
    holds: HashMap<String, usize>,
}

/// Decrement a per-module counter, dropping it at zero.
///
/// Returns false when the module had nothing to decrement.
fn decrement(counts: &mut HashMap<String, usize>, name: &str) -> bool {
    match counts.get_mut(name) {
        Some(count) if *count > 1 => {
            *count -= 1;
            true
        }
        Some(_) => {
            counts.remove(name);
            true
        }
        None => false,
    }
}

/// Module manager coordinates all loaded modules
pub struct ModuleManager {
    /// Registered descriptors
    registry: ModuleRegistry,
    /// Runtime entries, in-flight loads and mount counts
    table: Arc<Mutex<ModuleTable>>,
    /// Shared style references
    styles: StyleRefCounter,
    /// Script fetch + evaluate
    cache: Arc<dyn ExecutionCache>,
    /// Host output surface
    host: Arc<dyn HostAttachment>,
    sandbox_adapter: SandboxAdapter,
    /// Sandbox used when a caller passes none
    default_sandbox: SandboxConfig,
    load_timeout: Option<Duration>,
    /// Bumped by `reset`; loads started under an older generation are discarded
    generation: Arc<AtomicU64>,
    next_load_id: AtomicU64,
}

impl ModuleManager {
    /// Create a new module manager
    pub fn new(cache: Arc<dyn ExecutionCache>, host: Arc<dyn HostAttachment>) -> Self {
        Self {
            registry: ModuleRegistry::new(),
            table: Arc::new(Mutex::new(ModuleTable::default())),
            styles: StyleRefCounter::new(),
            cache,
            host,
            sandbox_adapter: SandboxAdapter::new(),
            default_sandbox: SandboxConfig::Disabled,
            load_timeout: None,
            generation: Arc::new(AtomicU64::new(0)),
            next_load_id: AtomicU64::new(0),
        }
    }

    /// Create a module manager from configuration, registering the configured modules
    pub fn from_config(
        config: &LoaderConfig,
        cache: Arc<dyn ExecutionCache>,
        host: Arc<dyn HostAttachment>,
    ) -> Self {
        let manager = Self::new(cache, host)
            .with_default_sandbox(config.sandbox.to_config())
            .with_load_timeout(config.load_timeout());
        if !config.modules.is_empty() {
            manager.register_manifest(&ModuleManifest {
                modules: config.modules.clone(),
            });
        }
        manager
    }

    pub fn with_sandbox_adapter(mut self, adapter: SandboxAdapter) -> Self {
        self.sandbox_adapter = adapter;
        self
    }

    pub fn with_default_sandbox(mut self, sandbox: SandboxConfig) -> Self {
        self.default_sandbox = sandbox;
        self
    }

    pub fn with_load_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.load_timeout = timeout;
        self
    }

    /// Replace the registered module list
    pub fn register_modules(&self, modules: Vec<ModuleDescriptor>) {
        self.registry.register(modules);
    }

    /// Replace the registered module list with a manifest's modules
    pub fn register_manifest(&self, manifest: &ModuleManifest) {
        self.registry.register(manifest.to_descriptors());
    }

    /// Registered modules (empty when nothing is registered)
    pub fn get_modules(&self) -> Vec<ModuleDescriptor> {
        self.registry.modules()
    }

    /// Registered module by name
    pub fn find_module(&self, name: &str) -> Option<ModuleDescriptor> {
        self.registry.find(name)
    }

    /// Forget registered modules, runtime entries and style references, and
    /// cancel every execution task. Host output is left as is.
    pub async fn reset(&self) {
        info!("Resetting module manager");
        self.generation.fetch_add(1, Ordering::SeqCst);
        self.registry.clear();
        {
            let mut table = self.table.lock().await;
            table.entries.clear();
            table.pending.clear();
            table.mounted.clear();
            table.holds.clear();
        }
        self.styles.clear();
        self.cache.cancel_all();
    }

    /// Load a module and resolve its mount function and component
    pub async fn load(
        &self,
        descriptor: &ModuleDescriptor,
        sandbox: Option<SandboxConfig>,
    ) -> Result<LoadedModule, ModuleError> {
        let name = descriptor.name.as_str();
        let entry = self.resolve_entry(descriptor, sandbox).await.map_err(|e| {
            error!("Module {} failed to load: {}", name, e);
            e
        })?;

        let mount = resolve_mount(descriptor, &entry.exports);
        let component = resolve_component(descriptor, &entry.exports);

        // styles go in before the module mounts
        if !entry.styles.is_empty() {
            let attach = self.styles.acquire(name, &entry.styles);
            if !attach.is_empty() {
                debug!("Attaching {} styles for module {}", attach.len(), name);
                let attached =
                    try_join_all(attach.iter().map(|url| self.host.append_style(name, url))).await;
                if let Err(e) = attached {
                    warn!("Rolling back style references of module {}: {}", name, e);
                    self.detach_styles(name, &entry.styles).await;
                    return Err(e);
                }
            }
        }

        let mut table = self.table.lock().await;
        *table.holds.entry(descriptor.name.clone()).or_insert(0) += 1;
        Ok(LoadedModule { mount, component })
    }

    /// Load a module and mount it into `target`
    pub async fn mount(
        &self,
        descriptor: &ModuleDescriptor,
        target: &MountTarget,
        props: &Props,
        sandbox: Option<SandboxConfig>,
    ) -> Result<(), ModuleError> {
        let LoadedModule { mount, component } = self.load(descriptor, sandbox).await?;
        info!("Mounting module {} into {}", descriptor.name, target);
        if let Err(e) = mount(component, target, props) {
            if let Some(entry) = self.release_hold(&descriptor.name).await {
                self.detach_styles(&descriptor.name, &entry.styles).await;
            }
            return Err(e);
        }

        let mut table = self.table.lock().await;
        *table.mounted.entry(descriptor.name.clone()).or_insert(0) += 1;
        Ok(())
    }

    /// Mount a registered module by name
    pub async fn mount_by_name(
        &self,
        name: &str,
        target: &MountTarget,
        props: &Props,
        sandbox: Option<SandboxConfig>,
    ) -> Result<(), ModuleError> {
        let descriptor = self
            .find_module(name)
            .ok_or_else(|| ModuleError::ModuleNotFound(name.to_string()))?;
        self.mount(&descriptor, target, props, sandbox).await
    }

    /// Unmount a module from `target`
    ///
    /// Unmounting a module that was never loaded only runs the resolved unmount.
    pub async fn unmount(
        &self,
        descriptor: &ModuleDescriptor,
        target: &MountTarget,
    ) -> Result<(), ModuleError> {
        let name = descriptor.name.as_str();
        let entry = {
            let mut table = self.table.lock().await;
            decrement(&mut table.mounted, name);
            table.entries.get(name).cloned()
        };

        let unmount = resolve_unmount(descriptor, entry.as_ref().map(|e| e.exports.as_ref()));

        // styles and sandbox are only released for a load that still holds them
        if let Some(entry) = self.release_hold(name).await {
            debug!("Unmounting module {} (instance {})", name, entry.instance_id);
            self.detach_styles(name, &entry.styles).await;
            if let Some(sandbox) = &entry.sandbox {
                sandbox.clear();
            }
        } else if entry.is_some() {
            debug!("Module {} holds no style references, skipping teardown", name);
        }

        info!("Unmounting module {} from {}", name, target);
        unmount(target)
    }

    /// Current lifecycle state of a module
    pub async fn module_state(&self, name: &str) -> ModuleState {
        let table = self.table.lock().await;
        if table.pending.contains_key(name) {
            ModuleState::Loading
        } else if let Some(count) = table.mounted.get(name) {
            ModuleState::Mounted(*count)
        } else if table.entries.contains_key(name) {
            ModuleState::Loaded
        } else {
            ModuleState::Unloaded
        }
    }

    /// Names of modules with a runtime entry
    pub async fn loaded_modules(&self) -> Vec<String> {
        let table = self.table.lock().await;
        let mut names: Vec<String> = table.entries.keys().cloned().collect();
        names.sort();
        names
    }

    /// References currently held on a style locator
    pub fn style_ref_count(&self, url: &str) -> usize {
        self.styles.count(url)
    }

    /// Drop one hold taken by a successful `load`, returning the entry it covered
    async fn release_hold(&self, name: &str) -> Option<Arc<ModuleEntry>> {
        let mut table = self.table.lock().await;
        if decrement(&mut table.holds, name) {
            table.entries.get(name).cloned()
        } else {
            None
        }
    }

    async fn detach_styles(&self, name: &str, styles: &[String]) {
        let released = self.styles.release(name, styles);
        if released.is_empty() {
            return;
        }

        let mut by_owner: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for release in released {
            by_owner.entry(release.owner).or_default().push(release.url);
        }
        for (owner, urls) in by_owner {
            let removed = self.host.remove_styles(&owner, Some(&urls)).await;
            debug!("Detached {} style nodes of module {}", removed, owner);
        }
    }

    /// Return the cached entry, join the in-flight load, or start one
    async fn resolve_entry(
        &self,
        descriptor: &ModuleDescriptor,
        sandbox: Option<SandboxConfig>,
    ) -> Result<Arc<ModuleEntry>, ModuleError> {
        let future = {
            let mut table = self.table.lock().await;
            if let Some(entry) = table.entries.get(&descriptor.name) {
                return Ok(Arc::clone(entry));
            }
            match table.pending.get(&descriptor.name) {
                Some(pending) => {
                    debug!("Joining in-flight load of module {}", descriptor.name);
                    pending.future.clone()
                }
                None => {
                    let id = self.next_load_id.fetch_add(1, Ordering::SeqCst);
                    let sandbox = sandbox.unwrap_or_else(|| self.default_sandbox.clone());
                    let future = self.start_load(id, descriptor.clone(), sandbox);
                    table.pending.insert(
                        descriptor.name.clone(),
                        PendingLoad {
                            id,
                            future: future.clone(),
                        },
                    );
                    future
                }
            }
        };
        future.await
    }

    fn start_load(&self, id: u64, descriptor: ModuleDescriptor, sandbox: SandboxConfig) -> LoadFuture {
        let table = Arc::clone(&self.table);
        let cache = Arc::clone(&self.cache);
        let adapter = self.sandbox_adapter.clone();
        let generation = Arc::clone(&self.generation);
        let started = generation.load(Ordering::SeqCst);
        let timeout = self.load_timeout;

        info!("Loading module: {}", descriptor.name);
        async move {
            let result = build_entry(&descriptor, &sandbox, &adapter, cache.as_ref(), timeout).await;

            let mut table = table.lock().await;
            if table.pending.get(&descriptor.name).map(|p| p.id) == Some(id) {
                table.pending.remove(&descriptor.name);
            }
            if generation.load(Ordering::SeqCst) != started {
                warn!("Module {} finished loading after a reset, discarding", descriptor.name);
                return Err(ModuleError::Cancelled(descriptor.name));
            }

            let entry = Arc::new(result?);
            info!("Module {} loaded (instance {})", descriptor.name, entry.instance_id);
            table.entries.insert(descriptor.name.clone(), Arc::clone(&entry));
            Ok(entry)
        }
        .boxed()
        .shared()
    }
}

/// Build the runtime entry for a module that has none yet
async fn build_entry(
    descriptor: &ModuleDescriptor,
    sandbox: &SandboxConfig,
    adapter: &SandboxAdapter,
    cache: &dyn ExecutionCache,
    timeout: Option<Duration>,
) -> Result<ModuleEntry, ModuleError> {
    let name = descriptor.name.clone();

    let Some(url) = &descriptor.url else {
        if descriptor.render.is_some() {
            return Ok(ModuleEntry {
                instance_id: Uuid::new_v4(),
                exports: Arc::new(descriptor.as_exports()),
                sandbox: None,
                styles: Vec::new(),
            });
        }
        warn!("url and render cannot both be empty. name: {}", name);
        return Err(ModuleError::LoadError(format!("{} ({})", LOAD_FAILED, name)));
    };

    let assets = classify(url.clone());
    let sandbox = adapter.create(sandbox);

    let exports = if assets.executable.is_empty() {
        // style-only module: nothing to evaluate
        Some(Arc::new(ModuleExports::new()))
    } else {
        let task = ExecutionTask {
            name: name.clone(),
            urls: assets.executable,
        };
        let execution = cache.execute(task, sandbox.clone());
        let result = match timeout {
            Some(limit) => match with_custom_timeout(execution, limit).await {
                Ok(result) => result,
                Err(_) => {
                    warn!("Module {} did not load within {:?}", name, limit);
                    cache.cancel(&name);
                    return Err(ModuleError::Timeout(name));
                }
            },
            None => execution.await,
        };
        result.map_err(|e| match e {
            ModuleError::Cancelled(_) | ModuleError::Timeout(_) | ModuleError::LoadError(_) => e,
            other => ModuleError::LoadError(format!("{} ({}): {}", LOAD_FAILED, name, other)),
        })?
    };

    let exports =
        exports.ok_or_else(|| ModuleError::LoadError(format!("{} ({})", LOAD_FAILED, name)))?;

    Ok(ModuleEntry {
        instance_id: Uuid::new_v4(),
        exports,
        sandbox,
        styles: assets.style,
    })
}

/// Mount precedence: descriptor override, exported mount, default stub
fn resolve_mount(descriptor: &ModuleDescriptor, exports: &ModuleExports) -> MountFn {
    descriptor
        .mount
        .clone()
        .or_else(|| exports.mount.clone())
        .unwrap_or_else(|| default_mount(&descriptor.name))
}

/// Unmount precedence: descriptor override, exported unmount, default stub
fn resolve_unmount(descriptor: &ModuleDescriptor, exports: Option<&ModuleExports>) -> UnmountFn {
    descriptor
        .unmount
        .clone()
        .or_else(|| exports.and_then(|e| e.unmount.clone()))
        .unwrap_or_else(|| default_unmount(&descriptor.name))
}

/// Component precedence: default export, descriptor render, raw exports
fn resolve_component(descriptor: &ModuleDescriptor, exports: &Arc<ModuleExports>) -> Component {
    if let Some(default) = &exports.default {
        Component::Default(Arc::clone(default))
    } else if let Some(render) = &descriptor.render {
        Component::Render(Arc::clone(render))
    } else {
        Component::Exports(Arc::clone(exports))
    }
}

fn default_mount(name: &str) -> MountFn {
    let name = name.to_string();
    Arc::new(
        move |_component: Component, target: &MountTarget, _props: &Props| -> Result<(), ModuleError> {
            error!("Module {} must export a mount function (target {})", name, target);
            Ok(())
        },
    )
}

fn default_unmount(name: &str) -> UnmountFn {
    let name = name.to_string();
    Arc::new(move |target: &MountTarget| -> Result<(), ModuleError> {
        error!("Module {} must export an unmount function (target {})", name, target);
        Ok(())
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn failing_mount(message: &'static str) -> MountFn {
        Arc::new(
            move |_: Component, _: &MountTarget, _: &Props| -> Result<(), ModuleError> {
                Err(ModuleError::OperationError(message.to_string()))
            },
        )
    }

    #[test]
    fn test_mount_precedence() {
        let exports = ModuleExports::new().with_mount(failing_mount("exported"));
        let target = MountTarget::new("root");
        let props = Props::Null;
        let component = Component::Exports(Arc::new(ModuleExports::new()));

        let descriptor = ModuleDescriptor::new("m").with_url("m.js");
        let mount = resolve_mount(&descriptor, &exports);
        let err = mount(component.clone(), &target, &props).unwrap_err();
        assert_eq!(err.to_string(), "Module operation failed: exported");

        let descriptor = descriptor.with_mount(failing_mount("override"));
        let mount = resolve_mount(&descriptor, &exports);
        let err = mount(component.clone(), &target, &props).unwrap_err();
        assert_eq!(err.to_string(), "Module operation failed: override");

        // neither: the stub only logs
        let mount = resolve_mount(&ModuleDescriptor::new("m"), &ModuleExports::new());
        assert!(mount(component, &target, &props).is_ok());
    }

    #[test]
    fn test_component_precedence() {
        let default: crate::module::traits::ComponentHandle = Arc::new("default");
        let render: crate::module::traits::ComponentHandle = Arc::new("render");

        let with_default = Arc::new(ModuleExports::new().with_default(Arc::clone(&default)));
        let descriptor = ModuleDescriptor::new("m").with_render(Arc::clone(&render));
        assert!(matches!(resolve_component(&descriptor, &with_default), Component::Default(_)));

        let bare = Arc::new(ModuleExports::new());
        let component = resolve_component(&descriptor, &bare);
        assert_eq!(component.downcast_ref::<&str>(), Some(&"render"));

        let component = resolve_component(&ModuleDescriptor::new("m"), &bare);
        assert!(matches!(component, Component::Exports(_)));
    }

    #[test]
    fn test_unmount_without_entry_uses_stub() {
        let unmount = resolve_unmount(&ModuleDescriptor::new("ghost"), None);
        assert!(unmount(&MountTarget::new("root")).is_ok());
    }
}
