//! Module descriptors
//!
//! A descriptor says where a module comes from (asset locators or a render
//! value supplied in-process) and optionally overrides its mount/unmount.

use std::fmt;
use std::sync::Arc;

use crate::module::assets::AssetUrls;
use crate::module::traits::{ComponentHandle, ModuleExports, MountFn, UnmountFn};

/// Declarative module description
#[derive(Clone)]
pub struct ModuleDescriptor {
    /// Unique module name
    pub name: String,
    /// Script and style locators
    pub url: Option<AssetUrls>,
    /// Directly supplied mount-capable value
    pub render: Option<ComponentHandle>,
    /// Mount override, takes precedence over the module's own export
    pub mount: Option<MountFn>,
    /// Unmount override, takes precedence over the module's own export
    pub unmount: Option<UnmountFn>,
}

impl ModuleDescriptor {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            url: None,
            render: None,
            mount: None,
            unmount: None,
        }
    }

    pub fn with_url(mut self, url: impl Into<AssetUrls>) -> Self {
        self.url = Some(url.into());
        self
    }

    pub fn with_render(mut self, render: ComponentHandle) -> Self {
        self.render = Some(render);
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

    /// Whether the descriptor says how to obtain the module at all
    pub fn has_load_strategy(&self) -> bool {
        self.url.is_some() || self.render.is_some()
    }

    /// Exports of a render-only module: the descriptor itself
    pub(crate) fn as_exports(&self) -> ModuleExports {
        let mut exports = ModuleExports::new().with_export("name", self.name.clone().into());
        exports.mount = self.mount.clone();
        exports.unmount = self.unmount.clone();
        exports
    }

    /// Whether `other` describes the same module from the same sources
    pub fn same_as(&self, other: &ModuleDescriptor) -> bool {
        fn same<T: ?Sized>(a: &Option<Arc<T>>, b: &Option<Arc<T>>) -> bool {
            match (a, b) {
                (Some(a), Some(b)) => Arc::ptr_eq(a, b),
                (None, None) => true,
                _ => false,
            }
        }
        self.name == other.name
            && self.url == other.url
            && same(&self.render, &other.render)
            && same(&self.mount, &other.mount)
            && same(&self.unmount, &other.unmount)
    }
}

impl fmt::Debug for ModuleDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModuleDescriptor")
            .field("name", &self.name)
            .field("url", &self.url)
            .field("render", &self.render.is_some())
            .field("mount", &self.mount.is_some())
            .field("unmount", &self.unmount.is_some())
            .finish()
    }
}
