//! Headless style document

use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;
use tracing::{debug, error};
use uuid::Uuid;

use crate::module::traits::{HostAttachment, ModuleError};

/// Name of the default attachment root
pub const DEFAULT_STYLE_ROOT: &str = "head";

/// Style node inserted into the document
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StyleNode {
    pub id: Uuid,
    /// Module tag
    pub module: String,
    pub href: String,
    /// Root container the node was appended to
    pub root: String,
}

/// In-memory document holding style nodes
#[derive(Debug)]
pub struct MemoryHost {
    root: Option<String>,
    nodes: Mutex<Vec<StyleNode>>,
    /// Locators whose load fails (the node is still inserted)
    broken: Mutex<HashSet<String>>,
    latency: Option<Duration>,
    appended: AtomicUsize,
    /// Appends left to reject as if the root were missing
    detached_appends: AtomicUsize,
}

impl MemoryHost {
    /// Document with the default `head` root
    pub fn new() -> Self {
        Self::with_root(Some(DEFAULT_STYLE_ROOT.to_string()))
    }

    /// Document with a custom root, or none at all
    pub fn with_root(root: Option<String>) -> Self {
        Self {
            root,
            nodes: Mutex::new(Vec::new()),
            broken: Mutex::new(HashSet::new()),
            latency: None,
            appended: AtomicUsize::new(0),
            detached_appends: AtomicUsize::new(0),
        }
    }

    /// Delay settlement of every style load
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Make loads of `url` fail
    pub fn mark_broken(&self, url: impl Into<String>) {
        self.broken
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(url.into());
    }

    /// Reject the next `count` appends as if the root were missing
    pub fn detach_root_for(&self, count: usize) {
        self.detached_appends.store(count, Ordering::SeqCst);
    }

    /// All nodes currently in the document
    pub fn nodes(&self) -> Vec<StyleNode> {
        self.nodes.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Nodes tagged with `module`
    pub fn nodes_for(&self, module: &str) -> Vec<StyleNode> {
        self.nodes()
            .into_iter()
            .filter(|node| node.module == module)
            .collect()
    }

    /// Number of nodes with this locator
    pub fn count_href(&self, href: &str) -> usize {
        self.nodes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|node| node.href == href)
            .count()
    }

    /// Total successful appends since creation
    pub fn append_count(&self) -> usize {
        self.appended.load(Ordering::SeqCst)
    }
}

impl Default for MemoryHost {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl HostAttachment for MemoryHost {
    async fn append_style(&self, module: &str, url: &str) -> Result<(), ModuleError> {
        let detached = self
            .detached_appends
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
            .is_ok();
        let root = self.root.as_ref().filter(|_| !detached).ok_or_else(|| {
            ModuleError::AttachmentError(format!("no root element for css asset: {}", url))
        })?;

        let node = StyleNode {
            id: Uuid::new_v4(),
            module: module.to_string(),
            href: url.to_string(),
            root: root.clone(),
        };
        self.nodes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(node);
        self.appended.fetch_add(1, Ordering::SeqCst);

        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }

        let broken = self
            .broken
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(url);
        if broken {
            error!("css asset loaded error: {}", url);
        } else {
            debug!("css asset loaded: {} (module {})", url, module);
        }
        Ok(())
    }

    async fn remove_styles(&self, module: &str, removal: Option<&[String]>) -> usize {
        let mut nodes = self.nodes.lock().unwrap_or_else(PoisonError::into_inner);
        let before = nodes.len();
        nodes.retain(|node| {
            let selected = node.module == module
                && removal.map_or(true, |list| list.iter().any(|url| *url == node.href));
            !selected
        });
        let removed = before - nodes.len();
        debug!("Removed {} style nodes for module {}", removed, module);
        removed
    }
}
