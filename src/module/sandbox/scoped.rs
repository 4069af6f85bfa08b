//! Built-in scoped sandbox
//!
//! The engine owns a host scope shared by every sandbox it creates. A sandbox
//! works in one of two modes:
//!
//! - snapshot (default): writes go through to the host scope, and the previous
//!   value of every touched key is recorded so `clear()` restores the host scope
//! - multi mode: writes go to a private scope; reads fall back to the host scope
//!   and `clear()` drops the private scope

use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::debug;

use crate::module::sandbox::adapter::SandboxOptions;
use crate::module::traits::{Sandbox, SandboxEngine};

type Scope = Arc<Mutex<HashMap<String, Value>>>;

/// Default isolation engine
#[derive(Debug, Clone, Default)]
pub struct ScopedSandboxEngine {
    host: Scope,
}

impl ScopedSandboxEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read a global from the host scope
    pub fn host_global(&self, key: &str) -> Option<Value> {
        self.host
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    /// Write a global into the host scope
    pub fn set_host_global(&self, key: impl Into<String>, value: Value) {
        self.host
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.into(), value);
    }
}

impl SandboxEngine for ScopedSandboxEngine {
    fn create(&self, options: &SandboxOptions) -> Arc<dyn Sandbox> {
        Arc::new(ScopedSandbox::with_host(options.clone(), Arc::clone(&self.host)))
    }
}

/// Global scope container with teardown
#[derive(Debug, Default)]
pub struct ScopedSandbox {
    options: SandboxOptions,
    host: Scope,
    /// Multi mode writes
    private: Mutex<HashMap<String, Value>>,
    /// Snapshot mode: host values before the first write of each key
    snapshot: Mutex<HashMap<String, Option<Value>>>,
}

impl ScopedSandbox {
    /// Sandbox over a host scope of its own
    pub fn new(options: SandboxOptions) -> Self {
        Self::with_host(options, Scope::default())
    }

    fn with_host(options: SandboxOptions, host: Scope) -> Self {
        Self {
            options,
            host,
            private: Mutex::new(HashMap::new()),
            snapshot: Mutex::new(HashMap::new()),
        }
    }

    pub fn options(&self) -> &SandboxOptions {
        &self.options
    }

    /// Number of globals written since creation or the last `clear()`
    pub fn global_count(&self) -> usize {
        if self.options.multi_mode {
            self.private.lock().unwrap_or_else(PoisonError::into_inner).len()
        } else {
            self.snapshot.lock().unwrap_or_else(PoisonError::into_inner).len()
        }
    }
}

impl Sandbox for ScopedSandbox {
    fn set_global(&self, key: &str, value: Value) {
        if self.options.multi_mode {
            self.private
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .insert(key.to_string(), value);
            return;
        }

        let mut snapshot = self.snapshot.lock().unwrap_or_else(PoisonError::into_inner);
        let mut host = self.host.lock().unwrap_or_else(PoisonError::into_inner);
        snapshot
            .entry(key.to_string())
            .or_insert_with(|| host.get(key).cloned());
        host.insert(key.to_string(), value);
    }

    fn get_global(&self, key: &str) -> Option<Value> {
        if self.options.multi_mode {
            let private = self.private.lock().unwrap_or_else(PoisonError::into_inner);
            if let Some(value) = private.get(key) {
                return Some(value.clone());
            }
        }
        self.host
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    fn clear(&self) {
        if self.options.multi_mode {
            let mut private = self.private.lock().unwrap_or_else(PoisonError::into_inner);
            debug!("Dropping {} sandbox globals", private.len());
            private.clear();
            return;
        }

        let mut snapshot = self.snapshot.lock().unwrap_or_else(PoisonError::into_inner);
        let mut host = self.host.lock().unwrap_or_else(PoisonError::into_inner);
        debug!("Restoring {} host globals", snapshot.len());
        for (key, previous) in snapshot.drain() {
            match previous {
                Some(value) => host.insert(key, value),
                None => host.remove(&key),
            };
        }
    }
}
