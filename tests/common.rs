#![allow(dead_code)]

use async_trait::async_trait;
use module_host::module::{
    Component, ExecutionTask, HostAttachment, MemoryHost, ModuleDescriptor, ModuleError,
    ModuleExports, ModuleLoader, ModuleManager, MountFn, MountTarget, Props, Sandbox,
    ScriptEvaluator, UnmountFn,
};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::watch;

/// Calls observed by exported or overriding mount/unmount functions
#[derive(Default)]
pub struct CallLog {
    pub mounts: Mutex<Vec<(String, String, Component)>>,
    pub unmounts: Mutex<Vec<(String, String)>>,
}

impl CallLog {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn mount_fn(self: &Arc<Self>, tag: &str) -> MountFn {
        let log = Arc::clone(self);
        let tag = tag.to_string();
        Arc::new(
            move |component: Component, target: &MountTarget, _props: &Props| -> Result<(), ModuleError> {
                log.mounts
                    .lock()
                    .unwrap()
                    .push((tag.clone(), target.to_string(), component));
                Ok(())
            },
        )
    }

    pub fn unmount_fn(self: &Arc<Self>, tag: &str) -> UnmountFn {
        let log = Arc::clone(self);
        let tag = tag.to_string();
        Arc::new(move |target: &MountTarget| -> Result<(), ModuleError> {
            log.unmounts
                .lock()
                .unwrap()
                .push((tag.clone(), target.to_string()));
            Ok(())
        })
    }

    pub fn mount_count(&self) -> usize {
        self.mounts.lock().unwrap().len()
    }

    pub fn unmount_targets(&self) -> Vec<(String, String)> {
        self.unmounts.lock().unwrap().clone()
    }
}

/// Script evaluator with a release gate, failure injection and call counting
pub struct TestEvaluator {
    calls: AtomicUsize,
    per_module: Mutex<HashMap<String, usize>>,
    sandboxed: Mutex<Vec<bool>>,
    received: Mutex<Vec<Arc<dyn Sandbox>>>,
    /// Modules that fail this many more times
    failures: Mutex<HashMap<String, usize>>,
    /// Modules that evaluate without exports
    empty: Mutex<HashSet<String>>,
    gate: watch::Sender<bool>,
    pub log: Arc<CallLog>,
}

impl TestEvaluator {
    pub fn new() -> Arc<Self> {
        Self::build(true)
    }

    /// Evaluations block until `release` is called
    pub fn gated() -> Arc<Self> {
        Self::build(false)
    }

    fn build(open: bool) -> Arc<Self> {
        let (gate, _) = watch::channel(open);
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            per_module: Mutex::new(HashMap::new()),
            sandboxed: Mutex::new(Vec::new()),
            received: Mutex::new(Vec::new()),
            failures: Mutex::new(HashMap::new()),
            empty: Mutex::new(HashSet::new()),
            gate,
            log: CallLog::new(),
        })
    }

    pub fn release(&self) {
        self.gate.send_replace(true);
    }

    pub fn fail_times(&self, name: &str, times: usize) {
        self.failures.lock().unwrap().insert(name.to_string(), times);
    }

    pub fn produce_nothing(&self, name: &str) {
        self.empty.lock().unwrap().insert(name.to_string());
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn calls_for(&self, name: &str) -> usize {
        self.per_module.lock().unwrap().get(name).copied().unwrap_or(0)
    }

    pub fn sandboxed(&self) -> Vec<bool> {
        self.sandboxed.lock().unwrap().clone()
    }

    /// Sandboxes handed to evaluations, in call order
    pub fn sandboxes(&self) -> Vec<Arc<dyn Sandbox>> {
        self.received.lock().unwrap().clone()
    }

    /// Wait until at least `n` evaluations started
    pub async fn wait_for_calls(&self, n: usize) {
        while self.calls() < n {
            tokio::task::yield_now().await;
        }
    }
}

#[async_trait]
impl ScriptEvaluator for TestEvaluator {
    async fn evaluate(
        &self,
        task: &ExecutionTask,
        sandbox: Option<Arc<dyn Sandbox>>,
    ) -> Result<Option<ModuleExports>, ModuleError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self
            .per_module
            .lock()
            .unwrap()
            .entry(task.name.clone())
            .or_insert(0) += 1;
        self.sandboxed.lock().unwrap().push(sandbox.is_some());

        let mut gate = self.gate.subscribe();
        let _ = gate.wait_for(|open| *open).await;

        // module code marks itself loaded in whatever global scope it runs in
        if let Some(sandbox) = sandbox {
            sandbox.set_global(&format!("__{}_loaded", task.name), serde_json::Value::Bool(true));
            self.received.lock().unwrap().push(sandbox);
        }

        {
            let mut failures = self.failures.lock().unwrap();
            if let Some(left) = failures.get_mut(&task.name) {
                if *left > 0 {
                    *left -= 1;
                    return Err(ModuleError::OperationError(format!(
                        "failed to fetch {}",
                        task.urls.join(",")
                    )));
                }
            }
        }
        if self.empty.lock().unwrap().contains(&task.name) {
            return Ok(None);
        }

        let component: Arc<dyn std::any::Any + Send + Sync> =
            Arc::new(format!("{}-component", task.name));
        Ok(Some(
            ModuleExports::new()
                .with_default(component)
                .with_mount(self.log.mount_fn(&task.name))
                .with_unmount(self.log.unmount_fn(&task.name)),
        ))
    }
}

/// Sandbox counting teardowns
#[derive(Default)]
pub struct CountingSandbox {
    pub cleared: AtomicUsize,
}

impl Sandbox for CountingSandbox {
    fn clear(&self) {
        self.cleared.fetch_add(1, Ordering::SeqCst);
    }
}

pub struct Harness {
    pub evaluator: Arc<TestEvaluator>,
    pub host: Arc<MemoryHost>,
    pub manager: Arc<ModuleManager>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with(TestEvaluator::new(), MemoryHost::new())
    }

    pub fn gated() -> Self {
        Self::with(TestEvaluator::gated(), MemoryHost::new())
    }

    pub fn with(evaluator: Arc<TestEvaluator>, host: MemoryHost) -> Self {
        let host = Arc::new(host);
        let loader = ModuleLoader::with_evaluator(Arc::clone(&evaluator));
        let manager = ModuleManager::new(
            Arc::new(loader),
            Arc::clone(&host) as Arc<dyn HostAttachment>,
        );
        Self {
            evaluator,
            host,
            manager: Arc::new(manager),
        }
    }

    pub fn with_manager(mut self, f: impl FnOnce(ModuleManager) -> ModuleManager) -> Self {
        let manager = Arc::try_unwrap(self.manager)
            .ok()
            .expect("manager not shared yet");
        self.manager = Arc::new(f(manager));
        self
    }
}

pub fn target(id: &str) -> MountTarget {
    MountTarget::new(id)
}

pub fn props() -> Props {
    Props::Null
}

pub fn descriptor(name: &str, urls: &[&str]) -> ModuleDescriptor {
    ModuleDescriptor::new(name).with_url(urls.to_vec())
}
