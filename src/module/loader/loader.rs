//! Default execution cache
//!
//! Wraps a [`ScriptEvaluator`] so that each module name is evaluated at most
//! once. Concurrent requests for a name share one pending task; completed tasks
//! stay cached until [`ExecutionCache::cancel_all`]. Failed tasks are evicted so
//! the next request retries.

use async_trait::async_trait;
use futures::future::{BoxFuture, FutureExt, Shared};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, info, warn};

use crate::module::traits::{ExecutionCache, ExecutionTask, ModuleError, ModuleExports, Sandbox, ScriptEvaluator};

type TaskResult = Result<Option<Arc<ModuleExports>>, ModuleError>;
type TaskFuture = Shared<BoxFuture<'static, TaskResult>>;

struct TaskSlot {
    id: u64,
    future: TaskFuture,
}

/// Execution cache keyed by module name
pub struct ModuleLoader<E> {
    evaluator: Arc<E>,
    tasks: Mutex<HashMap<String, TaskSlot>>,
    /// Bumped by `cancel_all`; results from an older generation are discarded
    generation: AtomicU64,
    next_task_id: AtomicU64,
}

impl<E: ScriptEvaluator + 'static> ModuleLoader<E> {
    /// Create a new loader over the given evaluator
    pub fn new(evaluator: E) -> Self {
        Self::with_evaluator(Arc::new(evaluator))
    }

    /// Create a loader sharing an existing evaluator
    pub fn with_evaluator(evaluator: Arc<E>) -> Self {
        Self {
            evaluator,
            tasks: Mutex::new(HashMap::new()),
            generation: AtomicU64::new(0),
            next_task_id: AtomicU64::new(0),
        }
    }

    pub fn evaluator(&self) -> &Arc<E> {
        &self.evaluator
    }

    /// Names with a pending or completed task
    pub fn task_names(&self) -> Vec<String> {
        let tasks = self.tasks.lock().unwrap_or_else(PoisonError::into_inner);
        tasks.keys().cloned().collect()
    }

    /// Join the task for `task.name`, or start it
    fn join_or_start(&self, task: ExecutionTask, sandbox: Option<Arc<dyn Sandbox>>) -> (u64, TaskFuture) {
        let mut tasks = self.tasks.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(slot) = tasks.get(&task.name) {
            debug!("Joining execution task for module {}", task.name);
            return (slot.id, slot.future.clone());
        }

        let id = self.next_task_id.fetch_add(1, Ordering::SeqCst);
        let name = task.name.clone();
        let evaluator = Arc::clone(&self.evaluator);
        info!("Executing module {} ({} scripts)", task.name, task.urls.len());
        let future = async move {
            let exports = evaluator.evaluate(&task, sandbox).await?;
            Ok(exports.map(Arc::new))
        }
        .boxed()
        .shared();

        tasks.insert(
            name,
            TaskSlot {
                id,
                future: future.clone(),
            },
        );
        (id, future)
    }

    fn evict(&self, name: &str, id: u64) {
        let mut tasks = self.tasks.lock().unwrap_or_else(PoisonError::into_inner);
        if tasks.get(name).map(|slot| slot.id) == Some(id) {
            tasks.remove(name);
        }
    }
}

#[async_trait]
impl<E: ScriptEvaluator + 'static> ExecutionCache for ModuleLoader<E> {
    async fn execute(
        &self,
        task: ExecutionTask,
        sandbox: Option<Arc<dyn Sandbox>>,
    ) -> Result<Option<Arc<ModuleExports>>, ModuleError> {
        let name = task.name.clone();
        let generation = self.generation.load(Ordering::SeqCst);
        let (id, future) = self.join_or_start(task, sandbox);

        let result = future.await;

        if self.generation.load(Ordering::SeqCst) != generation {
            debug!("Discarding stale execution result for module {}", name);
            return Err(ModuleError::Cancelled(name));
        }

        match &result {
            Ok(Some(_)) => {}
            Ok(None) => {
                warn!("Module {} evaluated without exports", name);
                self.evict(&name, id);
            }
            Err(e) => {
                warn!("Module {} failed to execute: {}", name, e);
                self.evict(&name, id);
            }
        }
        result
    }

    fn cancel(&self, name: &str) {
        let mut tasks = self.tasks.lock().unwrap_or_else(PoisonError::into_inner);
        if tasks.remove(name).is_some() {
            info!("Cancelled execution task for module {}", name);
        }
    }

    fn cancel_all(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        let mut tasks = self.tasks.lock().unwrap_or_else(PoisonError::into_inner);
        if !tasks.is_empty() {
            info!("Cancelling {} execution tasks", tasks.len());
        }
        tasks.clear();
    }
}
