//! Blocking task manager: callables on a bounded worker pool with callback delivery.
//!
//! Each task moves through `Submitted → Running → {Completed | Failed | Cancelled}`.
//! On completion the worker thread invokes exactly one of `on_result` /
//! `on_error`, removes the task from the active registry, then invokes
//! `on_finished`. Callbacks run on the worker thread; a UI collaborator must
//! marshal back to its own thread (for example by sending into a channel it
//! drains on its event loop tick).
//!
//! Cancellation is cooperative. The flag is checked before the job starts and
//! again before the result is emitted; jobs may poll the [`CancelFlag`] they
//! receive. Running code is never interrupted.

use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing::{debug, error, info, warn};

use super::error::{ManagerError, TaskError};
use super::task::{CancelFlag, TaskHandle, TaskId, TaskIdGenerator, TaskKind, TaskResult, TaskStatus};
use super::worker_pool::{PoolSettings, PoolStats, WorkerPool};
use crate::config::BlockingManagerConfig;

type ResultCallback<T> = Box<dyn FnOnce(T) + Send + 'static>;
type ErrorCallback = Box<dyn FnOnce(TaskError) + Send + 'static>;
type FinishedCallback = Box<dyn FnOnce(TaskResult<()>) + Send + 'static>;

/// Caller-supplied completion callbacks, all optional.
pub struct TaskCallbacks<T> {
    on_result: Option<ResultCallback<T>>,
    on_error: Option<ErrorCallback>,
    on_finished: Option<FinishedCallback>,
}

impl<T> Default for TaskCallbacks<T> {
    fn default() -> Self {
        Self {
            on_result: None,
            on_error: None,
            on_finished: None,
        }
    }
}

impl<T> TaskCallbacks<T> {
    /// No callbacks.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Called with the value when the task succeeds.
    #[must_use]
    pub fn on_result(mut self, f: impl FnOnce(T) + Send + 'static) -> Self {
        self.on_result = Some(Box::new(f));
        self
    }

    /// Called with the error when the task fails or is cancelled.
    #[must_use]
    pub fn on_error(mut self, f: impl FnOnce(TaskError) + Send + 'static) -> Self {
        self.on_error = Some(Box::new(f));
        self
    }

    /// Called last, after the task left the active registry.
    #[must_use]
    pub fn on_finished(mut self, f: impl FnOnce(TaskResult<()>) + Send + 'static) -> Self {
        self.on_finished = Some(Box::new(f));
        self
    }
}

/// Counters reported by [`BlockingTaskManager::stats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ManagerStats {
    /// Tasks accepted.
    pub submitted: u64,
    /// Tasks that produced a value.
    pub completed: u64,
    /// Tasks that produced an error.
    pub failed: u64,
    /// Tasks cancelled before emitting a result.
    pub cancelled: u64,
    /// Tasks currently in the registry.
    pub active: usize,
    /// Underlying pool utilization.
    pub pool: PoolStats,
}

struct ActiveTask {
    handle: TaskHandle,
    cancel: CancelFlag,
    status: TaskStatus,
}

#[derive(Default)]
struct Counters {
    submitted: AtomicU64,
    completed: AtomicU64,
    failed: AtomicU64,
    cancelled: AtomicU64,
}

struct Shared {
    registry: Mutex<HashMap<TaskId, ActiveTask>>,
    counters: Counters,
}

impl Shared {
    fn mark_running(&self, id: &TaskId) {
        if let Some(task) = self.registry.lock().get_mut(id) {
            task.status = TaskStatus::Running;
        }
    }

    fn finish(&self, id: &TaskId) {
        self.registry.lock().remove(id);
    }
}

/// Runs blocking callables on a fixed-size pool of OS threads.
pub struct BlockingTaskManager {
    pool: WorkerPool,
    shared: Arc<Shared>,
    ids: TaskIdGenerator,
    accepting: AtomicBool,
}

impl BlockingTaskManager {
    /// Create a manager and spawn its worker threads.
    ///
    /// # Errors
    ///
    /// `ManagerError::InvalidConfig` if validation fails, `ManagerError::Internal`
    /// if a worker thread cannot be spawned.
    pub fn new(config: &BlockingManagerConfig) -> Result<Self, ManagerError> {
        config.validate().map_err(ManagerError::InvalidConfig)?;
        let pool = WorkerPool::new(PoolSettings {
            worker_count: config.worker_count,
            max_queue_depth: config.max_queue_depth,
            thread_stack_size: config.thread_stack_size,
            thread_name_prefix: "dd-blocking".into(),
        })?;
        Ok(Self {
            pool,
            shared: Arc::new(Shared {
                registry: Mutex::new(HashMap::new()),
                counters: Counters::default(),
            }),
            ids: TaskIdGenerator::new(),
            accepting: AtomicBool::new(true),
        })
    }

    /// Submit `job` under a generated name. Returns immediately.
    ///
    /// # Errors
    ///
    /// `ManagerError::QueueFull` or `ManagerError::Shutdown`.
    pub fn run<T, E, F>(&self, job: F, callbacks: TaskCallbacks<T>) -> Result<TaskId, ManagerError>
    where
        T: Send + 'static,
        E: Into<TaskError>,
        F: FnOnce(&CancelFlag) -> Result<T, E> + Send + 'static,
    {
        self.submit(None, job, callbacks)
    }

    /// Submit `job` with a human-readable name. Returns immediately.
    ///
    /// # Errors
    ///
    /// `ManagerError::QueueFull` or `ManagerError::Shutdown`.
    pub fn run_named<T, E, F>(
        &self,
        name: impl Into<String>,
        job: F,
        callbacks: TaskCallbacks<T>,
    ) -> Result<TaskId, ManagerError>
    where
        T: Send + 'static,
        E: Into<TaskError>,
        F: FnOnce(&CancelFlag) -> Result<T, E> + Send + 'static,
    {
        self.submit(Some(name.into()), job, callbacks)
    }

    fn submit<T, E, F>(
        &self,
        name: Option<String>,
        job: F,
        callbacks: TaskCallbacks<T>,
    ) -> Result<TaskId, ManagerError>
    where
        T: Send + 'static,
        E: Into<TaskError>,
        F: FnOnce(&CancelFlag) -> Result<T, E> + Send + 'static,
    {
        if !self.accepting.load(Ordering::Acquire) {
            return Err(ManagerError::Shutdown);
        }

        let handle = self.ids.next_handle(TaskKind::Blocking, name);
        let task_id = handle.id.clone();
        let cancel = CancelFlag::new();

        self.shared.registry.lock().insert(
            task_id.clone(),
            ActiveTask {
                handle: handle.clone(),
                cancel: cancel.clone(),
                status: TaskStatus::Submitted,
            },
        );

        let shared = Arc::clone(&self.shared);
        let enqueued = self.pool.execute(Box::new(move || {
            execute_task(&shared, &handle, &cancel, job, callbacks);
        }));

        if let Err(e) = enqueued {
            self.shared.finish(&task_id);
            return Err(e);
        }

        self.shared.counters.submitted.fetch_add(1, Ordering::Relaxed);
        debug!(task_id = %task_id, "blocking task submitted");
        Ok(task_id)
    }

    /// Request cooperative cancellation.
    ///
    /// Returns `false` for unknown ids and for tasks already cancelled.
    pub fn cancel(&self, task_id: &TaskId) -> bool {
        let registry = self.shared.registry.lock();
        let Some(task) = registry.get(task_id) else {
            return false;
        };
        let first = task.cancel.cancel();
        if first {
            debug!(task_id = %task_id, status = ?task.status, "blocking task cancel requested");
        }
        first
    }

    /// Cancel every active task; returns how many were newly cancelled.
    pub fn cancel_all(&self) -> usize {
        let registry = self.shared.registry.lock();
        registry.values().filter(|task| task.cancel.cancel()).count()
    }

    /// Tasks submitted and not yet finished.
    pub fn active_count(&self) -> usize {
        self.shared.registry.lock().len()
    }

    /// Whether `task_id` is still pending or running.
    pub fn is_active(&self, task_id: &TaskId) -> bool {
        self.shared.registry.lock().contains_key(task_id)
    }

    /// Current status of an active task.
    pub fn status(&self, task_id: &TaskId) -> Option<TaskStatus> {
        self.shared.registry.lock().get(task_id).map(|task| task.status)
    }

    /// Handles of every active task.
    pub fn active_tasks(&self) -> Vec<TaskHandle> {
        self.shared
            .registry
            .lock()
            .values()
            .map(|task| task.handle.clone())
            .collect()
    }

    /// Counter snapshot.
    pub fn stats(&self) -> ManagerStats {
        let counters = &self.shared.counters;
        ManagerStats {
            submitted: counters.submitted.load(Ordering::Relaxed),
            completed: counters.completed.load(Ordering::Relaxed),
            failed: counters.failed.load(Ordering::Relaxed),
            cancelled: counters.cancelled.load(Ordering::Relaxed),
            active: self.active_count(),
            pool: self.pool.stats(),
        }
    }

    /// Stop accepting work, cancel everything, and wait up to `drain_timeout`
    /// for workers to exit.
    ///
    /// Always returns within the timeout. Workers still busy are abandoned and
    /// the registry is cleared, so `active_count()` is 0 afterward. Returns
    /// `true` when every worker exited in time.
    pub fn shutdown(&self, drain_timeout: Duration) -> bool {
        self.accepting.store(false, Ordering::Release);
        let cancelled = self.cancel_all();
        info!(cancelled, ?drain_timeout, "shutting down blocking task manager");

        let clean = self.pool.shutdown(drain_timeout);

        let abandoned = {
            let mut registry = self.shared.registry.lock();
            let n = registry.len();
            registry.clear();
            n
        };
        if abandoned > 0 {
            warn!(abandoned, "blocking tasks abandoned at shutdown");
        }
        clean
    }
}

fn execute_task<T, E, F>(
    shared: &Shared,
    handle: &TaskHandle,
    cancel: &CancelFlag,
    job: F,
    callbacks: TaskCallbacks<T>,
) where
    E: Into<TaskError>,
    F: FnOnce(&CancelFlag) -> Result<T, E>,
{
    let start = Instant::now();

    let outcome = if cancel.is_cancelled() {
        Err(TaskError::cancelled())
    } else {
        shared.mark_running(&handle.id);
        debug!(task_id = %handle.id, name = %handle.name, "blocking task running");
        match catch_unwind(AssertUnwindSafe(|| job(cancel))) {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(err)) => Err(err.into()),
            Err(panic) => Err(TaskError::from_panic(panic.as_ref())),
        }
    };

    // A cancel that lands while the job runs discards its outcome.
    let outcome = if cancel.is_cancelled() {
        Err(TaskError::cancelled())
    } else {
        outcome
    };

    let result = TaskResult::new(handle, outcome, start.elapsed());
    let summary = result.summary();
    let counter = match result.status() {
        TaskStatus::Cancelled => &shared.counters.cancelled,
        TaskStatus::Failed => &shared.counters.failed,
        _ => &shared.counters.completed,
    };
    counter.fetch_add(1, Ordering::Relaxed);
    debug!(
        task_id = %handle.id,
        status = ?summary.status(),
        elapsed_ms = summary.duration.as_millis(),
        "blocking task finished"
    );

    match result.outcome {
        Ok(value) => {
            if let Some(on_result) = callbacks.on_result {
                guard_callback(&handle.id, "on_result", || on_result(value));
            }
        }
        Err(err) => {
            if let Some(on_error) = callbacks.on_error {
                guard_callback(&handle.id, "on_error", || on_error(err));
            }
        }
    }

    shared.finish(&handle.id);

    if let Some(on_finished) = callbacks.on_finished {
        guard_callback(&handle.id, "on_finished", || on_finished(summary));
    }
}

fn guard_callback(task_id: &TaskId, which: &str, f: impl FnOnce()) {
    if catch_unwind(AssertUnwindSafe(f)).is_err() {
        error!(task_id = %task_id, callback = which, "task callback panicked");
    }
}
