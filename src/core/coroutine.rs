//! Coroutine task manager: async callables on a tokio event loop.
//!
//! Unlike [`BlockingTaskManager`](super::BlockingTaskManager), outcomes are
//! retained and polled (`result`) or awaited (`wait`) rather than pushed
//! through callbacks. Blocking callables can be bridged through
//! [`CoroutineTaskManager::run_blocking`], which runs them on a small owned
//! thread pool so they never stall the loop.
//!
//! Cancellation uses a [`CancellationToken`] per task: the task body is dropped
//! at its next suspension point and a `Cancelled` result is stored. Start
//! order follows submission; completion order is whatever finishes first.
//!
//! Retained results are bounded by `max_retained_results` (least recently read
//! evicted first) and optionally by `result_ttl_secs`.

use std::collections::HashMap;
use std::future::Future;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::future::join_all;
use futures::FutureExt;
use parking_lot::Mutex;
use tokio::sync::{oneshot, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::error::{ManagerError, TaskError};
use super::task::{TaskHandle, TaskId, TaskIdGenerator, TaskKind, TaskResult};
use super::worker_pool::{PoolSettings, WorkerPool};
use crate::cache::TtlCache;
use crate::config::CoroutineManagerConfig;
use crate::runtime::EventLoop;

struct ActiveCoroutine {
    handle: TaskHandle,
    token: CancellationToken,
    done: watch::Receiver<bool>,
}

struct Shared<T> {
    active: Mutex<HashMap<TaskId, ActiveCoroutine>>,
    results: TtlCache<TaskId, TaskResult<T>>,
}

impl<T: Clone> Shared<T> {
    /// Store first, then leave the registry, so a task is always visible in one of the two.
    fn complete(&self, handle: &TaskHandle, outcome: Result<T, TaskError>, elapsed: Duration) {
        let result = TaskResult::new(handle, outcome, elapsed);
        debug!(
            task_id = %handle.id,
            status = ?result.status(),
            elapsed_ms = elapsed.as_millis(),
            "coroutine task finished"
        );
        self.results.set(handle.id.clone(), result);
        self.active.lock().remove(&handle.id);
    }
}

/// Schedules async work on an event loop and retains each task's result.
pub struct CoroutineTaskManager<T = serde_json::Value> {
    event_loop: EventLoop,
    executor: WorkerPool,
    shared: Arc<Shared<T>>,
    ids: TaskIdGenerator,
    accepting: AtomicBool,
}

impl<T> CoroutineTaskManager<T>
where
    T: Clone + Send + 'static,
{
    /// Create a manager spawning onto `event_loop`, with its own executor threads.
    ///
    /// # Errors
    ///
    /// `ManagerError::InvalidConfig` if validation fails, `ManagerError::Internal`
    /// if executor threads cannot be spawned.
    pub fn new(event_loop: EventLoop, config: &CoroutineManagerConfig) -> Result<Self, ManagerError> {
        config.validate().map_err(ManagerError::InvalidConfig)?;
        let executor = WorkerPool::new(PoolSettings {
            worker_count: config.executor_threads,
            max_queue_depth: config.executor_queue_depth,
            thread_stack_size: 2 * 1024 * 1024,
            thread_name_prefix: "dd-executor".into(),
        })?;
        Ok(Self {
            event_loop,
            executor,
            shared: Arc::new(Shared {
                active: Mutex::new(HashMap::new()),
                results: TtlCache::new(config.max_retained_results, config.result_ttl()),
            }),
            ids: TaskIdGenerator::new(),
            accepting: AtomicBool::new(true),
        })
    }

    /// Manager bound to the tokio runtime the caller is running inside.
    ///
    /// # Errors
    ///
    /// As [`CoroutineTaskManager::new`], plus `ManagerError::Internal` outside a runtime.
    pub fn current(config: &CoroutineManagerConfig) -> Result<Self, ManagerError> {
        Self::new(EventLoop::current()?, config)
    }

    /// The loop tasks are spawned onto.
    pub const fn event_loop(&self) -> &EventLoop {
        &self.event_loop
    }

    /// Schedule the future built by `factory` under a generated name.
    ///
    /// The factory receives the task's cancellation token so long-running
    /// bodies can also check it explicitly.
    ///
    /// # Errors
    ///
    /// `ManagerError::Shutdown` after [`CoroutineTaskManager::shutdown`].
    pub fn run<F, Fut, E>(&self, factory: F) -> Result<TaskId, ManagerError>
    where
        F: FnOnce(CancellationToken) -> Fut,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        E: Into<TaskError>,
    {
        self.submit_async(None, factory)
    }

    /// Like [`CoroutineTaskManager::run`] with a human-readable name.
    ///
    /// # Errors
    ///
    /// `ManagerError::Shutdown` after [`CoroutineTaskManager::shutdown`].
    pub fn run_named<F, Fut, E>(&self, name: impl Into<String>, factory: F) -> Result<TaskId, ManagerError>
    where
        F: FnOnce(CancellationToken) -> Fut,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        E: Into<TaskError>,
    {
        self.submit_async(Some(name.into()), factory)
    }

    fn submit_async<F, Fut, E>(&self, name: Option<String>, factory: F) -> Result<TaskId, ManagerError>
    where
        F: FnOnce(CancellationToken) -> Fut,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        E: Into<TaskError>,
    {
        self.ensure_accepting()?;
        let handle = self.ids.next_handle(TaskKind::Coroutine, name);
        let token = CancellationToken::new();
        let fut = factory(token.clone());
        Ok(self.spawn_tracked(handle, token, async move { fut.await.map_err(Into::into) }))
    }

    /// Run a blocking callable on the owned executor and track it like a coroutine.
    ///
    /// The job is skipped if its task is cancelled before an executor thread
    /// picks it up; once started it runs to completion and its value is
    /// discarded if the task was cancelled meanwhile.
    ///
    /// # Errors
    ///
    /// `ManagerError::QueueFull` if the executor queue is full,
    /// `ManagerError::Shutdown` after shutdown.
    pub fn run_blocking<F, E>(&self, job: F) -> Result<TaskId, ManagerError>
    where
        F: FnOnce(&CancellationToken) -> Result<T, E> + Send + 'static,
        E: Into<TaskError>,
    {
        self.submit_blocking(None, job)
    }

    /// Like [`CoroutineTaskManager::run_blocking`] with a human-readable name.
    ///
    /// # Errors
    ///
    /// `ManagerError::QueueFull` or `ManagerError::Shutdown`.
    pub fn run_blocking_named<F, E>(&self, name: impl Into<String>, job: F) -> Result<TaskId, ManagerError>
    where
        F: FnOnce(&CancellationToken) -> Result<T, E> + Send + 'static,
        E: Into<TaskError>,
    {
        self.submit_blocking(Some(name.into()), job)
    }

    fn submit_blocking<F, E>(&self, name: Option<String>, job: F) -> Result<TaskId, ManagerError>
    where
        F: FnOnce(&CancellationToken) -> Result<T, E> + Send + 'static,
        E: Into<TaskError>,
    {
        self.ensure_accepting()?;
        let handle = self.ids.next_handle(TaskKind::Coroutine, name);
        let token = CancellationToken::new();
        let (tx, rx) = oneshot::channel::<Result<T, TaskError>>();

        let job_token = token.clone();
        self.executor.execute(Box::new(move || {
            if job_token.is_cancelled() {
                return;
            }
            let outcome = match catch_unwind(AssertUnwindSafe(|| job(&job_token))) {
                Ok(Ok(value)) => Ok(value),
                Ok(Err(err)) => Err(err.into()),
                Err(panic) => Err(TaskError::from_panic(panic.as_ref())),
            };
            let _ = tx.send(outcome);
        }))?;

        Ok(self.spawn_tracked(handle, token, async move {
            // A dropped sender means the job was skipped or the executor closed.
            rx.await.unwrap_or_else(|_| Err(TaskError::cancelled()))
        }))
    }

    fn ensure_accepting(&self) -> Result<(), ManagerError> {
        if self.accepting.load(Ordering::Acquire) {
            Ok(())
        } else {
            Err(ManagerError::Shutdown)
        }
    }

    fn spawn_tracked<Fut>(&self, handle: TaskHandle, token: CancellationToken, fut: Fut) -> TaskId
    where
        Fut: Future<Output = Result<T, TaskError>> + Send + 'static,
    {
        let task_id = handle.id.clone();
        let (done_tx, done_rx) = watch::channel(false);

        // Registered before spawning so `wait`/`cancel` never miss a fast task.
        self.shared.active.lock().insert(
            task_id.clone(),
            ActiveCoroutine {
                handle: handle.clone(),
                token: token.clone(),
                done: done_rx,
            },
        );

        let shared = Arc::clone(&self.shared);
        self.event_loop.spawn(async move {
            let start = Instant::now();
            let outcome = tokio::select! {
                biased;
                () = token.cancelled() => Err(TaskError::cancelled()),
                res = AssertUnwindSafe(fut).catch_unwind() => match res {
                    Ok(outcome) => outcome,
                    Err(panic) => Err(TaskError::from_panic(panic.as_ref())),
                },
            };
            shared.complete(&handle, outcome, start.elapsed());
            done_tx.send_replace(true);
        });

        debug!(task_id = %task_id, "coroutine task submitted");
        task_id
    }

    /// Wait for `task_id` to finish, up to `timeout` if given.
    ///
    /// Returns the stored result, including one produced before this call.
    /// Returns `None` on timeout (the task keeps running) or for unknown ids.
    pub async fn wait(&self, task_id: &TaskId, timeout: Option<Duration>) -> Option<TaskResult<T>> {
        let done = self
            .shared
            .active
            .lock()
            .get(task_id)
            .map(|task| task.done.clone());
        let Some(mut done) = done else {
            return self.result(task_id);
        };

        let finished = async move { done.wait_for(|finished| *finished).await.is_ok() };
        let completed = match timeout {
            Some(limit) => tokio::time::timeout(limit, finished).await.unwrap_or(false),
            None => finished.await,
        };
        if completed {
            self.result(task_id)
        } else {
            None
        }
    }

    /// Non-suspending poll of the retained results.
    pub fn result(&self, task_id: &TaskId) -> Option<TaskResult<T>> {
        self.shared.results.get(task_id)
    }

    /// Remove and return a retained result.
    pub fn take_result(&self, task_id: &TaskId) -> Option<TaskResult<T>> {
        self.shared.results.take(task_id)
    }

    /// Number of retained results.
    pub fn retained_results(&self) -> usize {
        self.shared.results.size()
    }

    /// Drop retained results older than the configured TTL.
    pub fn cleanup_results(&self) -> usize {
        self.shared.results.cleanup_expired()
    }

    /// Cancel `task_id` and wait until its cancellation is acknowledged.
    ///
    /// Returns `false` for unknown or finished ids and for tasks already
    /// being cancelled. The stored result carries a `Cancelled` error.
    pub async fn cancel(&self, task_id: &TaskId) -> bool {
        let done = {
            let active = self.shared.active.lock();
            match active.get(task_id) {
                Some(task) if !task.token.is_cancelled() => {
                    task.token.cancel();
                    Some(task.done.clone())
                }
                _ => None,
            }
        };
        let Some(mut done) = done else {
            return false;
        };
        debug!(task_id = %task_id, "coroutine task cancel requested");
        let _ = done.wait_for(|finished| *finished).await;
        true
    }

    /// Cancel every active task, then await all acknowledgments concurrently.
    ///
    /// Returns the number of tasks newly cancelled.
    pub async fn cancel_all(&self) -> usize {
        let (cancelled, waiters) = {
            let active = self.shared.active.lock();
            let mut cancelled = 0;
            let mut waiters = Vec::with_capacity(active.len());
            for task in active.values() {
                if !task.token.is_cancelled() {
                    task.token.cancel();
                    cancelled += 1;
                }
                waiters.push(task.done.clone());
            }
            (cancelled, waiters)
        };

        join_all(waiters.into_iter().map(|mut done| async move {
            let _ = done.wait_for(|finished| *finished).await;
        }))
        .await;
        cancelled
    }

    /// Best-effort shutdown for process exit.
    ///
    /// Signals cancellation to every task without awaiting it and closes the
    /// executor without waiting for queued jobs.
    pub fn shutdown(&self) {
        self.accepting.store(false, Ordering::Release);
        let signalled = {
            let active = self.shared.active.lock();
            for task in active.values() {
                task.token.cancel();
            }
            active.len()
        };
        self.executor.close();
        info!(signalled, "coroutine task manager shut down");
    }

    /// Tasks scheduled and not yet finished.
    pub fn active_count(&self) -> usize {
        self.shared.active.lock().len()
    }

    /// Whether `task_id` is still running.
    pub fn is_active(&self, task_id: &TaskId) -> bool {
        self.shared.active.lock().contains_key(task_id)
    }

    /// Handles of every active task.
    pub fn active_tasks(&self) -> Vec<TaskHandle> {
        self.shared
            .active
            .lock()
            .values()
            .map(|task| task.handle.clone())
            .collect()
    }
}
