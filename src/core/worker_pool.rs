//! Fixed-size pool of dedicated OS threads fed by a bounded channel.
//!
//! The pool is the execution substrate for [`BlockingTaskManager`] and for the
//! blocking bridge of [`CoroutineTaskManager`]. It knows nothing about task
//! ids, results or callbacks; it only runs boxed jobs.
//!
//! # Design Principles
//!
//! - **No polling**: workers block on channel `recv`; shutdown waits on an exit channel
//! - **Clean shutdown**: dropping the sender lets workers drain the queue and exit
//! - **Bounded drain**: `shutdown` never waits past its deadline; stragglers are detached
//!
//! [`BlockingTaskManager`]: crate::core::BlockingTaskManager
//! [`CoroutineTaskManager`]: crate::core::CoroutineTaskManager

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use parking_lot::Mutex;
use tracing::{debug, error, info, warn};

use super::error::ManagerError;

/// A unit of work executed on a pool thread.
pub(crate) type Job = Box<dyn FnOnce() + Send + 'static>;

/// Sizing for a [`WorkerPool`].
#[derive(Debug, Clone)]
pub(crate) struct PoolSettings {
    pub worker_count: usize,
    pub max_queue_depth: usize,
    pub thread_stack_size: usize,
    pub thread_name_prefix: String,
}

/// Statistics about pool utilization.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolStats {
    /// Number of worker threads.
    pub worker_count: usize,
    /// Jobs currently executing.
    pub busy_workers: u64,
    /// Jobs waiting in the queue.
    pub queued_jobs: u64,
    /// Jobs run to completion (including ones that panicked).
    pub executed_jobs: u64,
}

#[derive(Debug, Default)]
struct PoolCounters {
    busy: AtomicU64,
    queued: AtomicU64,
    executed: AtomicU64,
}

/// Worker pool with dedicated OS threads.
pub(crate) struct WorkerPool {
    settings: PoolSettings,
    /// Job sender. `None` once the pool is closed.
    job_tx: Mutex<Option<Sender<Job>>>,
    /// Each worker sends its id here right before its thread exits.
    exit_rx: Receiver<usize>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    counters: Arc<PoolCounters>,
    closed: AtomicBool,
}

impl WorkerPool {
    /// Spawn `settings.worker_count` threads.
    pub(crate) fn new(settings: PoolSettings) -> Result<Self, ManagerError> {
        if settings.worker_count == 0 {
            return Err(ManagerError::InvalidConfig(
                "worker_count must be greater than 0".into(),
            ));
        }
        if settings.max_queue_depth == 0 {
            return Err(ManagerError::InvalidConfig(
                "max_queue_depth must be greater than 0".into(),
            ));
        }

        let (job_tx, job_rx) = bounded::<Job>(settings.max_queue_depth);
        let (exit_tx, exit_rx) = bounded::<usize>(settings.worker_count);
        let counters = Arc::new(PoolCounters::default());

        let mut workers = Vec::with_capacity(settings.worker_count);
        for worker_id in 0..settings.worker_count {
            let worker = spawn_worker(
                worker_id,
                &settings,
                job_rx.clone(),
                exit_tx.clone(),
                Arc::clone(&counters),
            )?;
            workers.push(worker);
        }

        info!(
            worker_count = settings.worker_count,
            max_queue_depth = settings.max_queue_depth,
            prefix = %settings.thread_name_prefix,
            "worker pool initialized"
        );

        Ok(Self {
            settings,
            job_tx: Mutex::new(Some(job_tx)),
            exit_rx,
            workers: Mutex::new(workers),
            counters,
            closed: AtomicBool::new(false),
        })
    }

    /// Enqueue a job without blocking.
    ///
    /// # Errors
    ///
    /// - `ManagerError::QueueFull` if the queue is at capacity
    /// - `ManagerError::Shutdown` if the pool has been closed
    pub(crate) fn execute(&self, job: Job) -> Result<(), ManagerError> {
        let guard = self.job_tx.lock();
        let Some(tx) = guard.as_ref() else {
            return Err(ManagerError::Shutdown);
        };
        // Counted before the send so a fast worker never decrements first.
        self.counters.queued.fetch_add(1, Ordering::Relaxed);
        match tx.try_send(job) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => {
                self.counters.queued.fetch_sub(1, Ordering::Relaxed);
                warn!(prefix = %self.settings.thread_name_prefix, "worker pool queue is full");
                Err(ManagerError::QueueFull)
            }
            Err(TrySendError::Disconnected(_)) => {
                self.counters.queued.fetch_sub(1, Ordering::Relaxed);
                Err(ManagerError::Shutdown)
            }
        }
    }

    pub(crate) fn stats(&self) -> PoolStats {
        PoolStats {
            worker_count: self.settings.worker_count,
            busy_workers: self.counters.busy.load(Ordering::Relaxed),
            queued_jobs: self.counters.queued.load(Ordering::Relaxed),
            executed_jobs: self.counters.executed.load(Ordering::Relaxed),
        }
    }

    /// Stop accepting jobs. Workers still drain what is already queued.
    /// Returns `false` if the pool was already closed.
    pub(crate) fn close(&self) -> bool {
        if self.closed.swap(true, Ordering::AcqRel) {
            return false;
        }
        self.job_tx.lock().take();
        true
    }

    /// Close, then wait until `deadline` for every worker to exit.
    ///
    /// Workers still running at the deadline are detached, never killed.
    /// Returns `true` if all workers exited in time.
    pub(crate) fn shutdown(&self, drain_timeout: Duration) -> bool {
        self.close();
        // No deadline when the timeout does not fit in an `Instant`.
        let deadline = Instant::now().checked_add(drain_timeout);

        let mut workers = self.workers.lock();
        if workers.is_empty() {
            return true;
        }
        let mut exited = Vec::with_capacity(workers.len());
        while exited.len() < workers.len() {
            let received = match deadline {
                Some(deadline) => self.exit_rx.recv_deadline(deadline).ok(),
                None => self.exit_rx.recv().ok(),
            };
            match received {
                Some(worker_id) => exited.push(worker_id),
                None => break,
            }
        }

        let total = workers.len();
        for (worker_id, handle) in workers.drain(..).enumerate() {
            if exited.contains(&worker_id) {
                if handle.join().is_err() {
                    warn!(worker_id, "worker thread panicked");
                }
            } else {
                warn!(worker_id, "worker did not exit within drain timeout - detaching");
            }
        }

        let clean = exited.len() == total;
        info!(
            worker_count = total,
            exited = exited.len(),
            clean,
            "worker pool shut down"
        );
        clean
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        // Workers are detached rather than joined so a drop never blocks.
        if self.close() {
            debug!("worker pool dropped without explicit shutdown - workers detached");
        }
    }
}

fn spawn_worker(
    worker_id: usize,
    settings: &PoolSettings,
    job_rx: Receiver<Job>,
    exit_tx: Sender<usize>,
    counters: Arc<PoolCounters>,
) -> Result<JoinHandle<()>, ManagerError> {
    thread::Builder::new()
        .name(format!("{}-{worker_id}", settings.thread_name_prefix))
        .stack_size(settings.thread_stack_size)
        .spawn(move || {
            debug!(worker_id, "worker thread started");

            // recv() keeps yielding queued jobs after the sender is dropped
            // and only errors once the channel is empty.
            while let Ok(job) = job_rx.recv() {
                counters.queued.fetch_sub(1, Ordering::Relaxed);
                counters.busy.fetch_add(1, Ordering::Relaxed);

                // Jobs wrap their own user code; this guard only protects the
                // worker from a panicking wrapper.
                if catch_unwind(AssertUnwindSafe(job)).is_err() {
                    error!(worker_id, "job panicked outside its task wrapper");
                }

                counters.busy.fetch_sub(1, Ordering::Relaxed);
                counters.executed.fetch_add(1, Ordering::Relaxed);
            }

            debug!(worker_id, "worker channel closed, exiting");
            let _ = exit_tx.send(worker_id);
        })
        .map_err(|e| ManagerError::Internal(format!("failed to spawn worker thread: {e}")))
}
