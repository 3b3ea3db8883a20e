//! Task identity, lifecycle and outcome types shared by both managers.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::error::TaskError;
use crate::util::clock::{now_ms, unix_secs};

/// Unique task identifier, formatted `task_<counter>_<unix_secs>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(String);

impl TaskId {
    /// Borrow the id as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TaskId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for TaskId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Which scheduler a task runs on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    /// Blocking callable on a worker thread.
    Blocking,
    /// Async callable on the event loop.
    Coroutine,
}

impl TaskKind {
    const fn label(self) -> &'static str {
        match self {
            Self::Blocking => "blocking",
            Self::Coroutine => "coroutine",
        }
    }
}

/// Lifecycle state of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Accepted, waiting for a worker or the loop.
    Submitted,
    /// Executing.
    Running,
    /// Finished with a value.
    Completed,
    /// Finished with an error.
    Failed,
    /// Cancelled before producing a result.
    Cancelled,
}

impl TaskStatus {
    /// Terminal states are final.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }
}

/// Identity and metadata of a submitted task, live while pending or running.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskHandle {
    /// Unique id within the owning manager.
    pub id: TaskId,
    /// Human-readable label.
    pub name: String,
    /// Scheduler kind.
    pub kind: TaskKind,
    /// Submission time in milliseconds since epoch.
    pub submitted_at_ms: u128,
}

/// Per-manager id source. Counter values are never reused.
#[derive(Debug, Default)]
pub(crate) struct TaskIdGenerator {
    counter: AtomicU64,
}

impl TaskIdGenerator {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Allocate a handle; `name` defaults to `<kind>-task-<counter>`.
    pub(crate) fn next_handle(&self, kind: TaskKind, name: Option<String>) -> TaskHandle {
        let n = self.counter.fetch_add(1, Ordering::Relaxed) + 1;
        TaskHandle {
            id: TaskId(format!("task_{n}_{}", unix_secs())),
            name: name.unwrap_or_else(|| format!("{}-task-{n}", kind.label())),
            kind,
            submitted_at_ms: now_ms(),
        }
    }
}

/// Cooperative cancellation flag handed to blocking jobs.
///
/// Jobs may poll [`CancelFlag::is_cancelled`] at convenient checkpoints; the
/// manager also consults it before starting and before emitting a result.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    /// Fresh, uncancelled flag.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether cancellation was requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    /// Request cancellation. Returns `true` only for the first request.
    pub fn cancel(&self) -> bool {
        !self.0.swap(true, Ordering::AcqRel)
    }
}

/// Immutable outcome of a finished task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskResult<T> {
    /// Id of the task that produced this result.
    pub task_id: TaskId,
    /// Task label.
    pub name: String,
    /// Value on success, typed error otherwise.
    pub outcome: Result<T, TaskError>,
    /// Wall time from start of execution to completion.
    pub duration: Duration,
    /// Completion time in milliseconds since epoch.
    pub completed_at_ms: u128,
}

impl<T> TaskResult<T> {
    pub(crate) fn new(handle: &TaskHandle, outcome: Result<T, TaskError>, duration: Duration) -> Self {
        Self {
            task_id: handle.id.clone(),
            name: handle.name.clone(),
            outcome,
            duration,
            completed_at_ms: now_ms(),
        }
    }

    /// Whether the task produced a value.
    #[must_use]
    pub const fn success(&self) -> bool {
        self.outcome.is_ok()
    }

    /// The value, present iff successful.
    #[must_use]
    pub fn value(&self) -> Option<&T> {
        self.outcome.as_ref().ok()
    }

    /// The error, present iff not successful.
    #[must_use]
    pub fn error(&self) -> Option<&TaskError> {
        self.outcome.as_ref().err()
    }

    /// Terminal status derived from the outcome.
    #[must_use]
    pub fn status(&self) -> TaskStatus {
        match &self.outcome {
            Ok(_) => TaskStatus::Completed,
            Err(err) if err.is_cancelled() => TaskStatus::Cancelled,
            Err(_) => TaskStatus::Failed,
        }
    }

    /// Same result with the value dropped, for completion notifications.
    #[must_use]
    pub fn summary(&self) -> TaskResult<()> {
        TaskResult {
            task_id: self.task_id.clone(),
            name: self.name.clone(),
            outcome: self.outcome.as_ref().map(|_| ()).map_err(Clone::clone),
            duration: self.duration,
            completed_at_ms: self.completed_at_ms,
        }
    }
}
