//! Task execution: identity, results, errors and the two task managers.

pub mod blocking;
pub mod coroutine;
pub mod error;
pub mod task;
mod worker_pool;

pub use blocking::{BlockingTaskManager, ManagerStats, TaskCallbacks};
pub use coroutine::CoroutineTaskManager;
pub use error::{AppResult, ErrorKind, ManagerError, TaskError};
pub use task::{CancelFlag, TaskHandle, TaskId, TaskKind, TaskResult, TaskStatus};
pub use worker_pool::PoolStats;
