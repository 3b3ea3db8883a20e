//! Tokio event loop handle used by the coroutine task manager.

use std::future::Future;
use std::sync::Arc;

use tokio::runtime::{Handle, Runtime};
use tokio::task::JoinHandle;

use crate::core::ManagerError;

/// Event loop that coroutine tasks are spawned onto.
///
/// Either borrows an existing tokio runtime through its [`Handle`] or owns a
/// dedicated multi-threaded runtime. An owned runtime is shut down when the
/// last clone is dropped, which must happen outside of async context.
#[derive(Clone, Debug)]
pub struct EventLoop {
    handle: Handle,
    owned: Option<Arc<Runtime>>,
}

impl EventLoop {
    /// Wrap an existing runtime handle.
    #[must_use]
    pub const fn from_handle(handle: Handle) -> Self {
        Self {
            handle,
            owned: None,
        }
    }

    /// Use the runtime the caller is currently running inside.
    ///
    /// # Errors
    ///
    /// `ManagerError::Internal` when called outside a tokio runtime.
    pub fn current() -> Result<Self, ManagerError> {
        Handle::try_current()
            .map(Self::from_handle)
            .map_err(|e| ManagerError::Internal(format!("no tokio runtime available: {e}")))
    }

    /// Build and own a multi-threaded runtime with `worker_threads` threads.
    ///
    /// # Errors
    ///
    /// `ManagerError::Internal` if the runtime cannot be built.
    pub fn with_worker_threads(worker_threads: usize) -> Result<Self, ManagerError> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(worker_threads.max(1))
            .thread_name("dd-event-loop")
            .enable_all()
            .build()
            .map_err(|e| ManagerError::Internal(format!("failed to build runtime: {e}")))?;
        Ok(Self {
            handle: runtime.handle().clone(),
            owned: Some(Arc::new(runtime)),
        })
    }

    /// Owned runtime sized to the host's logical CPUs.
    ///
    /// # Errors
    ///
    /// `ManagerError::Internal` if the runtime cannot be built.
    pub fn for_host() -> Result<Self, ManagerError> {
        Self::with_worker_threads(num_cpus::get())
    }

    /// The underlying runtime handle.
    #[must_use]
    pub const fn handle(&self) -> &Handle {
        &self.handle
    }

    /// Whether this loop owns its runtime.
    #[must_use]
    pub const fn is_owned(&self) -> bool {
        self.owned.is_some()
    }

    /// Spawn a future onto the loop.
    pub fn spawn<F>(&self, fut: F) -> JoinHandle<F::Output>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        self.handle.spawn(fut)
    }

    /// Run a future to completion from synchronous code (e.g. the UI thread).
    ///
    /// Must not be called from inside the loop's own async context.
    pub fn block_on<F: Future>(&self, fut: F) -> F::Output {
        self.handle.block_on(fut)
    }
}
