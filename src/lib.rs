//! # DealerDesk Core
//!
//! Background task execution core for the DealerDesk dealer-management desktop
//! application.
//!
//! The UI runs on a single thread and must never block. This crate gives it
//! two schedulers and an HTTP layer to hand work to:
//!
//! - **[`BlockingTaskManager`](core::BlockingTaskManager)**: blocking callables
//!   on a bounded pool of OS threads, with result/error/finished callbacks and
//!   cooperative cancellation
//! - **[`CoroutineTaskManager`](core::CoroutineTaskManager)**: async callables
//!   on a tokio event loop, with retained results, `wait` with timeout,
//!   cancellation and a bridge for blocking work
//! - **[`ResilientHttpClient`](http::ResilientHttpClient)**: named,
//!   connection-pooled sessions returning tagged outcomes and feeding
//!   [`PerformanceMetrics`](util::PerformanceMetrics)
//! - **[`AuthenticatedApiClient`](http::AuthenticatedApiClient)**: bearer-token
//!   JSON calls that refresh the token once on a 401
//! - **[`TtlCache`](cache::TtlCache)**: bounded LRU cache with per-entry TTL
//!
//! ## Blocking work
//!
//! ```rust,no_run
//! use dealerdesk_core::config::BlockingManagerConfig;
//! use dealerdesk_core::core::{BlockingTaskManager, TaskCallbacks, TaskError};
//!
//! let manager = BlockingTaskManager::new(&BlockingManagerConfig::default())?;
//! let (tx, rx) = std::sync::mpsc::channel();
//!
//! manager.run_named(
//!     "import-inventory",
//!     |cancel| {
//!         let mut rows = 0u64;
//!         while rows < 10_000 && !cancel.is_cancelled() {
//!             rows += 1;
//!         }
//!         Ok::<_, TaskError>(rows)
//!     },
//!     TaskCallbacks::new().on_result(move |rows| {
//!         // Marshal back to the UI thread.
//!         let _ = tx.send(rows);
//!     }),
//! )?;
//!
//! let rows = rx.recv()?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! ## Async work
//!
//! ```rust,no_run
//! use std::time::Duration;
//! use dealerdesk_core::config::CoroutineManagerConfig;
//! use dealerdesk_core::core::{CoroutineTaskManager, TaskError};
//!
//! # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
//! let manager = CoroutineTaskManager::<u32>::current(&CoroutineManagerConfig::default())?;
//! let id = manager.run(|_cancel| async { Ok::<_, TaskError>(42) })?;
//! let result = manager.wait(&id, Some(Duration::from_secs(5))).await;
//! assert_eq!(result.and_then(|r| r.value().copied()), Some(42));
//! # Ok(())
//! # }
//! ```
//!
//! Components are normally obtained from a single
//! [`AppContext`](builders::AppContext) built at startup.

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

/// Task identity, results, errors and the task managers.
pub mod core;
/// TTL-aware LRU cache.
pub mod cache;
/// Configuration models with defaults, validation and env overrides.
pub mod config;
/// Application context construction.
pub mod builders;
/// Outbound HTTP sessions and the authenticated API client.
pub mod http;
/// Event loop wrapper over tokio.
pub mod runtime;
/// Clock helpers, metrics and tracing setup.
pub mod util;
