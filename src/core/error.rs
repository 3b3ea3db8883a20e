//! Error types for task execution and manager operations.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Classification of a task failure.
///
/// UI collaborators map these to user-facing behavior: `Auth` prompts for
/// credentials, `Network`/`Api` offer retry-or-dismiss, `Cancelled` is silent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// A required dependency or credential is missing.
    Configuration,
    /// Connection, DNS or transport timeout failure.
    Network,
    /// Authorization still rejected after the permitted token refresh.
    Auth,
    /// Any other 4xx/5xx response.
    Api,
    /// Successful status with an unparseable body.
    Decode,
    /// The task was cancelled.
    Cancelled,
    /// A wait deadline elapsed.
    Timeout,
    /// Unexpected failure, including panics inside task bodies.
    Internal,
}

impl ErrorKind {
    /// Stable snake_case name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Configuration => "configuration",
            Self::Network => "network",
            Self::Auth => "auth",
            Self::Api => "api",
            Self::Decode => "decode",
            Self::Cancelled => "cancelled",
            Self::Timeout => "timeout",
            Self::Internal => "internal",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Typed failure carried by a task result.
#[derive(Debug, Clone, PartialEq, Error, Serialize, Deserialize)]
#[error("{kind} error: {message}")]
pub struct TaskError {
    /// Failure classification.
    pub kind: ErrorKind,
    /// Human-readable message.
    pub message: String,
    /// Optional structured context (status code, url, ...).
    pub details: Option<serde_json::Value>,
}

impl TaskError {
    /// Build an error of the given kind.
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            details: None,
        }
    }

    /// Attach structured details.
    #[must_use]
    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }

    /// Cancellation marker error.
    #[must_use]
    pub fn cancelled() -> Self {
        Self::new(ErrorKind::Cancelled, "task was cancelled")
    }

    /// Internal error with the given message.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Internal, message)
    }

    /// Build an internal error from a caught panic payload.
    #[must_use]
    pub fn from_panic(payload: &(dyn std::any::Any + Send)) -> Self {
        let message = payload
            .downcast_ref::<&str>()
            .map(|s| (*s).to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "unknown panic payload".to_string());
        Self::internal(format!("task panicked: {message}"))
    }

    /// True when this error represents cancellation rather than failure.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.kind == ErrorKind::Cancelled
    }
}

impl From<anyhow::Error> for TaskError {
    fn from(err: anyhow::Error) -> Self {
        Self::internal(format!("{err:#}"))
    }
}

impl From<String> for TaskError {
    fn from(message: String) -> Self {
        Self::internal(message)
    }
}

impl From<&str> for TaskError {
    fn from(message: &str) -> Self {
        Self::internal(message)
    }
}

/// Errors returned by the task managers at submission time.
#[derive(Debug, Error)]
pub enum ManagerError {
    /// The submission queue is full.
    #[error("task queue is full")]
    QueueFull,
    /// The manager has been shut down.
    #[error("task manager has been shut down")]
    Shutdown,
    /// Configuration validation failed.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    /// Internal failure (thread spawn, runtime unavailable, ...).
    #[error("internal error: {0}")]
    Internal(String),
}

/// Application-facing result using anyhow for higher-level contexts.
pub type AppResult<T> = Result<T, anyhow::Error>;
