//! Named HTTP sessions.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use super::transport::{HttpError, HttpRequest, HttpResponse, HttpTransport};
use crate::config::HttpConfig;

/// Per-session settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    /// Total request timeout.
    pub timeout: Duration,
    /// Idle connections kept per host.
    pub pool_limit: usize,
    /// Retry budget advertised to callers. Requests themselves are sent once.
    pub retry_attempts: u32,
}

impl SessionConfig {
    /// Defaults taken from `config`, with optional overrides.
    #[must_use]
    pub const fn from_http(config: &HttpConfig, timeout: Option<Duration>, retry_attempts: Option<u32>) -> Self {
        Self {
            timeout: match timeout {
                Some(timeout) => timeout,
                None => config.default_timeout(),
            },
            pool_limit: config.pool_limit,
            retry_attempts: match retry_attempts {
                Some(attempts) => attempts,
                None => config.retry_attempts,
            },
        }
    }
}

/// A connection-pooled session owned by a
/// [`ResilientHttpClient`](super::ResilientHttpClient).
pub struct Session {
    name: String,
    config: SessionConfig,
    transport: Arc<dyn HttpTransport>,
    closed: AtomicBool,
}

impl Session {
    pub(crate) fn new(name: impl Into<String>, config: SessionConfig, transport: Arc<dyn HttpTransport>) -> Self {
        Self {
            name: name.into(),
            config,
            transport,
            closed: AtomicBool::new(false),
        }
    }

    /// Session name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Settings the session was created with.
    #[must_use]
    pub const fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Whether [`Session::close`] has been called.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Mark closed. Returns `false` if it already was.
    pub fn close(&self) -> bool {
        let first = !self.closed.swap(true, Ordering::AcqRel);
        if first {
            debug!(session = %self.name, "session closed");
        }
        first
    }

    /// Send through this session's transport.
    ///
    /// # Errors
    ///
    /// `HttpError::SessionClosed` after close, otherwise whatever the transport reports.
    pub async fn send(&self, request: HttpRequest) -> Result<HttpResponse, HttpError> {
        if self.is_closed() {
            return Err(HttpError::SessionClosed(self.name.clone()));
        }
        self.transport.send(request).await
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("name", &self.name)
            .field("config", &self.config)
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}
