//! Resilient HTTP client: named sessions, tagged outcomes, per-call metrics.
//!
//! `request` never returns an error across its boundary. Transport failures
//! are carried inside [`HttpOutcome::Failed`]; `None` means no session could
//! be obtained at all. Every request is sent exactly once; retrying belongs
//! to the caller, using the session's `retry_attempts` as its budget.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use reqwest::Method;
use tracing::{debug, warn};

use super::session::{Session, SessionConfig};
use super::transport::{
    HttpError, HttpRequest, HttpResponse, RequestBody, ReqwestTransportFactory, TransportFactory,
};
use crate::config::HttpConfig;
use crate::util::PerformanceMetrics;

/// Session used when a request names none.
pub const DEFAULT_SESSION: &str = "default";

/// Per-request options.
#[derive(Debug, Clone, Default)]
pub struct RequestOptions {
    /// Session to send through; [`DEFAULT_SESSION`] when `None`.
    pub session_name: Option<String>,
    /// Extra headers.
    pub headers: Vec<(String, String)>,
    /// Query string pairs.
    pub query: Vec<(String, String)>,
    /// Optional body.
    pub body: Option<RequestBody>,
    /// Timeout for this call only.
    pub timeout: Option<Duration>,
}

impl RequestOptions {
    /// Empty options.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Send through the named session.
    #[must_use]
    pub fn session(mut self, name: impl Into<String>) -> Self {
        self.session_name = Some(name.into());
        self
    }

    /// Add a header.
    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Add a query pair.
    #[must_use]
    pub fn query(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((name.into(), value.into()));
        self
    }

    /// JSON body.
    #[must_use]
    pub fn json(mut self, value: serde_json::Value) -> Self {
        self.body = Some(RequestBody::Json(value));
        self
    }

    /// Raw body.
    #[must_use]
    pub fn body(mut self, bytes: impl Into<Vec<u8>>) -> Self {
        self.body = Some(RequestBody::Raw(bytes.into()));
        self
    }

    /// Per-call timeout.
    #[must_use]
    pub const fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// Either a response (any status) or a transport failure, never both.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HttpOutcome {
    /// A response arrived.
    Response(HttpResponse),
    /// No response arrived.
    Failed(HttpError),
}

impl HttpOutcome {
    /// Status code when a response arrived.
    #[must_use]
    pub const fn status(&self) -> Option<u16> {
        match self {
            Self::Response(response) => Some(response.status),
            Self::Failed(_) => None,
        }
    }

    /// A response arrived with `status < 400`.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        matches!(self, Self::Response(response) if response.is_success())
    }

    /// The response, if any.
    #[must_use]
    pub const fn response(&self) -> Option<&HttpResponse> {
        match self {
            Self::Response(response) => Some(response),
            Self::Failed(_) => None,
        }
    }

    /// The transport error, if any.
    #[must_use]
    pub const fn error(&self) -> Option<&HttpError> {
        match self {
            Self::Response(_) => None,
            Self::Failed(err) => Some(err),
        }
    }

    /// Convert into a `Result`, treating every response as `Ok`.
    ///
    /// # Errors
    ///
    /// The transport error for [`HttpOutcome::Failed`].
    pub fn into_result(self) -> Result<HttpResponse, HttpError> {
        match self {
            Self::Response(response) => Ok(response),
            Self::Failed(err) => Err(err),
        }
    }
}

/// HTTP client owning a set of named sessions.
pub struct ResilientHttpClient {
    config: HttpConfig,
    factory: Arc<dyn TransportFactory>,
    sessions: Mutex<HashMap<String, Arc<Session>>>,
    metrics: Arc<PerformanceMetrics>,
}

impl ResilientHttpClient {
    /// Client backed by reqwest.
    #[must_use]
    pub fn new(config: HttpConfig, metrics: Arc<PerformanceMetrics>) -> Self {
        Self::with_transport_factory(config, Arc::new(ReqwestTransportFactory), metrics)
    }

    /// Client whose sessions use transports from `factory`.
    #[must_use]
    pub fn with_transport_factory(
        config: HttpConfig,
        factory: Arc<dyn TransportFactory>,
        metrics: Arc<PerformanceMetrics>,
    ) -> Self {
        Self {
            config,
            factory,
            sessions: Mutex::new(HashMap::new()),
            metrics,
        }
    }

    /// Session defaults.
    #[must_use]
    pub const fn config(&self) -> &HttpConfig {
        &self.config
    }

    /// Metrics collector requests are recorded into.
    #[must_use]
    pub const fn metrics(&self) -> &Arc<PerformanceMetrics> {
        &self.metrics
    }

    /// Open session `name`, creating it if missing or closed.
    ///
    /// Overrides only apply when a session is created. Returns `None` if the
    /// transport cannot be constructed.
    pub fn get_session(
        &self,
        name: &str,
        timeout: Option<Duration>,
        retry_attempts: Option<u32>,
    ) -> Option<Arc<Session>> {
        let mut sessions = self.sessions.lock();
        if let Some(session) = sessions.get(name) {
            if !session.is_closed() {
                return Some(Arc::clone(session));
            }
            debug!(session = name, "replacing closed session");
        }

        let config = SessionConfig::from_http(&self.config, timeout, retry_attempts);
        match self.factory.create(&config) {
            Ok(transport) => {
                let session = Arc::new(Session::new(name, config, transport));
                sessions.insert(name.to_string(), Arc::clone(&session));
                debug!(session = name, "session created");
                Some(session)
            }
            Err(err) => {
                warn!(session = name, error = %err, "failed to create session");
                None
            }
        }
    }

    /// Issue one logical request and record it in the metrics.
    ///
    /// Returns `None` only when no session could be obtained.
    pub async fn request(&self, method: Method, url: &str, options: RequestOptions) -> Option<HttpOutcome> {
        let session_name = options.session_name.as_deref().unwrap_or(DEFAULT_SESSION);
        let session = self.get_session(session_name, None, None)?;

        let request = HttpRequest {
            method: method.clone(),
            url: url.to_string(),
            headers: options.headers,
            query: options.query,
            body: options.body,
            timeout: options.timeout,
        };
        let start = Instant::now();
        let result = session.send(request).await;
        let elapsed = start.elapsed();

        let status = result.as_ref().ok().map(|response| response.status);
        let success = result.as_ref().is_ok_and(HttpResponse::is_success);
        self.metrics
            .record_request(method.as_str(), url, elapsed, status, success);
        debug!(
            session = session.name(),
            %method,
            url,
            status,
            elapsed_ms = elapsed.as_millis(),
            "http request finished"
        );

        Some(match result {
            Ok(response) => HttpOutcome::Response(response),
            Err(err) => HttpOutcome::Failed(err),
        })
    }

    /// Close and forget session `name`. Unknown names are a no-op.
    pub fn close_session(&self, name: &str) {
        if let Some(session) = self.sessions.lock().remove(name) {
            session.close();
        }
    }

    /// Close every session.
    pub fn close_all_sessions(&self) {
        let sessions: Vec<_> = self.sessions.lock().drain().map(|(_, s)| s).collect();
        for session in sessions {
            session.close();
        }
    }

    /// Names of known sessions, sorted.
    #[must_use]
    pub fn session_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.sessions.lock().keys().cloned().collect();
        names.sort();
        names
    }
}
