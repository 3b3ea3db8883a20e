//! Transport capability behind HTTP sessions.
//!
//! Sessions talk to the network only through [`HttpTransport`], so the client
//! and the authenticated API layer can be driven by an in-memory transport in
//! tests. [`ReqwestTransport`] is the production implementation.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Method;
use serde::de::DeserializeOwned;
use thiserror::Error;

use super::session::SessionConfig;
use crate::core::{ErrorKind, TaskError};

/// Request body variants.
#[derive(Debug, Clone, PartialEq)]
pub enum RequestBody {
    /// Serialized as JSON with a matching content type.
    Json(serde_json::Value),
    /// Sent as-is.
    Raw(Vec<u8>),
}

/// Transport-level request description.
#[derive(Debug, Clone)]
pub struct HttpRequest {
    /// HTTP method.
    pub method: Method,
    /// Absolute URL.
    pub url: String,
    /// Extra headers, in order.
    pub headers: Vec<(String, String)>,
    /// Query string pairs.
    pub query: Vec<(String, String)>,
    /// Optional body.
    pub body: Option<RequestBody>,
    /// Per-call timeout overriding the session default.
    pub timeout: Option<Duration>,
}

impl HttpRequest {
    /// Bare request with no headers, query or body.
    #[must_use]
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            headers: Vec::new(),
            query: Vec::new(),
            body: None,
            timeout: None,
        }
    }

    /// First header value matching `name`, case-insensitively.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

/// A fully read response.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HttpResponse {
    /// Status code.
    pub status: u16,
    /// Response headers, lowercase names.
    pub headers: HashMap<String, String>,
    /// Raw body bytes.
    pub body: Vec<u8>,
}

impl HttpResponse {
    /// Response with the given status and body.
    #[must_use]
    pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            headers: HashMap::new(),
            body: body.into(),
        }
    }

    /// `status < 400`.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.status < 400
    }

    /// Body decoded as UTF-8, lossily.
    #[must_use]
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    /// Body parsed as JSON.
    ///
    /// # Errors
    ///
    /// Returns the parser error for malformed or mismatched bodies.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_slice(&self.body)
    }
}

/// Failures below the HTTP status level. All are network-class errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HttpError {
    /// The request exceeded its timeout.
    #[error("request timed out: {0}")]
    Timeout(String),
    /// Connection or DNS failure.
    #[error("connection failed: {0}")]
    Connect(String),
    /// Request could not be built or sent.
    #[error("request failed: {0}")]
    Request(String),
    /// The response body could not be read.
    #[error("failed to read response body: {0}")]
    Body(String),
    /// The session was closed before the call.
    #[error("session '{0}' is closed")]
    SessionClosed(String),
}

impl HttpError {
    /// Whether a fresh attempt could plausibly succeed.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Timeout(_) | Self::Connect(_))
    }
}

impl From<HttpError> for TaskError {
    fn from(err: HttpError) -> Self {
        Self::new(ErrorKind::Network, err.to_string())
    }
}

/// Sends requests for a session.
#[async_trait]
pub trait HttpTransport: Send + Sync {
    /// Send `request` and read the whole response.
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, HttpError>;
}

/// Creates a transport for each new session.
pub trait TransportFactory: Send + Sync {
    /// Build a transport honoring `config`'s timeout and pool limit.
    ///
    /// # Errors
    ///
    /// `HttpError::Request` if the underlying client cannot be constructed.
    fn create(&self, config: &SessionConfig) -> Result<Arc<dyn HttpTransport>, HttpError>;
}

/// Pooled `reqwest` client.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    /// Build a client for `config`.
    ///
    /// # Errors
    ///
    /// `HttpError::Request` if reqwest rejects the configuration.
    pub fn new(config: &SessionConfig) -> Result<Self, HttpError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .pool_max_idle_per_host(config.pool_limit)
            .build()
            .map_err(|e| HttpError::Request(format!("failed to create HTTP client: {e}")))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, HttpError> {
        let mut builder = self.client.request(request.method, &request.url);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        match request.body {
            Some(RequestBody::Json(value)) => builder = builder.json(&value),
            Some(RequestBody::Raw(bytes)) => builder = builder.body(bytes),
            None => {}
        }
        if let Some(timeout) = request.timeout {
            builder = builder.timeout(timeout);
        }

        let response = builder.send().await.map_err(map_reqwest_error)?;
        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|value| (name.as_str().to_string(), value.to_string()))
            })
            .collect();
        let body = response.bytes().await.map_err(map_reqwest_error)?.to_vec();
        Ok(HttpResponse {
            status,
            headers,
            body,
        })
    }
}

fn map_reqwest_error(err: reqwest::Error) -> HttpError {
    if err.is_timeout() {
        HttpError::Timeout(err.to_string())
    } else if err.is_connect() {
        HttpError::Connect(err.to_string())
    } else if err.is_body() || err.is_decode() {
        HttpError::Body(err.to_string())
    } else {
        HttpError::Request(err.to_string())
    }
}

/// Factory producing one [`ReqwestTransport`] per session.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReqwestTransportFactory;

impl TransportFactory for ReqwestTransportFactory {
    fn create(&self, config: &SessionConfig) -> Result<Arc<dyn HttpTransport>, HttpError> {
        Ok(Arc::new(ReqwestTransport::new(config)?))
    }
}
