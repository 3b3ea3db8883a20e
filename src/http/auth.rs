//! Authenticated JSON API client with a single token refresh on 401.
//!
//! A logical call makes at most two HTTP attempts:
//!
//! 1. fetch a bearer token (fail fast when the provider is unconfigured)
//! 2. send the request
//! 3. on a first 401, refresh the token once and send again
//! 4. a second 401 is an [`ApiError::Auth`]; any other status `>= 400` is an
//!    [`ApiError::Api`] carrying a truncated body
//!
//! Successful empty bodies decode to `None`. Every failure is returned as an
//! [`ApiError`]; nothing panics across this boundary.

use std::sync::Arc;

use reqwest::Method;
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use thiserror::Error;
use tracing::{debug, warn};

use super::client::{RequestOptions, ResilientHttpClient, DEFAULT_SESSION};
use super::token::{TokenError, TokenProvider};
use super::transport::{HttpError, HttpResponse};
use crate::core::{ErrorKind, TaskError};

const DEFAULT_MAX_ERROR_BODY_CHARS: usize = 500;

/// Failure of an authenticated API call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ApiError {
    /// A dependency or credential is missing. No request was sent.
    #[error("API client is not configured: {0}")]
    Configuration(String),
    /// No response arrived.
    #[error("network error during {method} {url}: {source}")]
    Network {
        /// HTTP method.
        method: String,
        /// Request URL.
        url: String,
        /// Transport failure.
        source: HttpError,
    },
    /// Still unauthorized after the permitted refresh, or the refresh failed.
    #[error("authentication failed for {method} {url}: {message}")]
    Auth {
        /// HTTP method.
        method: String,
        /// Request URL.
        url: String,
        /// What went wrong.
        message: String,
    },
    /// Any other error status.
    #[error("API request failed with status {status}: {method} {url}")]
    Api {
        /// Response status.
        status: u16,
        /// HTTP method.
        method: String,
        /// Request URL.
        url: String,
        /// Response body, truncated.
        body: String,
    },
    /// Successful status with a body that is not valid JSON.
    #[error("invalid JSON in response from {method} {url}: {message}")]
    Decode {
        /// HTTP method.
        method: String,
        /// Request URL.
        url: String,
        /// Parser message.
        message: String,
    },
}

impl ApiError {
    /// Classification for UI handling.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Configuration(_) => ErrorKind::Configuration,
            Self::Network { .. } => ErrorKind::Network,
            Self::Auth { .. } => ErrorKind::Auth,
            Self::Api { .. } => ErrorKind::Api,
            Self::Decode { .. } => ErrorKind::Decode,
        }
    }

    /// Response status for [`ApiError::Api`].
    #[must_use]
    pub const fn status(&self) -> Option<u16> {
        match self {
            Self::Api { status, .. } => Some(*status),
            _ => None,
        }
    }
}

impl From<ApiError> for TaskError {
    fn from(err: ApiError) -> Self {
        let message = err.to_string();
        let kind = err.kind();
        match err {
            ApiError::Api {
                status,
                method,
                url,
                body,
            } => Self::new(kind, message).with_details(json!({
                "status": status,
                "method": method,
                "url": url,
                "body": body,
            })),
            ApiError::Auth { method, url, .. }
            | ApiError::Network { method, url, .. }
            | ApiError::Decode { method, url, .. } => {
                Self::new(kind, message).with_details(json!({ "method": method, "url": url }))
            }
            ApiError::Configuration(_) => Self::new(kind, message),
        }
    }
}

/// JSON API client authenticating every call with a bearer token.
pub struct AuthenticatedApiClient {
    base_url: String,
    http: Arc<ResilientHttpClient>,
    tokens: Arc<dyn TokenProvider>,
    session_name: String,
    max_error_body_chars: usize,
}

impl AuthenticatedApiClient {
    /// Client for endpoints under `base_url`.
    #[must_use]
    pub fn new(
        base_url: impl Into<String>,
        http: Arc<ResilientHttpClient>,
        tokens: Arc<dyn TokenProvider>,
    ) -> Self {
        let max_error_body_chars = http.config().max_error_body_chars;
        Self {
            base_url: base_url.into(),
            http,
            tokens,
            session_name: DEFAULT_SESSION.to_string(),
            max_error_body_chars: if max_error_body_chars == 0 {
                DEFAULT_MAX_ERROR_BODY_CHARS
            } else {
                max_error_body_chars
            },
        }
    }

    /// Send through a dedicated session.
    #[must_use]
    pub fn with_session(mut self, name: impl Into<String>) -> Self {
        self.session_name = name.into();
        self
    }

    /// Base URL endpoints are joined onto.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Absolute URL for `endpoint`. Absolute endpoints are used as-is.
    #[must_use]
    pub fn url_for(&self, endpoint: &str) -> String {
        if endpoint.starts_with("http://") || endpoint.starts_with("https://") {
            return endpoint.to_string();
        }
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            endpoint.trim_start_matches('/')
        )
    }

    /// Perform one authenticated call.
    ///
    /// `data` is sent as a JSON body for methods other than GET and HEAD.
    /// Returns `Ok(None)` for a successful empty body.
    ///
    /// # Errors
    ///
    /// See [`ApiError`] for the failure classes.
    pub async fn request(
        &self,
        method: Method,
        endpoint: &str,
        data: Option<&Value>,
        params: Option<&[(&str, &str)]>,
    ) -> Result<Option<Value>, ApiError> {
        if !self.tokens.is_configured() {
            return Err(ApiError::Configuration(
                "token provider has no credentials".into(),
            ));
        }
        let url = self.url_for(endpoint);
        let mut token = self
            .tokens
            .get_token()
            .await
            .map_err(|e| token_error(e, &method, &url))?;

        let mut refreshed = false;
        loop {
            let mut options = RequestOptions::new()
                .session(self.session_name.clone())
                .header("Authorization", token.bearer())
                .header("Accept", "application/json");
            if let Some(params) = params {
                for (name, value) in params {
                    options = options.query(*name, *value);
                }
            }
            if let Some(data) = data {
                if method != Method::GET && method != Method::HEAD {
                    options = options.json(data.clone());
                }
            }

            debug!(%method, url = %url, refreshed, "sending authenticated request");
            let outcome = self
                .http
                .request(method.clone(), &url, options)
                .await
                .ok_or_else(|| {
                    ApiError::Configuration(format!(
                        "no HTTP session '{}' available",
                        self.session_name
                    ))
                })?;
            let response = outcome.into_result().map_err(|source| ApiError::Network {
                method: method.to_string(),
                url: url.clone(),
                source,
            })?;

            if response.status == 401 {
                if refreshed {
                    return Err(ApiError::Auth {
                        method: method.to_string(),
                        url,
                        message: "still unauthorized after token refresh".into(),
                    });
                }
                warn!(%method, url = %url, "received 401, refreshing token");
                token = self
                    .tokens
                    .refresh_token()
                    .await
                    .map_err(|e| token_error(e, &method, &url))?;
                refreshed = true;
                continue;
            }

            if !response.is_success() {
                return Err(ApiError::Api {
                    status: response.status,
                    method: method.to_string(),
                    url,
                    body: truncate_chars(&response.text(), self.max_error_body_chars),
                });
            }
            return decode_body(&response, &method, &url);
        }
    }

    /// Typed variant of [`AuthenticatedApiClient::request`].
    ///
    /// # Errors
    ///
    /// As `request`, plus [`ApiError::Decode`] when the JSON does not match `D`.
    pub async fn request_as<D: DeserializeOwned>(
        &self,
        method: Method,
        endpoint: &str,
        data: Option<&Value>,
        params: Option<&[(&str, &str)]>,
    ) -> Result<Option<D>, ApiError> {
        let url = self.url_for(endpoint);
        let value = self.request(method.clone(), endpoint, data, params).await?;
        value
            .map(serde_json::from_value)
            .transpose()
            .map_err(|e| ApiError::Decode {
                method: method.to_string(),
                url,
                message: e.to_string(),
            })
    }

    /// `GET endpoint`.
    ///
    /// # Errors
    ///
    /// See [`AuthenticatedApiClient::request`].
    pub async fn get(&self, endpoint: &str, params: Option<&[(&str, &str)]>) -> Result<Option<Value>, ApiError> {
        self.request(Method::GET, endpoint, None, params).await
    }

    /// `POST endpoint` with a JSON body.
    ///
    /// # Errors
    ///
    /// See [`AuthenticatedApiClient::request`].
    pub async fn post(&self, endpoint: &str, data: &Value) -> Result<Option<Value>, ApiError> {
        self.request(Method::POST, endpoint, Some(data), None).await
    }

    /// `PUT endpoint` with a JSON body.
    ///
    /// # Errors
    ///
    /// See [`AuthenticatedApiClient::request`].
    pub async fn put(&self, endpoint: &str, data: &Value) -> Result<Option<Value>, ApiError> {
        self.request(Method::PUT, endpoint, Some(data), None).await
    }

    /// `PATCH endpoint` with a JSON body.
    ///
    /// # Errors
    ///
    /// See [`AuthenticatedApiClient::request`].
    pub async fn patch(&self, endpoint: &str, data: &Value) -> Result<Option<Value>, ApiError> {
        self.request(Method::PATCH, endpoint, Some(data), None).await
    }

    /// `DELETE endpoint`.
    ///
    /// # Errors
    ///
    /// See [`AuthenticatedApiClient::request`].
    pub async fn delete(&self, endpoint: &str) -> Result<Option<Value>, ApiError> {
        self.request(Method::DELETE, endpoint, None, None).await
    }
}

fn token_error(err: TokenError, method: &Method, url: &str) -> ApiError {
    match err {
        TokenError::NotConfigured => ApiError::Configuration(err.to_string()),
        TokenError::Failed(message) => ApiError::Auth {
            method: method.to_string(),
            url: url.to_string(),
            message,
        },
    }
}

fn decode_body(response: &HttpResponse, method: &Method, url: &str) -> Result<Option<Value>, ApiError> {
    if response.body.iter().all(u8::is_ascii_whitespace) {
        return Ok(None);
    }
    serde_json::from_slice(&response.body)
        .map(Some)
        .map_err(|e| ApiError::Decode {
            method: method.to_string(),
            url: url.to_string(),
            message: e.to_string(),
        })
}

fn truncate_chars(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}
