//! Bearer token contract for authenticated API clients.

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tracing::debug;

use crate::cache::TtlCache;
use crate::util::now_ms;

/// A bearer token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    /// Raw token value.
    pub value: String,
    /// When the token was obtained (ms since epoch).
    pub obtained_at_ms: u128,
    /// How long the issuer said it stays valid, if known.
    pub expires_hint: Option<Duration>,
}

impl Token {
    /// Token obtained now, with no expiry hint.
    #[must_use]
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            obtained_at_ms: now_ms(),
            expires_hint: None,
        }
    }

    /// Attach an expiry hint.
    #[must_use]
    pub const fn with_expires_hint(mut self, hint: Duration) -> Self {
        self.expires_hint = Some(hint);
        self
    }

    /// `Authorization` header value.
    #[must_use]
    pub fn bearer(&self) -> String {
        format!("Bearer {}", self.value)
    }
}

/// Token acquisition failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TokenError {
    /// Credentials are missing; no request should be attempted.
    #[error("token provider is not configured")]
    NotConfigured,
    /// The issuer rejected the request or could not be reached.
    #[error("token acquisition failed: {0}")]
    Failed(String),
}

/// Source of bearer tokens, implemented outside this crate.
#[async_trait]
pub trait TokenProvider: Send + Sync {
    /// Whether credentials are present. Unconfigured providers fail fast.
    fn is_configured(&self) -> bool {
        true
    }

    /// Current token, possibly cached.
    async fn get_token(&self) -> Result<Token, TokenError>;

    /// Fresh token, bypassing any cache.
    async fn refresh_token(&self) -> Result<Token, TokenError>;
}

/// Memoizes another provider's token until its expiry hint elapses.
///
/// Tokens without a hint are kept until [`TokenProvider::refresh_token`]
/// is called.
pub struct CachedTokenProvider<P> {
    inner: P,
    cache: TtlCache<(), Token>,
}

impl<P: TokenProvider> CachedTokenProvider<P> {
    /// Wrap `inner`.
    #[must_use]
    pub fn new(inner: P) -> Self {
        Self {
            inner,
            cache: TtlCache::new(1, None),
        }
    }

    /// The wrapped provider.
    pub const fn inner(&self) -> &P {
        &self.inner
    }

    /// Drop the cached token.
    pub fn invalidate(&self) {
        self.cache.clear();
    }

    fn store(&self, token: &Token) {
        match token.expires_hint {
            Some(hint) => self.cache.set_with_ttl((), token.clone(), hint),
            None => self.cache.set((), token.clone()),
        }
    }
}

#[async_trait]
impl<P: TokenProvider> TokenProvider for CachedTokenProvider<P> {
    fn is_configured(&self) -> bool {
        self.inner.is_configured()
    }

    async fn get_token(&self) -> Result<Token, TokenError> {
        if let Some(token) = self.cache.get(&()) {
            return Ok(token);
        }
        let token = self.inner.get_token().await?;
        self.store(&token);
        Ok(token)
    }

    async fn refresh_token(&self) -> Result<Token, TokenError> {
        self.cache.clear();
        let token = self.inner.refresh_token().await?;
        self.store(&token);
        debug!("bearer token refreshed");
        Ok(token)
    }
}
