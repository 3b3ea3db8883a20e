//! Scripted HTTP transport and token provider shared by the HTTP tests.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use dealerdesk_core::http::{
    HttpError, HttpRequest, HttpResponse, HttpTransport, SessionConfig, Token, TokenError,
    TokenProvider, TransportFactory,
};
use parking_lot::Mutex;

/// Replays a fixed script of responses and records every request.
#[derive(Default)]
pub struct ScriptedTransport {
    script: Mutex<VecDeque<Result<HttpResponse, HttpError>>>,
    requests: Mutex<Vec<HttpRequest>>,
}

impl ScriptedTransport {
    pub fn new(script: Vec<Result<HttpResponse, HttpError>>) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(script.into()),
            requests: Mutex::new(Vec::new()),
        })
    }

    /// Script of bare status codes with the given bodies.
    pub fn statuses(script: &[(u16, &str)]) -> Arc<Self> {
        Self::new(
            script
                .iter()
                .map(|(status, body)| Ok(HttpResponse::new(*status, body.as_bytes().to_vec())))
                .collect(),
        )
    }

    pub fn calls(&self) -> usize {
        self.requests.lock().len()
    }

    pub fn requests(&self) -> Vec<HttpRequest> {
        self.requests.lock().clone()
    }
}

#[async_trait]
impl HttpTransport for ScriptedTransport {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, HttpError> {
        self.requests.lock().push(request);
        self.script
            .lock()
            .pop_front()
            .unwrap_or_else(|| Err(HttpError::Request("script exhausted".into())))
    }
}

/// Hands the same scripted transport to every session it creates.
pub struct ScriptedFactory {
    transport: Arc<ScriptedTransport>,
    created: AtomicUsize,
    fail: bool,
}

impl ScriptedFactory {
    pub fn new(transport: Arc<ScriptedTransport>) -> Arc<Self> {
        Arc::new(Self {
            transport,
            created: AtomicUsize::new(0),
            fail: false,
        })
    }

    pub fn failing() -> Arc<Self> {
        Arc::new(Self {
            transport: ScriptedTransport::new(Vec::new()),
            created: AtomicUsize::new(0),
            fail: true,
        })
    }

    pub fn created(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }
}

impl TransportFactory for ScriptedFactory {
    fn create(&self, _config: &SessionConfig) -> Result<Arc<dyn HttpTransport>, HttpError> {
        if self.fail {
            return Err(HttpError::Request("no HTTP backend".into()));
        }
        self.created.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::clone(&self.transport) as Arc<dyn HttpTransport>)
    }
}

/// Token provider counting its calls.
pub struct CountingTokens {
    configured: bool,
    refresh_fails: bool,
    pub gets: AtomicUsize,
    pub refreshes: AtomicUsize,
}

impl CountingTokens {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            configured: true,
            refresh_fails: false,
            gets: AtomicUsize::new(0),
            refreshes: AtomicUsize::new(0),
        })
    }

    pub fn unconfigured() -> Arc<Self> {
        Arc::new(Self {
            configured: false,
            refresh_fails: false,
            gets: AtomicUsize::new(0),
            refreshes: AtomicUsize::new(0),
        })
    }

    pub fn with_failing_refresh() -> Arc<Self> {
        Arc::new(Self {
            configured: true,
            refresh_fails: true,
            gets: AtomicUsize::new(0),
            refreshes: AtomicUsize::new(0),
        })
    }

    pub fn refreshes(&self) -> usize {
        self.refreshes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TokenProvider for CountingTokens {
    fn is_configured(&self) -> bool {
        self.configured
    }

    async fn get_token(&self) -> Result<Token, TokenError> {
        self.gets.fetch_add(1, Ordering::SeqCst);
        Ok(Token::new("initial-token"))
    }

    async fn refresh_token(&self) -> Result<Token, TokenError> {
        let n = self.refreshes.fetch_add(1, Ordering::SeqCst) + 1;
        if self.refresh_fails {
            return Err(TokenError::Failed("refresh token revoked".into()));
        }
        Ok(Token::new(format!("refreshed-token-{n}")))
    }
}
