//! Application context: one instance of each core component, built from config.
//!
//! Replaces process-wide singletons. Build one [`AppContext`] at startup and
//! pass it (or the `Arc`s it hands out) to the UI layer.

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tracing::info;

use crate::cache::TtlCache;
use crate::config::CoreConfig;
use crate::core::{BlockingTaskManager, CoroutineTaskManager, ManagerError};
use crate::http::{AuthenticatedApiClient, ResilientHttpClient, TokenProvider, TransportFactory};
use crate::runtime::EventLoop;
use crate::util::PerformanceMetrics;

/// Builder for [`AppContext`].
#[derive(Default)]
pub struct AppContextBuilder {
    config: CoreConfig,
    event_loop: Option<EventLoop>,
    transport_factory: Option<Arc<dyn TransportFactory>>,
}

impl AppContextBuilder {
    /// Builder with default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Use `config` instead of the defaults.
    #[must_use]
    pub fn with_config(mut self, config: CoreConfig) -> Self {
        self.config = config;
        self
    }

    /// Spawn coroutine tasks onto `event_loop`.
    ///
    /// Defaults to the current runtime, or a dedicated one sized to the host.
    #[must_use]
    pub fn with_event_loop(mut self, event_loop: EventLoop) -> Self {
        self.event_loop = Some(event_loop);
        self
    }

    /// Create HTTP sessions with `factory` instead of reqwest.
    #[must_use]
    pub fn with_transport_factory(mut self, factory: Arc<dyn TransportFactory>) -> Self {
        self.transport_factory = Some(factory);
        self
    }

    /// Validate the config and construct every component.
    ///
    /// # Errors
    ///
    /// `ManagerError::InvalidConfig` for invalid settings, `ManagerError::Internal`
    /// if threads or the runtime cannot be started.
    pub fn build(self) -> Result<AppContext, ManagerError> {
        self.config.validate().map_err(ManagerError::InvalidConfig)?;

        let event_loop = match self.event_loop {
            Some(event_loop) => event_loop,
            None => EventLoop::current().or_else(|_| EventLoop::for_host())?,
        };
        let blocking = Arc::new(BlockingTaskManager::new(&self.config.blocking)?);
        let coroutines = Arc::new(CoroutineTaskManager::new(
            event_loop.clone(),
            &self.config.coroutine,
        )?);
        let metrics = Arc::new(PerformanceMetrics::new());
        let http = Arc::new(match self.transport_factory {
            Some(factory) => ResilientHttpClient::with_transport_factory(
                self.config.http.clone(),
                factory,
                Arc::clone(&metrics),
            ),
            None => ResilientHttpClient::new(self.config.http.clone(), Arc::clone(&metrics)),
        });
        let cache = Arc::new(TtlCache::new(
            self.config.cache.max_size,
            self.config.cache.default_ttl(),
        ));

        info!(
            blocking_workers = self.config.blocking.worker_count,
            executor_threads = self.config.coroutine.executor_threads,
            owned_event_loop = event_loop.is_owned(),
            "application context initialized"
        );

        Ok(AppContext {
            config: self.config,
            event_loop,
            blocking,
            coroutines,
            metrics,
            http,
            cache,
        })
    }
}

/// Shared handles to the task managers, HTTP client, metrics and lookup cache.
///
/// When the context owns its event loop, drop it outside async code.
pub struct AppContext {
    config: CoreConfig,
    event_loop: EventLoop,
    blocking: Arc<BlockingTaskManager>,
    coroutines: Arc<CoroutineTaskManager>,
    metrics: Arc<PerformanceMetrics>,
    http: Arc<ResilientHttpClient>,
    cache: Arc<TtlCache<String, Value>>,
}

impl AppContext {
    /// Start a builder.
    #[must_use]
    pub fn builder() -> AppContextBuilder {
        AppContextBuilder::new()
    }

    /// Context built from `DEALERDESK_*` environment variables.
    ///
    /// # Errors
    ///
    /// `ManagerError::InvalidConfig` if a variable fails to parse or validate.
    pub fn from_env() -> Result<Self, ManagerError> {
        let config = CoreConfig::from_env().map_err(ManagerError::InvalidConfig)?;
        AppContextBuilder::new().with_config(config).build()
    }

    /// The validated configuration.
    #[must_use]
    pub const fn config(&self) -> &CoreConfig {
        &self.config
    }

    /// The loop coroutine tasks run on.
    #[must_use]
    pub const fn event_loop(&self) -> &EventLoop {
        &self.event_loop
    }

    /// Blocking task manager.
    #[must_use]
    pub const fn blocking(&self) -> &Arc<BlockingTaskManager> {
        &self.blocking
    }

    /// Coroutine task manager.
    #[must_use]
    pub const fn coroutines(&self) -> &Arc<CoroutineTaskManager> {
        &self.coroutines
    }

    /// Shared metrics collector.
    #[must_use]
    pub const fn metrics(&self) -> &Arc<PerformanceMetrics> {
        &self.metrics
    }

    /// Shared HTTP client.
    #[must_use]
    pub const fn http(&self) -> &Arc<ResilientHttpClient> {
        &self.http
    }

    /// General-purpose lookup cache.
    #[must_use]
    pub const fn cache(&self) -> &Arc<TtlCache<String, Value>> {
        &self.cache
    }

    /// Authenticated client for `base_url` sharing this context's HTTP client.
    #[must_use]
    pub fn api_client(&self, base_url: impl Into<String>, tokens: Arc<dyn TokenProvider>) -> AuthenticatedApiClient {
        AuthenticatedApiClient::new(base_url, Arc::clone(&self.http), tokens)
    }

    /// Shut everything down for process exit.
    ///
    /// Coroutine tasks are cancelled without waiting, blocking workers get up
    /// to `drain_timeout`, then all HTTP sessions close. Returns whether the
    /// blocking workers exited in time.
    pub fn shutdown(&self, drain_timeout: Duration) -> bool {
        self.coroutines.shutdown();
        let clean = self.blocking.shutdown(drain_timeout);
        self.http.close_all_sessions();
        info!(clean, "application context shut down");
        clean
    }
}
