//! Manager, HTTP and cache configuration structures.

use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Prefix for environment variable overrides (`DEALERDESK_WORKER_COUNT`, ...).
pub const ENV_PREFIX: &str = "DEALERDESK_";

/// Blocking task manager configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BlockingManagerConfig {
    /// Number of worker threads.
    pub worker_count: usize,
    /// Maximum queued tasks before submissions are rejected.
    pub max_queue_depth: usize,
    /// Stack size per worker thread in bytes.
    pub thread_stack_size: usize,
}

impl Default for BlockingManagerConfig {
    fn default() -> Self {
        Self {
            worker_count: 4,
            max_queue_depth: 1024,
            thread_stack_size: 2 * 1024 * 1024,
        }
    }
}

impl BlockingManagerConfig {
    /// Default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the worker thread count.
    #[must_use]
    pub const fn with_worker_count(mut self, worker_count: usize) -> Self {
        self.worker_count = worker_count;
        self
    }

    /// Set the maximum queue depth.
    #[must_use]
    pub const fn with_max_queue_depth(mut self, max_queue_depth: usize) -> Self {
        self.max_queue_depth = max_queue_depth;
        self
    }

    /// Set the worker stack size.
    #[must_use]
    pub const fn with_thread_stack_size(mut self, thread_stack_size: usize) -> Self {
        self.thread_stack_size = thread_stack_size;
        self
    }

    /// Validate configuration values.
    pub fn validate(&self) -> Result<(), String> {
        if self.worker_count == 0 {
            return Err("worker_count must be greater than 0".into());
        }
        if self.max_queue_depth == 0 {
            return Err("max_queue_depth must be greater than 0".into());
        }
        if self.thread_stack_size < 64 * 1024 {
            return Err("thread_stack_size must be at least 64 KiB".into());
        }
        Ok(())
    }
}

/// Coroutine task manager configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoroutineManagerConfig {
    /// Threads in the executor used by `run_blocking`.
    pub executor_threads: usize,
    /// Maximum queued `run_blocking` jobs.
    pub executor_queue_depth: usize,
    /// Upper bound on retained task results; least recently read are evicted first.
    pub max_retained_results: usize,
    /// Optional age limit for retained results, in seconds.
    pub result_ttl_secs: Option<u64>,
}

impl Default for CoroutineManagerConfig {
    fn default() -> Self {
        Self {
            executor_threads: 4,
            executor_queue_depth: 1024,
            max_retained_results: 1024,
            result_ttl_secs: None,
        }
    }
}

impl CoroutineManagerConfig {
    /// Default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the executor thread count.
    #[must_use]
    pub const fn with_executor_threads(mut self, executor_threads: usize) -> Self {
        self.executor_threads = executor_threads;
        self
    }

    /// Set the retained result bound.
    #[must_use]
    pub const fn with_max_retained_results(mut self, max_retained_results: usize) -> Self {
        self.max_retained_results = max_retained_results;
        self
    }

    /// Set the retained result age limit.
    #[must_use]
    pub const fn with_result_ttl(mut self, ttl: Option<Duration>) -> Self {
        self.result_ttl_secs = match ttl {
            Some(ttl) => Some(ttl.as_secs()),
            None => None,
        };
        self
    }

    /// Retained result age limit as a duration.
    #[must_use]
    pub fn result_ttl(&self) -> Option<Duration> {
        self.result_ttl_secs.map(Duration::from_secs)
    }

    /// Validate configuration values.
    pub fn validate(&self) -> Result<(), String> {
        if self.executor_threads == 0 {
            return Err("executor_threads must be greater than 0".into());
        }
        if self.executor_queue_depth == 0 {
            return Err("executor_queue_depth must be greater than 0".into());
        }
        if self.max_retained_results == 0 {
            return Err("max_retained_results must be greater than 0".into());
        }
        if self.result_ttl_secs == Some(0) {
            return Err("result_ttl_secs must be greater than 0 when set".into());
        }
        Ok(())
    }
}

/// HTTP session defaults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    /// Total request timeout in seconds.
    pub default_timeout_secs: u64,
    /// Connection pool limit per session.
    pub pool_limit: usize,
    /// Retry budget advertised to callers. Requests themselves are sent once.
    pub retry_attempts: u32,
    /// Maximum characters of an error body kept in API errors.
    pub max_error_body_chars: usize,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            default_timeout_secs: 30,
            pool_limit: 100,
            retry_attempts: 3,
            max_error_body_chars: 500,
        }
    }
}

impl HttpConfig {
    /// Default timeout as a duration.
    #[must_use]
    pub const fn default_timeout(&self) -> Duration {
        Duration::from_secs(self.default_timeout_secs)
    }

    /// Validate configuration values.
    pub fn validate(&self) -> Result<(), String> {
        if self.default_timeout_secs == 0 {
            return Err("default_timeout_secs must be greater than 0".into());
        }
        if self.pool_limit == 0 {
            return Err("pool_limit must be greater than 0".into());
        }
        if self.max_error_body_chars == 0 {
            return Err("max_error_body_chars must be greater than 0".into());
        }
        Ok(())
    }
}

/// Shared lookup cache configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Maximum entries before LRU eviction.
    pub max_size: usize,
    /// Default entry time-to-live in seconds; `None` disables expiry.
    pub default_ttl_secs: Option<u64>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_size: 1000,
            default_ttl_secs: Some(300),
        }
    }
}

impl CacheConfig {
    /// Default TTL as a duration.
    #[must_use]
    pub fn default_ttl(&self) -> Option<Duration> {
        self.default_ttl_secs.map(Duration::from_secs)
    }

    /// Validate configuration values.
    pub fn validate(&self) -> Result<(), String> {
        if self.max_size == 0 {
            return Err("max_size must be greater than 0".into());
        }
        if self.default_ttl_secs == Some(0) {
            return Err("default_ttl_secs must be greater than 0 when set".into());
        }
        Ok(())
    }
}

/// Root configuration for the task core.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoreConfig {
    /// Blocking task manager settings.
    pub blocking: BlockingManagerConfig,
    /// Coroutine task manager settings.
    pub coroutine: CoroutineManagerConfig,
    /// HTTP session defaults.
    pub http: HttpConfig,
    /// Lookup cache settings.
    pub cache: CacheConfig,
}

impl CoreConfig {
    /// Validate every section.
    pub fn validate(&self) -> Result<(), String> {
        self.blocking
            .validate()
            .map_err(|e| format!("blocking: {e}"))?;
        self.coroutine
            .validate()
            .map_err(|e| format!("coroutine: {e}"))?;
        self.http.validate().map_err(|e| format!("http: {e}"))?;
        self.cache.validate().map_err(|e| format!("cache: {e}"))?;
        Ok(())
    }

    /// Parse configuration from a JSON string and validate.
    pub fn from_json_str(input: &str) -> Result<Self, String> {
        let cfg: Self = serde_json::from_str(input).map_err(|e| format!("parse error: {e}"))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Defaults overridden by `DEALERDESK_*` environment variables.
    ///
    /// A `.env` file in the working directory is loaded first if present.
    pub fn from_env() -> Result<Self, String> {
        let _ = dotenvy::dotenv();
        Self::from_vars(std::env::vars())
    }

    /// Defaults overridden by the given `DEALERDESK_*` variables.
    pub fn from_vars<I>(vars: I) -> Result<Self, String>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let vars: HashMap<String, String> = vars
            .into_iter()
            .filter_map(|(k, v)| k.strip_prefix(ENV_PREFIX).map(|k| (k.to_string(), v)))
            .collect();

        let mut cfg = Self::default();
        if let Some(v) = parse_var(&vars, "WORKER_COUNT")? {
            cfg.blocking.worker_count = v;
        }
        if let Some(v) = parse_var(&vars, "QUEUE_DEPTH")? {
            cfg.blocking.max_queue_depth = v;
        }
        if let Some(v) = parse_var(&vars, "EXECUTOR_THREADS")? {
            cfg.coroutine.executor_threads = v;
        }
        if let Some(v) = parse_var(&vars, "MAX_RETAINED_RESULTS")? {
            cfg.coroutine.max_retained_results = v;
        }
        if let Some(v) = parse_var(&vars, "RESULT_TTL_SECS")? {
            cfg.coroutine.result_ttl_secs = Some(v);
        }
        if let Some(v) = parse_var(&vars, "HTTP_TIMEOUT_SECS")? {
            cfg.http.default_timeout_secs = v;
        }
        if let Some(v) = parse_var(&vars, "HTTP_POOL_LIMIT")? {
            cfg.http.pool_limit = v;
        }
        if let Some(v) = parse_var(&vars, "HTTP_RETRY_ATTEMPTS")? {
            cfg.http.retry_attempts = v;
        }
        if let Some(v) = parse_var(&vars, "CACHE_MAX_SIZE")? {
            cfg.cache.max_size = v;
        }
        if let Some(v) = parse_var(&vars, "CACHE_TTL_SECS")? {
            cfg.cache.default_ttl_secs = Some(v);
        }

        cfg.validate()?;
        Ok(cfg)
    }
}

fn parse_var<T>(vars: &HashMap<String, String>, key: &str) -> Result<Option<T>, String>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    vars.get(key)
        .map(|raw| {
            raw.trim()
                .parse::<T>()
                .map_err(|e| format!("{ENV_PREFIX}{key}: invalid value `{raw}`: {e}"))
        })
        .transpose()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect()
    }

    #[test]
    fn test_defaults_are_valid() {
        let cfg = CoreConfig::default();
        assert!(cfg.validate().is_ok());
        assert_eq!(cfg.blocking.worker_count, 4);
        assert_eq!(cfg.coroutine.executor_threads, 4);
        assert_eq!(cfg.http.default_timeout(), Duration::from_secs(30));
        assert_eq!(cfg.http.pool_limit, 100);
    }

    #[test]
    fn test_env_overrides() {
        let cfg = CoreConfig::from_vars(vars(&[
            ("DEALERDESK_WORKER_COUNT", "8"),
            ("DEALERDESK_CACHE_TTL_SECS", "60"),
            ("UNRELATED", "x"),
        ]))
        .unwrap();
        assert_eq!(cfg.blocking.worker_count, 8);
        assert_eq!(cfg.cache.default_ttl(), Some(Duration::from_secs(60)));
    }

    #[test]
    fn test_env_invalid_number() {
        let err = CoreConfig::from_vars(vars(&[("DEALERDESK_WORKER_COUNT", "many")])).unwrap_err();
        assert!(err.contains("DEALERDESK_WORKER_COUNT"));
    }

    #[test]
    fn test_env_zero_workers_fails_validation() {
        let err = CoreConfig::from_vars(vars(&[("DEALERDESK_WORKER_COUNT", "0")])).unwrap_err();
        assert!(err.starts_with("blocking:"));
    }
}
