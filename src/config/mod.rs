//! Configuration models for task managers, HTTP sessions and caches.

pub mod settings;

pub use settings::{
    BlockingManagerConfig, CacheConfig, CoreConfig, CoroutineManagerConfig, HttpConfig,
    ENV_PREFIX,
};
