//! In-memory caches used to memoize expensive lookups.

pub mod ttl;

pub use ttl::{CacheStats, TtlCache};
