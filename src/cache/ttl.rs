//! TTL-aware LRU cache.
//!
//! Every operation takes one `parking_lot::Mutex` scoped to the whole map.
//! Expected sizes are hundreds to low thousands of entries, so coarse locking
//! keeps the structure simple and gives read-your-writes to every caller.
//!
//! Expiry is lazy: `get` removes an expired entry when it sees one, and
//! [`TtlCache::cleanup_expired`] sweeps eagerly when a caller-owned timer asks.
//! The cache never spawns background work of its own.
//!
//! Factories passed to the `get_or_set*` family run with the lock released,
//! so two concurrent misses on the same key may both run their factory; the
//! later store wins.

use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::hash::Hash;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

/// Hit/miss/eviction counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Lookups that returned a value.
    pub hits: u64,
    /// Lookups that found nothing or an expired entry.
    pub misses: u64,
    /// Entries dropped to stay within `max_size`.
    pub evictions: u64,
    /// Entries dropped because their TTL elapsed.
    pub expirations: u64,
}

#[derive(Debug)]
struct Entry<V> {
    value: V,
    inserted_at: Instant,
    ttl: Option<Duration>,
    /// Position in the recency index; larger is more recent.
    tick: u64,
}

impl<V> Entry<V> {
    fn is_expired(&self, now: Instant) -> bool {
        self.ttl
            .is_some_and(|ttl| now.saturating_duration_since(self.inserted_at) >= ttl)
    }
}

#[derive(Debug)]
struct CacheState<K, V> {
    entries: HashMap<K, Entry<V>>,
    recency: BTreeMap<u64, K>,
    next_tick: u64,
    stats: CacheStats,
}

impl<K: Eq + Hash + Clone, V> CacheState<K, V> {
    fn tick(&mut self) -> u64 {
        self.next_tick += 1;
        self.next_tick
    }

    fn remove(&mut self, key: &K) -> Option<Entry<V>> {
        let entry = self.entries.remove(key)?;
        self.recency.remove(&entry.tick);
        Some(entry)
    }

    fn touch(&mut self, key: &K) {
        let tick = self.tick();
        if let Some(entry) = self.entries.get_mut(key) {
            self.recency.remove(&entry.tick);
            entry.tick = tick;
            self.recency.insert(tick, key.clone());
        }
    }

    fn insert(&mut self, key: K, value: V, ttl: Option<Duration>, max_size: usize) {
        self.remove(&key);
        let tick = self.tick();
        self.recency.insert(tick, key.clone());
        self.entries.insert(
            key,
            Entry {
                value,
                inserted_at: Instant::now(),
                ttl,
                tick,
            },
        );
        while self.entries.len() > max_size {
            let Some((_, oldest)) = self.recency.pop_first() else {
                break;
            };
            self.entries.remove(&oldest);
            self.stats.evictions += 1;
        }
    }
}

/// Bounded key/value cache with per-entry TTL and LRU eviction.
#[derive(Debug)]
pub struct TtlCache<K, V> {
    max_size: usize,
    default_ttl: Option<Duration>,
    state: Mutex<CacheState<K, V>>,
}

impl<K, V> TtlCache<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    /// Create a cache holding at most `max_size` entries (minimum 1).
    ///
    /// `default_ttl` applies to entries stored without an explicit TTL;
    /// `None` means they never expire.
    #[must_use]
    pub fn new(max_size: usize, default_ttl: Option<Duration>) -> Self {
        Self {
            max_size: max_size.max(1),
            default_ttl,
            state: Mutex::new(CacheState {
                entries: HashMap::new(),
                recency: BTreeMap::new(),
                next_tick: 0,
                stats: CacheStats::default(),
            }),
        }
    }

    /// Capacity bound.
    #[must_use]
    pub const fn max_size(&self) -> usize {
        self.max_size
    }

    /// TTL applied by [`TtlCache::set`].
    #[must_use]
    pub const fn default_ttl(&self) -> Option<Duration> {
        self.default_ttl
    }

    /// Value for `key` if present and unexpired; marks it most recently used.
    pub fn get(&self, key: &K) -> Option<V> {
        let now = Instant::now();
        let mut state = self.state.lock();
        let expired = match state.entries.get(key) {
            None => {
                state.stats.misses += 1;
                return None;
            }
            Some(entry) => entry.is_expired(now),
        };
        if expired {
            state.remove(key);
            state.stats.expirations += 1;
            state.stats.misses += 1;
            return None;
        }
        state.touch(key);
        state.stats.hits += 1;
        state.entries.get(key).map(|entry| entry.value.clone())
    }

    /// Whether an unexpired entry exists, without touching recency or stats.
    pub fn contains(&self, key: &K) -> bool {
        let now = Instant::now();
        self.state
            .lock()
            .entries
            .get(key)
            .is_some_and(|entry| !entry.is_expired(now))
    }

    /// Insert or overwrite with the default TTL.
    pub fn set(&self, key: K, value: V) {
        self.state
            .lock()
            .insert(key, value, self.default_ttl, self.max_size);
    }

    /// Insert or overwrite with a TTL for this entry only.
    pub fn set_with_ttl(&self, key: K, value: V, ttl: Duration) {
        self.state.lock().insert(key, value, Some(ttl), self.max_size);
    }

    /// Cached value, or the result of `factory` stored with the default TTL.
    pub fn get_or_set<F>(&self, key: K, factory: F) -> V
    where
        F: FnOnce() -> V,
    {
        if let Some(value) = self.get(&key) {
            return value;
        }
        let value = factory();
        self.set(key, value.clone());
        value
    }

    /// Like [`TtlCache::get_or_set`], storing the new value with `ttl`.
    ///
    /// The override applies to this entry alone; the cache default is untouched.
    pub fn get_or_set_with_ttl<F>(&self, key: K, ttl: Duration, factory: F) -> V
    where
        F: FnOnce() -> V,
    {
        if let Some(value) = self.get(&key) {
            return value;
        }
        let value = factory();
        self.set_with_ttl(key, value.clone(), ttl);
        value
    }

    /// Fallible factory; errors are returned and nothing is stored.
    pub fn try_get_or_set<F, E>(&self, key: K, factory: F) -> Result<V, E>
    where
        F: FnOnce() -> Result<V, E>,
    {
        if let Some(value) = self.get(&key) {
            return Ok(value);
        }
        let value = factory()?;
        self.set(key, value.clone());
        Ok(value)
    }

    /// Async factory, stored with the default TTL.
    pub async fn get_or_set_async<F, Fut>(&self, key: K, factory: F) -> V
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = V>,
    {
        if let Some(value) = self.get(&key) {
            return value;
        }
        let value = factory().await;
        self.set(key, value.clone());
        value
    }

    /// Async factory, stored with a per-entry `ttl`.
    pub async fn get_or_set_async_with_ttl<F, Fut>(&self, key: K, ttl: Duration, factory: F) -> V
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = V>,
    {
        if let Some(value) = self.get(&key) {
            return value;
        }
        let value = factory().await;
        self.set_with_ttl(key, value.clone(), ttl);
        value
    }

    /// Fallible async factory; errors are returned and nothing is stored.
    pub async fn try_get_or_set_async<F, Fut, E>(&self, key: K, factory: F) -> Result<V, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, E>>,
    {
        if let Some(value) = self.get(&key) {
            return Ok(value);
        }
        let value = factory().await?;
        self.set(key, value.clone());
        Ok(value)
    }

    /// Remove `key`; `true` if an entry existed.
    pub fn delete(&self, key: &K) -> bool {
        self.state.lock().remove(key).is_some()
    }

    /// Remove and return the value for `key`, if present and unexpired.
    pub fn take(&self, key: &K) -> Option<V> {
        let now = Instant::now();
        let entry = self.state.lock().remove(key)?;
        (!entry.is_expired(now)).then_some(entry.value)
    }

    /// Remove every expired entry; returns how many were removed.
    pub fn cleanup_expired(&self) -> usize {
        let now = Instant::now();
        let mut state = self.state.lock();
        let expired: Vec<K> = state
            .entries
            .iter()
            .filter(|(_, entry)| entry.is_expired(now))
            .map(|(key, _)| key.clone())
            .collect();
        for key in &expired {
            state.remove(key);
        }
        state.stats.expirations += expired.len() as u64;
        expired.len()
    }

    /// Number of stored entries, including expired ones not yet swept.
    pub fn size(&self) -> usize {
        self.state.lock().entries.len()
    }

    /// Whether the cache holds no entries.
    pub fn is_empty(&self) -> bool {
        self.size() == 0
    }

    /// Drop every entry. Statistics are kept.
    pub fn clear(&self) {
        let mut state = self.state.lock();
        state.entries.clear();
        state.recency.clear();
    }

    /// Snapshot of the counters.
    pub fn stats(&self) -> CacheStats {
        self.state.lock().stats
    }
}
