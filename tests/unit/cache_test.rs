//! Tests for the TTL cache

use std::collections::HashMap;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use dealerdesk_core::cache::TtlCache;
use rand::Rng;

#[test]
fn test_lru_eviction_prefers_least_recently_read() {
    let cache = TtlCache::new(3, None);
    cache.set("a", 1);
    cache.set("b", 2);
    cache.set("c", 3);

    // Reading "a" makes "b" the eviction candidate.
    assert_eq!(cache.get(&"a"), Some(1));
    cache.set("d", 4);

    assert_eq!(cache.size(), 3);
    assert!(cache.contains(&"a"));
    assert!(!cache.contains(&"b"));
    assert_eq!(cache.stats().evictions, 1);
}

#[test]
fn test_per_entry_ttl_does_not_change_default() {
    let cache = TtlCache::new(10, Some(Duration::from_secs(60)));
    let value = cache.get_or_set_with_ttl("dealer-list", Duration::from_millis(20), || 7);
    assert_eq!(value, 7);
    assert_eq!(cache.default_ttl(), Some(Duration::from_secs(60)));

    cache.set("regions", 3);
    thread::sleep(Duration::from_millis(40));
    assert_eq!(cache.get(&"dealer-list"), None);
    assert_eq!(cache.get(&"regions"), Some(3));
}

#[test]
fn test_try_get_or_set_does_not_cache_errors() {
    let cache: TtlCache<&str, u32> = TtlCache::new(4, None);
    let err: Result<u32, String> = cache.try_get_or_set("quote", || Err("offline".to_string()));
    assert!(err.is_err());
    assert!(!cache.contains(&"quote"));

    let ok: Result<u32, String> = cache.try_get_or_set("quote", || Ok(12));
    assert_eq!(ok, Ok(12));
    assert_eq!(cache.get(&"quote"), Some(12));
}

#[test]
fn test_cleanup_expired_counts_removed() {
    let cache = TtlCache::new(10, Some(Duration::from_millis(10)));
    for i in 0..5 {
        cache.set(i, i);
    }
    cache.set_with_ttl(99, 99, Duration::from_secs(60));
    thread::sleep(Duration::from_millis(30));

    assert_eq!(cache.cleanup_expired(), 5);
    assert_eq!(cache.size(), 1);
    assert_eq!(cache.stats().expirations, 5);
}

#[test]
fn test_randomized_workload_stays_bounded() {
    let cache = Arc::new(TtlCache::new(64, None));
    let mut handles = Vec::new();
    for t in 0..4u64 {
        let cache = Arc::clone(&cache);
        handles.push(thread::spawn(move || {
            let mut rng = rand::rng();
            for _ in 0..2_000 {
                let key = rng.random_range(0..256u64);
                if rng.random_bool(0.5) {
                    cache.set(key, key * 10 + t);
                } else if let Some(value) = cache.get(&key) {
                    assert_eq!(value / 10, key);
                }
                assert!(cache.size() <= 64);
            }
        }));
    }
    for handle in handles {
        handle.join().unwrap();
    }
    assert!(cache.size() <= 64);
}

#[test]
fn test_take_removes_entry() {
    let cache = TtlCache::new(4, None);
    cache.set("k".to_string(), HashMap::from([("model", "F-150")]));
    assert!(cache.take(&"k".to_string()).is_some());
    assert!(cache.is_empty());
    assert!(!cache.delete(&"k".to_string()));
}

#[tokio::test]
async fn test_get_or_set_async_runs_factory_once_when_cached() {
    let cache = TtlCache::new(4, None);
    let first = cache.get_or_set_async("inventory", || async { 41 }).await;
    let second = cache.get_or_set_async("inventory", || async { 99 }).await;
    assert_eq!(first, 41);
    assert_eq!(second, 41);
    assert_eq!(cache.stats().hits, 1);
}
