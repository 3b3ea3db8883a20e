//! Tests for configuration validation

use std::time::Duration;

use dealerdesk_core::config::{
    BlockingManagerConfig, CacheConfig, CoreConfig, CoroutineManagerConfig, HttpConfig,
};

#[test]
fn test_defaults_are_valid() {
    let cfg = CoreConfig::default();
    assert!(cfg.validate().is_ok());
    assert_eq!(cfg.blocking.worker_count, 4);
    assert_eq!(cfg.coroutine.max_retained_results, 1024);
    assert_eq!(cfg.http.pool_limit, 100);
    assert_eq!(cfg.http.default_timeout(), Duration::from_secs(30));
    assert_eq!(cfg.cache.max_size, 1000);
    assert_eq!(cfg.cache.default_ttl(), Some(Duration::from_secs(300)));
}

#[test]
fn test_blocking_config_invalid_worker_count() {
    let invalid = BlockingManagerConfig::new().with_worker_count(0);
    assert!(invalid.validate().is_err());
}

#[test]
fn test_blocking_config_invalid_queue_depth() {
    let invalid = BlockingManagerConfig::new().with_max_queue_depth(0);
    assert!(invalid.validate().is_err());
}

#[test]
fn test_coroutine_config_result_ttl() {
    let cfg = CoroutineManagerConfig::new().with_result_ttl(Some(Duration::from_secs(60)));
    assert_eq!(cfg.result_ttl(), Some(Duration::from_secs(60)));
    assert!(cfg.validate().is_ok());

    let cfg = CoroutineManagerConfig::new().with_max_retained_results(0);
    assert!(cfg.validate().is_err());
}

#[test]
fn test_http_and_cache_validation() {
    let http = HttpConfig {
        pool_limit: 0,
        ..HttpConfig::default()
    };
    assert!(http.validate().is_err());

    let cache = CacheConfig {
        default_ttl_secs: Some(0),
        ..CacheConfig::default()
    };
    assert!(cache.validate().is_err());
}

#[test]
fn test_core_config_error_names_section() {
    let mut cfg = CoreConfig::default();
    cfg.http.default_timeout_secs = 0;
    let err = cfg.validate().unwrap_err();
    assert!(err.starts_with("http:"), "unexpected error: {err}");
}

#[test]
fn test_from_json_str_fills_defaults() {
    let cfg = CoreConfig::from_json_str(r#"{"blocking": {"worker_count": 8}}"#).unwrap();
    assert_eq!(cfg.blocking.worker_count, 8);
    assert_eq!(cfg.blocking.max_queue_depth, 1024);
    assert_eq!(cfg.http, HttpConfig::default());
}

#[test]
fn test_from_json_str_rejects_invalid_values() {
    assert!(CoreConfig::from_json_str(r#"{"cache": {"max_size": 0}}"#).is_err());
    assert!(CoreConfig::from_json_str("not json").is_err());
}

#[test]
fn test_from_vars_applies_prefixed_overrides() {
    let vars = vec![
        ("DEALERDESK_WORKER_COUNT".to_string(), "2".to_string()),
        ("DEALERDESK_HTTP_TIMEOUT_SECS".to_string(), "10".to_string()),
        ("DEALERDESK_RESULT_TTL_SECS".to_string(), "120".to_string()),
        ("WORKER_COUNT".to_string(), "99".to_string()),
    ];
    let cfg = CoreConfig::from_vars(vars).unwrap();
    assert_eq!(cfg.blocking.worker_count, 2);
    assert_eq!(cfg.http.default_timeout_secs, 10);
    assert_eq!(cfg.coroutine.result_ttl(), Some(Duration::from_secs(120)));
}

#[test]
fn test_from_vars_rejects_unparseable_value() {
    let vars = vec![("DEALERDESK_CACHE_MAX_SIZE".to_string(), "lots".to_string())];
    let err = CoreConfig::from_vars(vars).unwrap_err();
    assert!(err.contains("CACHE_MAX_SIZE"), "unexpected error: {err}");
}
