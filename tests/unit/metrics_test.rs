//! Tests for performance metrics

use std::time::Duration;

use dealerdesk_core::util::PerformanceMetrics;

#[test]
fn test_function_stats_accumulate() {
    let metrics = PerformanceMetrics::new();
    metrics.record_function("load_inventory", Duration::from_millis(10), true);
    metrics.record_function("load_inventory", Duration::from_millis(30), false);

    let stats = metrics.function_stats("load_inventory").unwrap();
    assert_eq!(stats.calls, 2);
    assert_eq!(stats.errors, 1);
    assert_eq!(stats.min, Duration::from_millis(10));
    assert_eq!(stats.max, Duration::from_millis(30));
    assert_eq!(stats.average(), Duration::from_millis(20));
}

#[test]
fn test_request_key_and_status_histogram() {
    let metrics = PerformanceMetrics::new();
    let url = "https://api.test/quotes";
    metrics.record_request("get", url, Duration::from_millis(5), Some(200), true);
    metrics.record_request("GET", url, Duration::from_millis(7), Some(200), true);
    metrics.record_request("GET", url, Duration::from_millis(9), Some(503), false);
    metrics.record_request("GET", url, Duration::from_millis(1), None, false);

    let stats = metrics.request_stats("GET", url).unwrap();
    assert_eq!(stats.timing.calls, 4);
    assert_eq!(stats.timing.errors, 2);
    assert_eq!(stats.status_codes.get(&200), Some(&2));
    assert_eq!(stats.status_codes.get(&503), Some(&1));
}

#[test]
fn test_slow_functions_sorted_descending() {
    let metrics = PerformanceMetrics::new();
    metrics.record_function("fast", Duration::from_millis(1), true);
    metrics.record_function("slow", Duration::from_millis(50), true);
    metrics.record_function("slower", Duration::from_millis(90), true);

    let slow = metrics.get_slow_functions(Duration::from_millis(10));
    let names: Vec<&str> = slow.iter().map(|(name, _)| name.as_str()).collect();
    assert_eq!(names, vec!["slower", "slow"]);
}

#[test]
fn test_measure_records_errors() {
    let metrics = PerformanceMetrics::new();
    let ok: Result<u32, String> = metrics.measure("parse_csv", || Ok(3));
    let err: Result<u32, String> = metrics.measure("parse_csv", || Err("bad row".into()));
    assert_eq!(ok, Ok(3));
    assert!(err.is_err());
    assert_eq!(metrics.function_stats("parse_csv").unwrap().errors, 1);
}

#[tokio::test]
async fn test_measure_async_and_report() {
    let metrics = PerformanceMetrics::new();
    let value: Result<u32, ()> = metrics
        .measure_async("fetch_quote", async {
            tokio::time::sleep(Duration::from_millis(5)).await;
            Ok(1)
        })
        .await;
    assert_eq!(value, Ok(1));
    metrics.record_request("POST", "https://api.test/q", Duration::from_millis(3), Some(201), true);

    let report = metrics.get_performance_report();
    assert_eq!(report.summary.tracked_functions, 1);
    assert_eq!(report.summary.total_requests, 1);
    assert!(report.requests.contains_key("POST:https://api.test/q"));

    let json = serde_json::to_value(&report).unwrap();
    assert!(json["functions"]["fetch_quote"]["avg_ms"].as_f64().unwrap() >= 5.0);

    metrics.reset();
    assert!(metrics.function_stats("fetch_quote").is_none());
}
