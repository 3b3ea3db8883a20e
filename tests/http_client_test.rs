//! Integration tests for ResilientHttpClient

mod support;

use std::sync::Arc;

use dealerdesk_core::config::HttpConfig;
use dealerdesk_core::http::{
    HttpError, HttpOutcome, HttpResponse, Method, RequestOptions, ResilientHttpClient,
    DEFAULT_SESSION,
};
use dealerdesk_core::util::PerformanceMetrics;
use support::{ScriptedFactory, ScriptedTransport};

fn client(transport: &Arc<ScriptedTransport>) -> (ResilientHttpClient, Arc<ScriptedFactory>) {
    let factory = ScriptedFactory::new(Arc::clone(transport));
    let client = ResilientHttpClient::with_transport_factory(
        HttpConfig::default(),
        factory.clone(),
        Arc::new(PerformanceMetrics::new()),
    );
    (client, factory)
}

#[tokio::test]
async fn test_request_returns_response_and_records_metrics() {
    println!("\n=== test_request_returns_response_and_records_metrics ===");

    let transport = ScriptedTransport::statuses(&[(200, r#"{"ok":true}"#), (500, "boom")]);
    let (client, _) = client(&transport);
    let url = "https://portal.test/inventory";

    let ok = client
        .request(Method::GET, url, RequestOptions::new().query("page", "1"))
        .await
        .expect("session available");
    assert!(ok.is_success());
    assert_eq!(ok.status(), Some(200));

    let failed = client
        .request(Method::GET, url, RequestOptions::new())
        .await
        .unwrap();
    assert_eq!(failed.status(), Some(500));
    assert!(!failed.is_success());

    let stats = client.metrics().request_stats("GET", url).unwrap();
    assert_eq!(stats.timing.calls, 2);
    assert_eq!(stats.timing.errors, 1);
    assert_eq!(stats.status_codes.get(&500), Some(&1));

    let sent = transport.requests();
    assert_eq!(sent[0].query, vec![("page".to_string(), "1".to_string())]);
}

#[tokio::test]
async fn test_transport_failure_is_an_outcome_not_an_error() {
    let transport = ScriptedTransport::new(vec![Err(HttpError::Body("truncated".into()))]);
    let (client, _) = client(&transport);

    let outcome = client
        .request(Method::GET, "https://portal.test/x", RequestOptions::new())
        .await
        .unwrap();
    assert!(matches!(outcome, HttpOutcome::Failed(HttpError::Body(_))));
    assert_eq!(outcome.status(), None);

    let stats = client
        .metrics()
        .request_stats("GET", "https://portal.test/x")
        .unwrap();
    assert_eq!(stats.timing.errors, 1);
    assert!(stats.status_codes.is_empty());
}

#[tokio::test]
async fn test_transient_failure_is_sent_once_even_with_retry_budget() {
    println!("\n=== test_transient_failure_is_sent_once_even_with_retry_budget ===");

    let transport = ScriptedTransport::new(vec![
        Err(HttpError::Connect("refused".into())),
        Ok(HttpResponse::new(200, b"[]".to_vec())),
    ]);
    let (client, _) = client(&transport);
    let session = client.get_session(DEFAULT_SESSION, None, Some(3)).unwrap();
    assert_eq!(session.config().retry_attempts, 3);

    let outcome = client
        .request(Method::GET, "https://portal.test/units", RequestOptions::new())
        .await
        .unwrap();
    assert!(matches!(outcome, HttpOutcome::Failed(HttpError::Connect(_))));
    assert_eq!(transport.calls(), 1);

    let stats = client
        .metrics()
        .request_stats("GET", "https://portal.test/units")
        .unwrap();
    assert_eq!(stats.timing.calls, 1);
    assert_eq!(stats.timing.errors, 1);
}

#[tokio::test]
async fn test_post_is_not_retried() {
    let transport = ScriptedTransport::new(vec![
        Err(HttpError::Timeout("slow".into())),
        Ok(HttpResponse::new(201, Vec::new())),
    ]);
    let (client, _) = client(&transport);

    let outcome = client
        .request(
            Method::POST,
            "https://portal.test/quotes",
            RequestOptions::new().json(serde_json::json!({"vin": "1FT"})),
        )
        .await
        .unwrap();
    assert!(matches!(outcome, HttpOutcome::Failed(HttpError::Timeout(_))));
    assert_eq!(transport.calls(), 1);
}

#[tokio::test]
async fn test_sessions_are_reused_and_closed_ones_replaced() {
    println!("\n=== test_sessions_are_reused_and_closed_ones_replaced ===");

    let transport = ScriptedTransport::new(Vec::new());
    let (client, factory) = client(&transport);

    let first = client.get_session("sharepoint", None, None).unwrap();
    let again = client.get_session("sharepoint", None, None).unwrap();
    assert!(Arc::ptr_eq(&first, &again));
    assert_eq!(factory.created(), 1);

    first.close();
    let replacement = client.get_session("sharepoint", None, None).unwrap();
    assert!(!replacement.is_closed());
    assert!(!Arc::ptr_eq(&first, &replacement));
    assert_eq!(factory.created(), 2);
}

#[tokio::test]
async fn test_close_is_idempotent() {
    let transport = ScriptedTransport::new(Vec::new());
    let (client, _) = client(&transport);

    let session = client.get_session("quotes", None, None).unwrap();
    client.get_session("inventory", None, None).unwrap();
    assert_eq!(client.session_names(), vec!["inventory", "quotes"]);

    client.close_session("quotes");
    client.close_session("quotes");
    client.close_session("never-opened");
    assert!(session.is_closed());
    assert_eq!(client.session_names(), vec!["inventory"]);

    client.close_all_sessions();
    client.close_all_sessions();
    assert!(client.session_names().is_empty());
}

#[tokio::test]
async fn test_no_session_yields_none() {
    let client = ResilientHttpClient::with_transport_factory(
        HttpConfig::default(),
        ScriptedFactory::failing(),
        Arc::new(PerformanceMetrics::new()),
    );
    assert!(client.get_session("default", None, None).is_none());
    assert!(client
        .request(Method::GET, "https://portal.test", RequestOptions::new())
        .await
        .is_none());
}
