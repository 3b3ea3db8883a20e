//! Tests for error types

use dealerdesk_core::core::{ErrorKind, ManagerError, TaskError};
use dealerdesk_core::http::{ApiError, HttpError};

#[test]
fn test_queue_full_error() {
    assert_eq!(format!("{}", ManagerError::QueueFull), "task queue is full");
}

#[test]
fn test_shutdown_error() {
    assert_eq!(
        format!("{}", ManagerError::Shutdown),
        "task manager has been shut down"
    );
}

#[test]
fn test_invalid_config_error() {
    let err = ManagerError::InvalidConfig("worker_count must be greater than 0".to_string());
    assert_eq!(
        format!("{}", err),
        "invalid configuration: worker_count must be greater than 0"
    );
}

#[test]
fn test_error_kind_serializes_snake_case() {
    let json = serde_json::to_string(&ErrorKind::Configuration).unwrap();
    assert_eq!(json, "\"configuration\"");
}

#[test]
fn test_task_error_round_trips_details() {
    let err = TaskError::new(ErrorKind::Api, "HTTP 500")
        .with_details(serde_json::json!({"status": 500}));
    let json = serde_json::to_value(&err).unwrap();
    assert_eq!(json["kind"], "api");
    assert_eq!(json["details"]["status"], 500);
}

#[test]
fn test_string_errors_become_internal() {
    let err: TaskError = "spreadsheet locked".into();
    assert_eq!(err.kind, ErrorKind::Internal);
    let err: TaskError = String::from("disk full").into();
    assert_eq!(err.message, "disk full");
}

#[test]
fn test_api_error_kinds() {
    let auth = ApiError::Auth {
        method: "GET".into(),
        url: "https://api.test/me".into(),
        message: "still unauthorized".into(),
    };
    assert_eq!(auth.kind(), ErrorKind::Auth);
    assert!(auth.to_string().contains("GET https://api.test/me"));

    let network = ApiError::Network {
        method: "POST".into(),
        url: "https://api.test/quotes".into(),
        source: HttpError::Connect("refused".into()),
    };
    assert_eq!(network.kind(), ErrorKind::Network);
    assert_eq!(network.status(), None);

    let cfg = ApiError::Configuration("no credentials".into());
    let task_err: TaskError = cfg.into();
    assert_eq!(task_err.kind, ErrorKind::Configuration);
    assert!(task_err.details.is_none());
}
