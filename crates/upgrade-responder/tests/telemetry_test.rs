//! Contract tests for the telemetry sink client.
//!
//! A wiremock server plays the part of the InfluxDB write endpoint.

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]

use std::time::Duration;

use axum::http::HeaderMap;
use upgrade_responder::telemetry::{InfluxSink, MetricPoint, TelemetryRecorder};
use upgrade_responder::{CheckUpgradeRequest, TelemetryError};
use wiremock::matchers::{body_string_contains, header_exists, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn check_request() -> CheckUpgradeRequest {
    CheckUpgradeRequest {
        longhorn_version: "v1.4.2".to_string(),
        kubernetes_version: "v1.27.1".to_string(),
    }
}

fn upgrade_point() -> MetricPoint {
    MetricPoint::upgrade_query(&check_request(), "req-1", None)
}

#[tokio::test]
async fn test_ensure_database_issues_idempotent_create() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/query"))
        .and(body_string_contains("CREATE"))
        .and(body_string_contains("longhorn_upgrade_responder"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let sink = InfluxSink::new(&server.uri(), None, None).unwrap();
    sink.ensure_database().await.unwrap();

    server.verify().await;
}

#[tokio::test]
async fn test_ensure_database_failure_surfaces() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/query"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let sink = InfluxSink::new(&server.uri(), None, None).unwrap();
    let err = sink.ensure_database().await.unwrap_err();
    assert!(matches!(
        err,
        TelemetryError::Rejected {
            operation: "database creation",
            ..
        }
    ));
}

#[tokio::test]
async fn test_write_targets_database_at_nanosecond_precision() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/write"))
        .and(query_param("db", "longhorn_upgrade_responder"))
        .and(query_param("precision", "ns"))
        .and(body_string_contains("longhorn_upgrade_query"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let sink = InfluxSink::new(&server.uri(), None, None).unwrap();
    sink.write(&upgrade_point()).await.unwrap();

    server.verify().await;
}

#[tokio::test]
async fn test_write_rejection_surfaces() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/write"))
        .respond_with(ResponseTemplate::new(400))
        .mount(&server)
        .await;

    let sink = InfluxSink::new(&server.uri(), None, None).unwrap();
    let err = sink.write(&upgrade_point()).await.unwrap_err();
    assert!(matches!(
        err,
        TelemetryError::Rejected {
            operation: "point write",
            ..
        }
    ));
}

#[tokio::test]
async fn test_write_sends_credentials_when_configured() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/write"))
        .and(header_exists("authorization"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let sink = InfluxSink::new(
        &server.uri(),
        Some("telemetry".to_string()),
        Some("secret".to_string()),
    )
    .unwrap();
    sink.write(&upgrade_point()).await.unwrap();

    server.verify().await;
}

#[tokio::test]
async fn test_unreachable_sink_surfaces_request_error() {
    // Nothing listens on this port.
    let sink = InfluxSink::new("http://127.0.0.1:1", None, None).unwrap();
    let err = sink.write(&upgrade_point()).await.unwrap_err();
    assert!(matches!(err, TelemetryError::Request(_)));
}

#[tokio::test]
async fn test_recorder_swallows_write_failure() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/write"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let sink = InfluxSink::new(&server.uri(), None, None).unwrap();
    let recorder = TelemetryRecorder::new(Some(sink), None);

    let mut headers = HeaderMap::new();
    headers.insert("x-request-id", "req-1".parse().unwrap());
    recorder.record(&headers, &check_request());

    // The detached write must reach the sink and its failure must die there.
    for _ in 0..100 {
        let seen = server
            .received_requests()
            .await
            .unwrap_or_default()
            .iter()
            .filter(|request| request.url.path() == "/write")
            .count();
        if seen == 1 {
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("telemetry write never reached the sink");
}
