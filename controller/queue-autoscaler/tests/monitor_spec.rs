//! Integration tests for the monitoring endpoint client
//!
//! Tests cover:
//! - Query shape sent to `/jsz`
//! - Pending count lookup by stream and consumer
//! - Distinct error kinds for status, decode, lookup and transport failures

use queue_autoscaler::{BacklogSource, ErrorKind, FetchError, JszClient};
use serde_json::json;
use std::time::Duration;
use wiremock::{
    matchers::{method, path, query_param},
    Mock, MockServer, ResponseTemplate,
};

fn client() -> JszClient {
    JszClient::new(Duration::from_secs(5)).unwrap()
}

fn events_report() -> serde_json::Value {
    json!({
        "account_details": [{
            "stream_detail": [{
                "name": "EVENTS",
                "consumer_detail": [{"name": "xxx", "num_pending": 250}]
            }]
        }]
    })
}

#[tokio::test]
async fn test_fetch_pending_messages() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/jsz"))
        .and(query_param("acc", "$G"))
        .and(query_param("consumers", "1"))
        .and(query_param("leader_only", "1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(events_report()))
        .expect(1)
        .mount(&mock_server)
        .await;

    let pending = client()
        .pending_messages(&mock_server.uri(), "EVENTS", "xxx")
        .await
        .unwrap();

    assert_eq!(pending, 250);
}

#[tokio::test]
async fn test_trailing_slash_in_base_url() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/jsz"))
        .respond_with(ResponseTemplate::new(200).set_body_json(events_report()))
        .expect(1)
        .mount(&mock_server)
        .await;

    let base = format!("{}/", mock_server.uri());
    let pending = client()
        .pending_messages(&base, "EVENTS", "xxx")
        .await
        .unwrap();

    assert_eq!(pending, 250);
}

#[tokio::test]
async fn test_unknown_stream_is_not_found() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/jsz"))
        .respond_with(ResponseTemplate::new(200).set_body_json(events_report()))
        .mount(&mock_server)
        .await;

    let err = client()
        .pending_messages(&mock_server.uri(), "NOT-EXIST", "xxx")
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::NotFound);
    assert!(err.to_string().contains("couldn't find account"));
    assert!(err.to_string().contains("NOT-EXIST"));
}

#[tokio::test]
async fn test_no_accounts() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/jsz"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"account_details": []})))
        .mount(&mock_server)
        .await;

    let err = client()
        .pending_messages(&mock_server.uri(), "EVENTS", "xxx")
        .await
        .unwrap_err();

    assert_eq!(err, FetchError::NoAccountFound);
}

#[tokio::test]
async fn test_http_status_keeps_code_and_body() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/jsz"))
        .respond_with(ResponseTemplate::new(500).set_body_string("{\"account_details\":null}\n"))
        .mount(&mock_server)
        .await;

    let err = client()
        .pending_messages(&mock_server.uri(), "EVENTS", "xxx")
        .await
        .unwrap_err();

    assert_eq!(
        err,
        FetchError::HttpStatus {
            code: 500,
            body: "{\"account_details\":null}\n".to_string(),
        }
    );
    assert_eq!(err.kind(), ErrorKind::HttpStatus);
}

#[tokio::test]
async fn test_http_status_body_ignores_declared_charset() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/jsz"))
        .respond_with(
            ResponseTemplate::new(503)
                .set_body_raw("caf\u{e9} unavailable\n", "text/plain; charset=iso-8859-1"),
        )
        .mount(&mock_server)
        .await;

    let err = client()
        .pending_messages(&mock_server.uri(), "EVENTS", "xxx")
        .await
        .unwrap_err();

    assert_eq!(
        err,
        FetchError::HttpStatus {
            code: 503,
            body: "caf\u{e9} unavailable\n".to_string(),
        }
    );
}

#[tokio::test]
async fn test_malformed_body_is_decode_error() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/jsz"))
        .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
        .mount(&mock_server)
        .await;

    let err = client()
        .pending_messages(&mock_server.uri(), "EVENTS", "xxx")
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Decode);
}

#[tokio::test]
async fn test_unreachable_endpoint_is_transport_error() {
    let err = client()
        .pending_messages("http://127.0.0.1:1", "EVENTS", "xxx")
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Transport);
}

#[tokio::test]
async fn test_slow_endpoint_times_out() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/jsz"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(events_report())
                .set_delay(Duration::from_secs(2)),
        )
        .mount(&mock_server)
        .await;

    let client = JszClient::new(Duration::from_millis(100)).unwrap();
    let err = client
        .pending_messages(&mock_server.uri(), "EVENTS", "xxx")
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Transport);
}
