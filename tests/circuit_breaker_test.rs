//! Circuit breaking for `POST /api/v1/external/failing-service`

mod common;

use axum::http::{header, Method, StatusCode};
use common::{build_request, CountingService, TestApp};
use futures::future::join_all;
use opsgate_core::config::ExternalFailureMode;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

const EXTERNAL_PATH: &str = "/api/v1/external/failing-service";

#[tokio::test]
async fn test_breaker_opens_after_threshold_and_stops_calling_dependency() {
    let service = CountingService::failing();
    let app = TestApp::with_external(common::test_config(), service.clone()).await;
    let token = app.token();

    // threshold is 3: each failure reaches the dependency
    for expected_calls in 1..=3 {
        let response = app.post(EXTERNAL_PATH, Some(&token), json!({})).await;
        assert_eq!(response.status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(response.body["error"], "Service Unavailable");
        assert!(response.body["retry_after"].as_u64().unwrap() > 0);
        assert_eq!(service.calls(), expected_calls);
    }

    // open: short-circuited without invoking the dependency
    for _ in 0..5 {
        let response = app.post(EXTERNAL_PATH, Some(&token), json!({})).await;
        assert_eq!(response.status, StatusCode::SERVICE_UNAVAILABLE);
        assert!(response.headers.contains_key(header::RETRY_AFTER));
        assert!(response.body["retry_after"].as_u64().unwrap() >= 1);
    }
    assert_eq!(service.calls(), 3);

    let circuits = app.get("/api/v1/circuits", Some(&token)).await;
    let external = circuits.body["circuits"]
        .as_array()
        .unwrap()
        .iter()
        .find(|c| c["name"] == "failing-service")
        .unwrap()
        .clone();
    assert_eq!(external["current_state"], "open");
    assert_eq!(external["rejected_count"], 5);
}

#[tokio::test]
async fn test_exactly_one_trial_after_cooldown() {
    let service = CountingService::new(true, Duration::from_millis(300));
    let app = TestApp::with_external(common::test_config(), service.clone()).await;
    let token = app.token();

    for _ in 0..3 {
        app.post(EXTERNAL_PATH, Some(&token), json!({})).await;
    }
    assert_eq!(service.calls(), 3);

    // cooldown is 1s
    tokio::time::sleep(Duration::from_millis(1_100)).await;
    service.set_failing(false);

    let requests = (0..5).map(|_| {
        app.send(build_request(
            Method::POST,
            EXTERNAL_PATH,
            Some(&token),
            Some(json!({})),
        ))
    });
    let responses = join_all(requests).await;

    let succeeded = responses
        .iter()
        .filter(|r| r.status == StatusCode::OK)
        .count();
    let rejected = responses
        .iter()
        .filter(|r| r.status == StatusCode::SERVICE_UNAVAILABLE)
        .count();
    assert_eq!(succeeded, 1);
    assert_eq!(rejected, 4);
    assert_eq!(service.calls(), 4);

    // trial succeeded, so the circuit is closed again
    let response = app.post(EXTERNAL_PATH, Some(&token), json!({"n": 1})).await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["result"]["n"], 1);
    assert_eq!(service.calls(), 5);
}

#[tokio::test]
async fn test_failed_trial_reopens_circuit() {
    let service = CountingService::failing();
    let app = TestApp::with_external(common::test_config(), service.clone()).await;
    let token = app.token();

    for _ in 0..3 {
        app.post(EXTERNAL_PATH, Some(&token), json!({})).await;
    }
    tokio::time::sleep(Duration::from_millis(1_100)).await;

    let trial = app.post(EXTERNAL_PATH, Some(&token), json!({})).await;
    assert_eq!(trial.status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(service.calls(), 4);

    let rejected = app.post(EXTERNAL_PATH, Some(&token), json!({})).await;
    assert_eq!(rejected.status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(service.calls(), 4);
}

#[tokio::test]
async fn test_open_circuit_is_visible_in_readiness_and_metrics() {
    let service = CountingService::failing();
    let app = TestApp::with_external(common::test_config(), service.clone()).await;
    let token = app.token();

    for _ in 0..3 {
        app.post(EXTERNAL_PATH, Some(&token), json!({})).await;
    }

    let ready = app.get("/ready", None).await;
    assert_eq!(ready.status, StatusCode::OK);
    assert_eq!(ready.body["dependencies"]["circuit:failing-service"], "open");

    let metrics = app.get("/metrics", None).await;
    assert!(metrics
        .text
        .contains(r#"opsgate_circuit_breaker_state{dependency="failing-service"} 1"#));
}

#[tokio::test]
async fn test_payload_driven_simulated_dependency() {
    let mut config = common::test_config();
    config.external.failure_mode = ExternalFailureMode::PayloadDriven;
    let app = TestApp::with_config(config).await;
    let token = app.token();

    let ok = app
        .post(EXTERNAL_PATH, Some(&token), json!({"fail": false}))
        .await;
    assert_eq!(ok.status, StatusCode::OK);
    assert_eq!(ok.body["status"], "ok");

    let failed = app
        .post(EXTERNAL_PATH, Some(&token), json!({"fail": true}))
        .await;
    assert_eq!(failed.status, StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn test_empty_body_is_accepted() {
    let service = CountingService::new(false, Duration::ZERO);
    let app = TestApp::with_external(common::test_config(), Arc::clone(&service) as _).await;
    let token = app.token();

    let response = app
        .send(build_request(Method::POST, EXTERNAL_PATH, Some(&token), None))
        .await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(service.calls(), 1);
}
