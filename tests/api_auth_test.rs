//! Health, routing and authentication behaviour of the HTTP surface

mod common;

use axum::http::StatusCode;
use common::{TestApp, TEST_EMAIL, TEST_PASSWORD};
use serde_json::json;

#[tokio::test]
async fn test_health_is_idempotent() {
    let app = TestApp::spawn().await;

    for _ in 0..3 {
        let response = app.get("/health", None).await;
        assert_eq!(response.status, StatusCode::OK);
        assert_eq!(response.body["status"], "healthy");
        assert_eq!(response.body["service"], "opsgate");
        assert!(response.body["timestamp"].is_string());
        assert!(response.body["version"].is_string());
    }
    assert_eq!(app.state.store.count("user").await.unwrap(), 0);
}

#[tokio::test]
async fn test_ready_reports_dependencies() {
    let app = TestApp::spawn().await;

    let response = app.get("/ready", None).await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["status"], "ready");
    assert_eq!(response.body["dependencies"]["database"], "healthy");
    assert_eq!(response.body["dependencies"]["cache"], "healthy");
    assert_eq!(
        response.body["dependencies"]["circuit:failing-service"],
        "closed"
    );
}

#[tokio::test]
async fn test_live_probe() {
    let app = TestApp::spawn().await;
    let response = app.get("/live", None).await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["status"], "alive");
}

#[tokio::test]
async fn test_unknown_route_is_not_found() {
    let app = TestApp::spawn().await;

    for path in ["/does-not-exist", "/api/v1/nothing-here"] {
        let response = app.get(path, None).await;
        assert_eq!(response.status, StatusCode::NOT_FOUND);
        assert_eq!(response.body["error"], "Not Found");
        assert!(response.body["message"].is_string());
    }
}

#[tokio::test]
async fn test_protected_endpoint_requires_token() {
    let app = TestApp::spawn().await;

    let response = app.get("/api/v1/user/operations", None).await;
    assert_eq!(response.status, StatusCode::UNAUTHORIZED);
    assert_eq!(response.body["error"], "Unauthorized");
    assert!(response.body["message"].is_string());

    let response = app
        .get("/api/v1/user/operations", Some("not-a-jwt"))
        .await;
    assert_eq!(response.status, StatusCode::UNAUTHORIZED);

    let token = app.token();
    let response = app.get("/api/v1/user/operations", Some(&token)).await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["operations"], json!([]));
}

#[tokio::test]
async fn test_token_from_another_issuer_is_rejected() {
    let app = TestApp::spawn().await;

    let mut other = common::test_config();
    other.auth.jwt_secret = "some-other-secret".to_string();
    let other_app = TestApp::with_config(other).await;
    let foreign = other_app.token();

    let response = app.get("/api/v1/users", Some(&foreign)).await;
    assert_eq!(response.status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_login_issues_usable_token() {
    let app = TestApp::spawn().await;

    let response = app
        .post(
            "/api/v1/auth/login",
            None,
            json!({"email": TEST_EMAIL, "password": TEST_PASSWORD}),
        )
        .await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["token_type"], "Bearer");
    assert_eq!(response.body["user"]["id"], "user-1");

    let token = response.body["token"].as_str().unwrap().to_string();
    let response = app.get("/api/v1/users", Some(&token)).await;
    assert_eq!(response.status, StatusCode::OK);
}

#[tokio::test]
async fn test_login_rejects_bad_credentials() {
    let app = TestApp::spawn().await;

    let response = app
        .post(
            "/api/v1/auth/login",
            None,
            json!({"email": TEST_EMAIL, "password": "wrong"}),
        )
        .await;
    assert_eq!(response.status, StatusCode::UNAUTHORIZED);
    assert_eq!(response.body["error"], "Unauthorized");
    assert!(response.body.get("token").is_none());
}

#[tokio::test]
async fn test_login_validates_body() {
    let app = TestApp::spawn().await;

    let response = app
        .post("/api/v1/auth/login", None, json!({"email": TEST_EMAIL}))
        .await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert_eq!(response.body["error"], "Validation Error");
}

#[tokio::test]
async fn test_responses_carry_request_id() {
    let app = TestApp::spawn().await;
    let response = app.get("/health", None).await;
    assert!(response.headers.contains_key("x-request-id"));
}
