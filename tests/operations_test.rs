//! Single operations and the cached per-user listing

mod common;

use axum::http::{Method, StatusCode};
use common::{build_request, send_to, test_config, Gate, GatedStore, TestApp};
use serde_json::json;
use std::sync::Arc;

#[tokio::test]
async fn test_create_operation_returns_created() {
    let app = TestApp::spawn().await;
    let token = app.token();

    let response = app
        .post(
            "/api/v1/operations",
            Some(&token),
            json!({"type": "export", "data": {"format": "csv"}}),
        )
        .await;

    assert_eq!(response.status, StatusCode::CREATED);
    assert_eq!(response.body["status"], "completed");
    assert!(uuid::Uuid::parse_str(response.body["id"].as_str().unwrap()).is_ok());
}

#[tokio::test]
async fn test_listing_reflects_new_operations_despite_cache() {
    let app = TestApp::spawn().await;
    let token = app.token();

    // warm the cache with an empty listing
    let empty = app.get("/api/v1/user/operations", Some(&token)).await;
    assert_eq!(empty.body["operations"], json!([]));

    let created = app
        .post("/api/v1/operations", Some(&token), json!({"type": "sync"}))
        .await;
    let id = created.body["id"].clone();

    let listing = app.get("/api/v1/user/operations", Some(&token)).await;
    assert_eq!(listing.status, StatusCode::OK);
    let operations = listing.body["operations"].as_array().unwrap();
    assert_eq!(operations.len(), 1);
    assert_eq!(operations[0]["id"], id);
    assert_eq!(operations[0]["type"], "sync");
    assert_eq!(operations[0]["user_id"], "user-1");
}

#[tokio::test]
async fn test_operations_are_scoped_to_caller() {
    let app = TestApp::spawn().await;
    let alice = app.token_for("alice", "alice@example.com");
    let bob = app.token_for("bob", "bob@example.com");

    app.post("/api/v1/operations", Some(&alice), json!({"type": "a"}))
        .await;

    let bobs = app.get("/api/v1/user/operations", Some(&bob)).await;
    assert_eq!(bobs.body["operations"], json!([]));

    let alices = app.get("/api/v1/user/operations", Some(&alice)).await;
    assert_eq!(alices.body["operations"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_non_object_data_is_rejected() {
    let app = TestApp::spawn().await;
    let token = app.token();

    let response = app
        .post("/api/v1/operations", Some(&token), json!({"data": [1, 2, 3]}))
        .await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert_eq!(response.body["error"], "Validation Error");
}

#[tokio::test]
async fn test_listing_works_with_cache_disabled() {
    let mut config = common::test_config();
    config.cache.enabled = false;
    let app = TestApp::with_config(config).await;
    let token = app.token();

    app.post("/api/v1/operations", Some(&token), json!({})).await;
    let listing = app.get("/api/v1/user/operations", Some(&token)).await;
    assert_eq!(listing.body["operations"].as_array().unwrap().len(), 1);

    let ready = app.get("/ready", None).await;
    assert_eq!(ready.body["dependencies"]["cache"], "disabled");
}

#[tokio::test]
async fn test_listing_loaded_before_a_create_is_not_cached() {
    let read_gate = Gate::armed();
    let app = TestApp::with_store(
        test_config(),
        GatedStore::new(Arc::clone(&read_gate), Gate::open()),
    )
    .await;
    let token = app.token();

    // the reader loads the empty listing, then stalls before filling the cache
    let listing = tokio::spawn(send_to(
        app.router.clone(),
        build_request(Method::GET, "/api/v1/user/operations", Some(&token), None),
    ));
    read_gate.wait_reached().await;

    let created = app
        .post("/api/v1/operations", Some(&token), json!({"type": "sync"}))
        .await;
    assert_eq!(created.status, StatusCode::CREATED);

    read_gate.release();
    let in_flight = listing.await.unwrap();
    assert_eq!(in_flight.status, StatusCode::OK);
    assert_eq!(in_flight.body["operations"], json!([]));

    let after = app.get("/api/v1/user/operations", Some(&token)).await;
    let operations = after.body["operations"].as_array().unwrap();
    assert_eq!(operations.len(), 1);
    assert_eq!(operations[0]["id"], created.body["id"]);
}
