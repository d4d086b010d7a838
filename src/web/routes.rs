//! # Web API Route Definitions
//!
//! Routes are grouped by the guards they need. Guards are attached with
//! `route_layer`, so an unknown path reaches the 404 fallback rather than
//! an auth or rate-limit rejection.

use axum::routing::{get, post};
use axum::{middleware, Router};

use crate::web::handlers;
use crate::web::middleware::{auth, rate_limit};
use crate::web::state::AppState;

/// Probes and metrics; no auth, no rate limit
pub fn health_routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(handlers::health::basic_health))
        .route("/ready", get(handlers::health::readiness_probe))
        .route("/live", get(handlers::health::liveness_probe))
        .route("/metrics", get(handlers::health::prometheus_metrics))
}

/// Unauthenticated API entry points, limited per client IP
pub fn public_api_routes(state: &AppState) -> Router<AppState> {
    Router::new()
        .route("/auth/login", post(handlers::auth::login))
        .route("/load-test", post(handlers::load_test::load_test))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            rate_limit::limit_per_ip,
        ))
}

/// Authenticated API, limited per caller
pub fn protected_api_routes(state: &AppState) -> Router<AppState> {
    Router::new()
        .route("/operations", post(handlers::operations::create_operation))
        .route(
            "/user/operations",
            get(handlers::operations::list_user_operations),
        )
        .route("/batch-operations", post(handlers::batch::execute_batch))
        .route("/users", get(handlers::users::list_users))
        .route("/circuits", get(handlers::circuits::list_circuits))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            rate_limit::limit_per_client,
        ))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth::require_auth,
        ))
}

/// Authenticated calls to the external dependency, limited globally
pub fn external_routes(state: &AppState) -> Router<AppState> {
    Router::new()
        .route(
            "/external/failing-service",
            post(handlers::external::call_external_service),
        )
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            rate_limit::limit_global,
        ))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth::require_auth,
        ))
}

/// Every `/api/v1` group
pub fn api_v1_routes(state: &AppState) -> Router<AppState> {
    Router::new()
        .merge(public_api_routes(state))
        .merge(protected_api_routes(state))
        .merge(external_routes(state))
}
