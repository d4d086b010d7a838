//! # Web API Middleware
//!
//! Request ID, metrics, request deadline, authentication and rate limiting.
//! The shared stack applied to every route lives in
//! [`apply_middleware_stack`]; auth and rate limiting are attached per route
//! group in `web::create_app`.

pub mod auth;
pub mod metrics;
pub mod rate_limit;
pub mod request_id;
pub mod timeout;

use axum::middleware;
use axum::response::{IntoResponse, Response};
use axum::Router;
use std::any::Any;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::web::errors::ApiError;
use crate::web::state::AppState;

/// Apply the shared middleware stack, outermost first:
/// 1. Request tracing
/// 2. Request ID
/// 3. Request metrics (sees the final status, including timeouts and panics)
/// 4. Panic containment
/// 5. Request timeout
/// 6. CORS handling
pub fn apply_middleware_stack(router: Router<AppState>, state: &AppState) -> Router<AppState> {
    router
        .layer(create_cors_layer())
        .layer(middleware::from_fn_with_state(
            state.clone(),
            timeout::enforce_request_timeout,
        ))
        .layer(CatchPanicLayer::custom(handle_panic))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            metrics::track_metrics,
        ))
        .layer(middleware::from_fn(request_id::add_request_id))
        .layer(TraceLayer::new_for_http())
}

fn create_cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(tower_http::cors::Any)
        .allow_methods(tower_http::cors::Any)
        .allow_headers(tower_http::cors::Any)
}

fn handle_panic(panic: Box<dyn Any + Send + 'static>) -> Response {
    let detail = panic
        .downcast_ref::<String>()
        .map(String::as_str)
        .or_else(|| panic.downcast_ref::<&str>().copied())
        .unwrap_or("unknown panic payload");
    ApiError::internal(format!("handler panicked: {detail}")).into_response()
}
