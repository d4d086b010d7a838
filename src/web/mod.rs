//! # Web API Module
//!
//! Axum request router and dispatcher.
//!
//! ## Core Components
//!
//! - [`routes`] - Route groups and the guards each one carries
//! - [`handlers`] - Request handlers per endpoint area
//! - [`middleware`] - Request ID, metrics, authentication, rate limiting
//! - [`errors`] - The API error taxonomy and its HTTP mapping
//! - [`state`] - Shared application state

pub mod errors;
pub mod extractors;
pub mod handlers;
pub mod middleware;
pub mod responses;
pub mod routes;
pub mod state;

use axum::Router;

pub use errors::{ApiError, ApiResult};
pub use state::{AppState, AppStateBuilder};

/// Create the main Axum application with all routes and middleware
pub fn create_app(app_state: AppState) -> Router {
    let router = Router::new()
        .merge(routes::health_routes())
        .nest("/api/v1", routes::api_v1_routes(&app_state))
        .fallback(handlers::not_found);

    middleware::apply_middleware_stack(router, &app_state).with_state(app_state)
}
