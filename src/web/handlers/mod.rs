//! # Web API Request Handlers
//!
//! Handlers grouped by endpoint area. Each returns `ApiResult` so failures
//! leave through the [`ApiError`](crate::web::errors::ApiError) taxonomy.

pub mod auth;
pub mod batch;
pub mod circuits;
pub mod external;
pub mod health;
pub mod operations;
pub mod users;

use axum::http::Uri;

use crate::web::errors::ApiError;

/// Fallback for unknown routes
pub async fn not_found(uri: Uri) -> ApiError {
    ApiError::not_found(format!("No route for {}", uri.path()))
}
