//! Request deadline
//!
//! Expiry drops the in-flight handler future and answers with the
//! `Service Unavailable` body, so a timeout looks like every other API error.
//! Batches are unaffected since they run on their own task.

use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use tracing::warn;

use crate::web::errors::ApiError;
use crate::web::state::AppState;

const TIMEOUT_RETRY_SECONDS: u64 = 1;

pub async fn enforce_request_timeout(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    let limit = state.config.web.request_timeout();
    let method = request.method().clone();
    let path = request.uri().path().to_string();

    match tokio::time::timeout(limit, next.run(request)).await {
        Ok(response) => response,
        Err(_) => {
            warn!(
                method = %method,
                path = %path,
                timeout_ms = limit.as_millis() as u64,
                "Request exceeded its deadline"
            );
            ApiError::service_unavailable("Request timed out", TIMEOUT_RETRY_SECONDS)
                .into_response()
        }
    }
}
