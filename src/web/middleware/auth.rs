//! # Authentication Middleware
//!
//! Bearer JWT validation for protected route groups. On success the caller's
//! [`Identity`](crate::auth::Identity) is stored in the request extensions.

use axum::extract::{Request, State};
use axum::http::header::AUTHORIZATION;
use axum::middleware::Next;
use axum::response::Response;
use tracing::{debug, warn};

use crate::web::errors::ApiError;
use crate::web::state::AppState;

pub async fn require_auth(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let identity = state
        .authenticator
        .authenticate(request.headers().get(AUTHORIZATION))
        .map_err(|e| {
            warn!(path = %request.uri().path(), error = %e, "Rejected unauthenticated request");
            ApiError::from(e)
        })?;

    debug!(user_id = %identity.id, "Authenticated request");
    request.extensions_mut().insert(identity);

    Ok(next.run(request).await)
}
