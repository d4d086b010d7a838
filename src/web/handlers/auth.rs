//! Login: exchange configured credentials for a bearer token

use axum::extract::State;
use axum::Json;
use serde::Deserialize;
use tracing::info;

use crate::web::errors::{ApiError, ApiResult};
use crate::web::extractors::JsonBody;
use crate::web::responses::LoginResponse;
use crate::web::state::AppState;

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// POST /api/v1/auth/login
pub async fn login(
    State(state): State<AppState>,
    JsonBody(request): JsonBody<LoginRequest>,
) -> ApiResult<Json<LoginResponse>> {
    if request.email.trim().is_empty() || request.password.is_empty() {
        return Err(ApiError::validation("email and password are required"));
    }

    let identity = state
        .credentials
        .verify(request.email.trim(), &request.password)?;
    let token = state.authenticator.issue_token(&identity)?;

    info!(user_id = %identity.id, "Issued access token");

    Ok(Json(LoginResponse {
        token,
        token_type: "Bearer".to_string(),
        expires_in: state.authenticator.token_expiry_seconds(),
        user: identity,
    }))
}
