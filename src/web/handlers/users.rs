//! Committed user entities

use axum::extract::State;
use axum::Json;

use crate::web::errors::ApiResult;
use crate::web::responses::{EntityView, UsersResponse};
use crate::web::state::AppState;

pub const USER_ENTITY: &str = "user";

/// GET /api/v1/users
pub async fn list_users(State(state): State<AppState>) -> ApiResult<Json<UsersResponse>> {
    let users: Vec<EntityView> = state
        .store
        .list(USER_ENTITY)
        .await?
        .into_iter()
        .map(EntityView::from)
        .collect();

    Ok(Json(UsersResponse {
        count: users.len(),
        users,
    }))
}
