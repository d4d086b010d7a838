//! # Custom Axum Extractors
//!
//! The authenticated caller and a JSON body extractor whose rejections
//! follow the API error taxonomy.

use axum::async_trait;
use axum::extract::rejection::JsonRejection;
use axum::extract::{FromRequest, FromRequestParts, Request};
use axum::http::request::Parts;
use axum::Json;
use serde::de::DeserializeOwned;
use serde_json::json;
use tracing::debug;

use crate::auth::Identity;
use crate::web::errors::ApiError;

/// Caller placed in the request extensions by `require_auth`
pub struct AuthenticatedUser(pub Identity);

#[async_trait]
impl<S> FromRequestParts<S> for AuthenticatedUser
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let identity = parts
            .extensions
            .get::<Identity>()
            .cloned()
            .ok_or_else(|| ApiError::unauthorized("Authentication required"))?;

        debug!(user_id = %identity.id, "Extracted authenticated user");

        Ok(Self(identity))
    }
}

/// `Json<T>` whose failures become a 400 `ValidationError`
pub struct JsonBody<T>(pub T);

#[async_trait]
impl<S, T> FromRequest<S> for JsonBody<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        match Json::<T>::from_request(req, state).await {
            Ok(Json(value)) => Ok(Self(value)),
            Err(rejection) => Err(json_rejection(rejection)),
        }
    }
}

fn json_rejection(rejection: JsonRejection) -> ApiError {
    let message = match &rejection {
        JsonRejection::MissingJsonContentType(_) => "Expected a JSON request body",
        JsonRejection::JsonSyntaxError(_) => "Request body is not valid JSON",
        JsonRejection::JsonDataError(_) => "Request body has an unexpected shape",
        _ => "Request body could not be read",
    };
    ApiError::Validation {
        message: message.to_string(),
        details: Some(json!({ "reason": rejection.body_text() })),
    }
}
