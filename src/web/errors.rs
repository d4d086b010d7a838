//! # API Error Taxonomy
//!
//! Every failure leaving the dispatcher is one of these variants. Component
//! errors are converted here and nowhere else, so storage or library error
//! text never reaches a client.

use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::{json, Value};
use thiserror::Error;
use tracing::{error, warn};

use crate::auth::AuthError;
use crate::batch::BatchError;
use crate::store::StoreError;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Validation failed: {message}")]
    Validation {
        message: String,
        details: Option<Value>,
    },

    #[error("Unauthorized: {message}")]
    Unauthorized { message: String },

    #[error("Not found: {message}")]
    NotFound { message: String },

    #[error("Rate limit of {limit} exceeded, retry after {retry_after_seconds}s")]
    RateLimited {
        limit: u32,
        retry_after_seconds: u64,
    },

    #[error("Service unavailable: {message}")]
    ServiceUnavailable {
        message: String,
        retry_after_seconds: u64,
    },

    #[error("Transaction failed: {message}")]
    TransactionFailed { message: String },

    /// Detail is logged, never returned
    #[error("Internal error: {detail}")]
    Internal { detail: String },
}

impl ApiError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
            details: None,
        }
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::Unauthorized {
            message: message.into(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound {
            message: message.into(),
        }
    }

    pub fn service_unavailable(message: impl Into<String>, retry_after_seconds: u64) -> Self {
        Self::ServiceUnavailable {
            message: message.into(),
            retry_after_seconds: retry_after_seconds.max(1),
        }
    }

    pub fn transaction_failed(message: impl Into<String>) -> Self {
        Self::TransactionFailed {
            message: message.into(),
        }
    }

    pub fn internal(detail: impl Into<String>) -> Self {
        Self::Internal {
            detail: detail.into(),
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::Validation { .. } | ApiError::TransactionFailed { .. } => {
                StatusCode::BAD_REQUEST
            }
            ApiError::Unauthorized { .. } => StatusCode::UNAUTHORIZED,
            ApiError::NotFound { .. } => StatusCode::NOT_FOUND,
            ApiError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            ApiError::ServiceUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn retry_after(&self) -> Option<u64> {
        match self {
            ApiError::RateLimited {
                retry_after_seconds,
                ..
            }
            | ApiError::ServiceUnavailable {
                retry_after_seconds,
                ..
            } => Some(*retry_after_seconds),
            _ => None,
        }
    }

    fn body(&self) -> Value {
        match self {
            ApiError::Validation { message, details } => {
                let mut body = json!({
                    "error": "Validation Error",
                    "message": message,
                });
                if let Some(details) = details {
                    body["details"] = details.clone();
                }
                body
            }
            ApiError::Unauthorized { message } => json!({
                "error": "Unauthorized",
                "message": message,
            }),
            ApiError::NotFound { message } => json!({
                "error": "Not Found",
                "message": message,
            }),
            ApiError::RateLimited {
                limit,
                retry_after_seconds,
            } => json!({
                "error": "Too Many Requests",
                "message": format!("Rate limit of {limit} requests exceeded"),
                "retry_after": retry_after_seconds,
            }),
            ApiError::ServiceUnavailable {
                message,
                retry_after_seconds,
            } => json!({
                "error": "Service Unavailable",
                "message": message,
                "retry_after": retry_after_seconds,
            }),
            ApiError::TransactionFailed { message } => json!({
                "error": "Transaction Failed",
                "message": message,
                "operations_completed": 0,
            }),
            ApiError::Internal { .. } => json!({
                "error": "Internal Server Error",
                "message": "An unexpected error occurred",
            }),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if let ApiError::Internal { detail } = &self {
            error!(detail = %detail, "Request failed with internal error");
        }

        let mut response = (self.status_code(), Json(self.body())).into_response();
        if let Some(seconds) = self.retry_after() {
            response
                .headers_mut()
                .insert(header::RETRY_AFTER, HeaderValue::from(seconds));
        }
        response
    }
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::ConfigurationError(detail) => ApiError::internal(detail),
            other => ApiError::unauthorized(other.client_message()),
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound { .. } => ApiError::not_found(err.client_message()),
            StoreError::InvalidData(message) => ApiError::validation(message),
            other => ApiError::internal(other.to_string()),
        }
    }
}

impl From<BatchError> for ApiError {
    fn from(err: BatchError) -> Self {
        if err.is_validation() {
            ApiError::validation(err.client_message())
        } else {
            warn!(error = %err, "Batch rejected");
            ApiError::transaction_failed(err.client_message())
        }
    }
}

impl From<prometheus::Error> for ApiError {
    fn from(err: prometheus::Error) -> Self {
        ApiError::internal(format!("metrics encoding failed: {err}"))
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
