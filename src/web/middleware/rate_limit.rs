//! # Rate Limit Middleware
//!
//! One middleware per key scheme. Admitted responses carry the
//! `x-ratelimit-*` headers; rejections become a 429 with `Retry-After`.

use axum::extract::{ConnectInfo, Request, State};
use axum::http::{HeaderMap, HeaderName, HeaderValue};
use axum::middleware::Next;
use axum::response::Response;
use std::net::SocketAddr;

use crate::auth::Identity;
use crate::rate_limit::{Admission, RateLimitScope};
use crate::web::errors::ApiError;
use crate::web::state::AppState;

pub const RATE_LIMIT_LIMIT_HEADER: HeaderName = HeaderName::from_static("x-ratelimit-limit");
pub const RATE_LIMIT_REMAINING_HEADER: HeaderName =
    HeaderName::from_static("x-ratelimit-remaining");

const GLOBAL_KEY: &str = "global";

/// Per authenticated caller; must run inside `require_auth`
pub async fn limit_per_client(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let key = match request.extensions().get::<Identity>() {
        Some(identity) => format!("user:{}", identity.id),
        None => format!("ip:{}", client_ip(&request)),
    };
    enforce(&state, RateLimitScope::PerClient, &key, request, next).await
}

pub async fn limit_per_ip(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let key = client_ip(&request);
    enforce(&state, RateLimitScope::PerIp, &key, request, next).await
}

pub async fn limit_global(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    enforce(&state, RateLimitScope::Global, GLOBAL_KEY, request, next).await
}

async fn enforce(
    state: &AppState,
    scope: RateLimitScope,
    key: &str,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    match state.rate_limiters.check(scope, key) {
        None => Ok(next.run(request).await),
        Some(Admission::Rejected {
            limit,
            retry_after_seconds,
        }) => {
            state.metrics.record_rate_limit_rejection(scope.as_str());
            Err(ApiError::RateLimited {
                limit,
                retry_after_seconds,
            })
        }
        Some(Admission::Admitted {
            limit, remaining, ..
        }) => {
            let mut response = next.run(request).await;
            set_limit_headers(response.headers_mut(), limit, remaining);
            Ok(response)
        }
    }
}

fn set_limit_headers(headers: &mut HeaderMap, limit: u32, remaining: u32) {
    headers.insert(RATE_LIMIT_LIMIT_HEADER, HeaderValue::from(limit));
    headers.insert(RATE_LIMIT_REMAINING_HEADER, HeaderValue::from(remaining));
}

/// First `x-forwarded-for` hop, then `x-real-ip`, then the peer address
pub fn client_ip(request: &Request) -> String {
    forwarded_ip(request.headers())
        .or_else(|| {
            request
                .extensions()
                .get::<ConnectInfo<SocketAddr>>()
                .map(|ConnectInfo(addr)| addr.ip().to_string())
        })
        .unwrap_or_else(|| "unknown".to_string())
}

fn forwarded_ip(headers: &HeaderMap) -> Option<String> {
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .or_else(|| {
            headers
                .get("x-real-ip")
                .and_then(|v| v.to_str().ok())
                .map(|s| s.trim().to_string())
        })
}
