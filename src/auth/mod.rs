//! # Auth Gateway
//!
//! Bearer JWT validation for protected routes and credential checks for the
//! login endpoint.

pub mod credentials;
pub mod jwt;

pub use credentials::CredentialStore;
pub use jwt::{Claims, JwtAuthenticator};

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AuthError {
    #[error("Missing authorization header")]
    MissingAuthHeader,

    #[error("Invalid authorization header format")]
    InvalidAuthFormat,

    #[error("JWT processing error: {0}")]
    JwtError(#[from] jsonwebtoken::errors::Error),

    #[error("Invalid email or password")]
    InvalidCredentials,

    #[error("Configuration error: {0}")]
    ConfigurationError(String),
}

impl AuthError {
    /// Message returned to clients in the 401 body
    pub fn client_message(&self) -> &'static str {
        match self {
            AuthError::MissingAuthHeader => "Missing authentication credentials",
            AuthError::InvalidAuthFormat => "Authorization header must use the Bearer scheme",
            AuthError::JwtError(_) => "Invalid or expired token",
            AuthError::InvalidCredentials => "Invalid email or password",
            AuthError::ConfigurationError(_) => "Authentication unavailable",
        }
    }
}

/// Caller identity decoded from a validated token; lives for one request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub id: String,
    pub email: String,
}
