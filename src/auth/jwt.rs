//! HS256 JWT issue and validation

use super::{AuthError, Identity};
use crate::config::{AuthConfig, MAX_TOKEN_EXPIRY_SECONDS};
use axum::http::HeaderValue;
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, warn};

/// JWT claims carried by access tokens
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    /// Subject (user identifier)
    pub sub: String,
    pub email: String,
    pub iss: String,
    pub aud: String,
    /// Expiration time (Unix timestamp)
    pub exp: i64,
    /// Issued at time (Unix timestamp)
    pub iat: i64,
}

#[derive(Clone)]
pub struct JwtAuthenticator {
    issuer: String,
    audience: String,
    token_expiry_seconds: u64,
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
}

impl std::fmt::Debug for JwtAuthenticator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JwtAuthenticator")
            .field("issuer", &self.issuer)
            .field("audience", &self.audience)
            .field("token_expiry_seconds", &self.token_expiry_seconds)
            .finish_non_exhaustive()
    }
}

impl JwtAuthenticator {
    pub fn from_config(config: &AuthConfig) -> Result<Self, AuthError> {
        if config.jwt_secret.is_empty() {
            return Err(AuthError::ConfigurationError(
                "JWT secret not configured".to_string(),
            ));
        }
        if config.token_expiry_seconds == 0
            || config.token_expiry_seconds > MAX_TOKEN_EXPIRY_SECONDS
        {
            return Err(AuthError::ConfigurationError(format!(
                "token expiry of {}s is outside 1..={MAX_TOKEN_EXPIRY_SECONDS}s",
                config.token_expiry_seconds
            )));
        }

        let secret = config.jwt_secret.as_bytes();
        Ok(Self {
            issuer: config.jwt_issuer.clone(),
            audience: config.jwt_audience.clone(),
            token_expiry_seconds: config.token_expiry_seconds,
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
        })
    }

    pub fn token_expiry_seconds(&self) -> u64 {
        self.token_expiry_seconds
    }

    /// Resolve the caller from an `Authorization` header value
    pub fn authenticate(&self, header: Option<&HeaderValue>) -> Result<Identity, AuthError> {
        let header = header.ok_or(AuthError::MissingAuthHeader)?;
        let token = Self::extract_bearer_token(header)?;
        let claims = self.validate_token(token)?;
        Ok(Identity {
            id: claims.sub,
            email: claims.email,
        })
    }

    /// Extract bearer token from Authorization header
    pub fn extract_bearer_token(auth_header: &HeaderValue) -> Result<&str, AuthError> {
        let auth_str = auth_header
            .to_str()
            .map_err(|_| AuthError::InvalidAuthFormat)?;

        // auth scheme names are case-insensitive (RFC 9110 §11.1)
        match auth_str.trim_start().split_once(' ') {
            Some((scheme, token))
                if scheme.eq_ignore_ascii_case("bearer") && !token.trim().is_empty() =>
            {
                Ok(token.trim())
            }
            _ => Err(AuthError::InvalidAuthFormat),
        }
    }

    /// Verify signature, expiry, issuer and audience
    pub fn validate_token(&self, token: &str) -> Result<Claims, AuthError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[&self.issuer]);
        validation.set_audience(&[&self.audience]);
        validation.set_required_spec_claims(&["exp", "sub", "iss", "aud"]);
        validation.leeway = 5;

        let token_data = decode::<Claims>(token, &self.decoding_key, &validation).map_err(|e| {
            warn!(error = %e, "JWT token validation failed");
            AuthError::JwtError(e)
        })?;

        debug!(subject = %token_data.claims.sub, "Token validated successfully");
        Ok(token_data.claims)
    }

    pub fn issue_token(&self, identity: &Identity) -> Result<String, AuthError> {
        let now = Utc::now();
        // bounded by MAX_TOKEN_EXPIRY_SECONDS in from_config
        let expiry = now + Duration::seconds(self.token_expiry_seconds as i64);
        self.encode_claims(&Claims {
            sub: identity.id.clone(),
            email: identity.email.clone(),
            iss: self.issuer.clone(),
            aud: self.audience.clone(),
            exp: expiry.timestamp(),
            iat: now.timestamp(),
        })
    }

    fn encode_claims(&self, claims: &Claims) -> Result<String, AuthError> {
        encode(&Header::new(Algorithm::HS256), claims, &self.encoding_key).map_err(|e| {
            error!(error = %e, "Failed to generate JWT token");
            AuthError::JwtError(e)
        })
    }
}
