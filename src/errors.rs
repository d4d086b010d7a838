//! Error types for the Opsgate core.
//!
//! Component-level errors live next to their components (`StoreError`,
//! `CacheError`, `AuthError`, ...). `OpsgateError` is the crate-level error
//! used by bootstrap code that wires those components together.

use thiserror::Error;

use crate::auth::AuthError;
use crate::config::ConfigurationError;
use crate::store::StoreError;

#[derive(Debug, Error)]
pub enum OpsgateError {
    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigurationError),
    #[error("Storage error: {0}")]
    Store(#[from] StoreError),
    #[error("Authentication error: {0}")]
    Auth(#[from] AuthError),
    #[error("Metrics error: {0}")]
    Metrics(#[from] prometheus::Error),
}

pub type OpsgateResult<T> = Result<T, OpsgateError>;
