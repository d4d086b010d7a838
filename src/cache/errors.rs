use thiserror::Error;

/// Cache failures. None of them reach a client: `ProtectedCache` logs them
/// and falls back to the persistence gateway.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache backend unavailable: {0}")]
    Unavailable(String),

    #[error("cache call exceeded {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },
}

pub type CacheResult<T> = Result<T, CacheError>;
