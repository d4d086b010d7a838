//! # Cache Gateway
//!
//! ```text
//! ProtectedCache               <- circuit breaker, degrades to miss / no-op
//!   └── CacheProvider (enum)   <- dispatch over the configured backend
//!         ├── Moka(MokaCache)      <- per-entry TTL
//!         └── Disabled
//! ```
//!
//! Cache failures never fail a request; handlers fall back to the
//! persistence gateway.

pub mod errors;
pub mod moka;
pub mod protected;
pub mod provider;
pub mod traits;

pub use self::moka::MokaCache;
pub use errors::{CacheError, CacheResult};
pub use protected::ProtectedCache;
pub use provider::CacheProvider;
pub use traits::CacheService;
