//! # Resilience Module
//!
//! Circuit breakers that isolate the service from failing dependencies.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use opsgate_core::config::BreakerSettings;
//! use opsgate_core::resilience::{CircuitBreaker, CircuitBreakerError};
//!
//! # async fn example() {
//! let breaker = CircuitBreaker::new("payments", BreakerSettings::default());
//!
//! let result: Result<u32, CircuitBreakerError<std::io::Error>> =
//!     breaker.call(|| async { Ok(42) }).await;
//! # }
//! ```

pub mod circuit_breaker;
pub mod manager;
pub mod metrics;

pub use circuit_breaker::{CircuitBreaker, CircuitBreakerError, CircuitState};
pub use manager::CircuitBreakerManager;
pub use metrics::CircuitBreakerMetrics;
