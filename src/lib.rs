#![allow(clippy::doc_markdown)] // Allow technical terms like PostgreSQL, SQLx in docs
#![allow(clippy::missing_errors_doc)] // Allow public functions without # Errors sections
#![allow(clippy::must_use_candidate)] // Allow methods without must_use when context is clear

//! # Opsgate Core
//!
//! Backend API core: authenticated request handling, atomic multi-entity
//! batches with rollback, per-key rate limiting, circuit breaking for
//! unreliable dependencies, and health and metrics reporting.
//!
//! ## Module Organization
//!
//! - [`config`] - Layered TOML + environment configuration
//! - [`logging`] - Tracing subscriber setup
//! - [`errors`] - Crate-level error type
//! - [`metrics`] - Prometheus series served by `/metrics`
//! - [`cache`] - Cache gateway with a circuit-breaker protected wrapper
//! - [`store`] - Transactional persistence gateway (memory, PostgreSQL)
//! - [`rate_limit`] - Fixed-window rate limiting per client key
//! - [`resilience`] - Circuit breakers per guarded dependency
//! - [`batch`] - Atomic batch transaction processor
//! - [`auth`] - JWT issue/validation and login credentials
//! - [`external`] - Guarded external dependencies
//! - [`web`] - Axum router, middleware and handlers
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use opsgate_core::config::OpsgateConfig;
//! use opsgate_core::web::{create_app, AppState};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let state = AppState::builder(OpsgateConfig::default()).build().await?;
//! let app = create_app(state);
//! let listener = tokio::net::TcpListener::bind("127.0.0.1:8080").await?;
//! axum::serve(listener, app).await?;
//! # Ok(())
//! # }
//! ```

pub mod auth;
pub mod batch;
pub mod cache;
pub mod config;
pub mod errors;
pub mod external;
pub mod logging;
pub mod metrics;
pub mod rate_limit;
pub mod resilience;
pub mod store;
pub mod web;

pub use config::{ConfigManager, OpsgateConfig};
pub use errors::{OpsgateError, OpsgateResult};
