//! # Tracing Module
//!
//! Environment-aware console logging using the tracing ecosystem. Logs go to
//! stdout, which is what container runtimes collect.
//!
//! - `RUST_LOG` wins when set; otherwise the level follows `OPSGATE_ENV`
//! - `OPSGATE_LOG_FORMAT=json` switches to one JSON object per line
//! - ANSI colors only when stdout is a terminal

use std::io::IsTerminal;
use std::sync::OnceLock;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

static TRACING_INITIALIZED: OnceLock<()> = OnceLock::new();

/// Output format for the console layer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Json,
}

impl LogFormat {
    fn from_env() -> Self {
        match std::env::var("OPSGATE_LOG_FORMAT") {
            Ok(v) if v.eq_ignore_ascii_case("json") => LogFormat::Json,
            _ => LogFormat::Pretty,
        }
    }
}

/// Initialize console logging. Safe to call more than once; only the first
/// call installs a subscriber, and an already-installed global subscriber
/// (test harnesses, embedding hosts) is left alone.
pub fn init_tracing() {
    TRACING_INITIALIZED.get_or_init(|| {
        let environment = get_environment();
        let filter = std::env::var("RUST_LOG")
            .ok()
            .and_then(|directives| EnvFilter::try_new(directives).ok())
            .unwrap_or_else(|| EnvFilter::new(get_log_level(&environment)));
        let format = LogFormat::from_env();
        let use_ansi = IsTerminal::is_terminal(&std::io::stdout());

        let console_layer = match format {
            LogFormat::Json => fmt::layer()
                .json()
                .with_target(true)
                .with_current_span(true)
                .with_filter(filter)
                .boxed(),
            LogFormat::Pretty => fmt::layer()
                .with_target(true)
                .with_thread_ids(true)
                .with_level(true)
                .with_ansi(use_ansi)
                .with_filter(filter)
                .boxed(),
        };

        let subscriber = tracing_subscriber::registry().with(console_layer);

        if subscriber.try_init().is_err() {
            tracing::debug!(
                "Global tracing subscriber already initialized - continuing with existing subscriber"
            );
        } else {
            tracing::info!(
                environment = %environment,
                format = ?format,
                ansi_colors = use_ansi,
                "Console logging initialized"
            );
        }
    });
}

/// Current environment from `OPSGATE_ENV`, then `APP_ENV`
pub fn get_environment() -> String {
    std::env::var("OPSGATE_ENV")
        .or_else(|_| std::env::var("APP_ENV"))
        .unwrap_or_else(|_| "development".to_string())
}

/// Default filter directives for an environment
pub fn get_log_level(environment: &str) -> String {
    match environment {
        "production" => "info".to_string(),
        "test" => "warn,opsgate_core=debug".to_string(),
        _ => "debug,hyper=info,sqlx=warn,tower_http=debug".to_string(),
    }
}

/// Structured record of a finished batch transaction
pub fn log_batch_transaction(
    batch_id: &uuid::Uuid,
    success: bool,
    operations_attempted: usize,
    operations_completed: usize,
    details: Option<&str>,
) {
    if success {
        tracing::info!(
            batch_id = %batch_id,
            operations_attempted,
            operations_completed,
            "Batch transaction committed"
        );
    } else {
        tracing::warn!(
            batch_id = %batch_id,
            operations_attempted,
            operations_completed,
            details = details,
            "Batch transaction rolled back"
        );
    }
}
