// src/logging.rs

//! Structured logging for the provider process.
//!
//! Logs go to **stderr**; the plugin protocol owns stdout. Filtering follows
//! `RUST_LOG`, e.g. `RUST_LOG=spot_provider_core=debug` to trace token
//! exchange and readiness polling.

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Default filter when `RUST_LOG` is unset.
pub const DEFAULT_LOG_LEVEL: &str = "info";

fn env_filter(default_level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level))
}

fn subscriber(
    default_level: &str,
) -> impl tracing::Subscriber + Send + Sync + 'static {
    tracing_subscriber::registry().with(env_filter(default_level)).with(
        fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(true)
            .with_file(false)
            .with_line_number(false),
    )
}

/// Installs the global subscriber at [`DEFAULT_LOG_LEVEL`].
///
/// # Panics
///
/// Panics if a global subscriber has already been set.
pub fn init_logging() {
    init_logging_with_default(DEFAULT_LOG_LEVEL);
}

/// Like [`init_logging`], with a different fallback level.
pub fn init_logging_with_default(default_level: &str) {
    subscriber(default_level).init();
}

/// Installs the global subscriber unless one is already set.
///
/// Returns `false` when another subscriber won.
pub fn try_init_logging() -> bool {
    subscriber(DEFAULT_LOG_LEVEL).try_init().is_ok()
}
