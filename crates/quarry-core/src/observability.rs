//! Observability infrastructure for quarry services.
//!
//! Structured logging with consistent spans. This module provides the
//! one-time logging initialization and span constructors shared by the
//! services.

use std::sync::Once;

use tracing::Span;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

static INIT: Once = Once::new();

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    /// JSON structured logs (for production).
    Json,
    /// Pretty-printed logs (for development).
    #[default]
    Pretty,
}

/// Initializes the logging subsystem.
///
/// Call once at application startup. Safe to call multiple times;
/// subsequent calls are no-ops.
///
/// # Environment Variables
///
/// - `RUST_LOG`: controls log levels (e.g., `info`, `quarry_importer=debug`)
pub fn init_logging(format: LogFormat) {
    INIT.call_once(|| {
        let env_filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

        match format {
            LogFormat::Json => {
                tracing_subscriber::registry()
                    .with(env_filter)
                    .with(fmt::layer().json())
                    .init();
            }
            LogFormat::Pretty => {
                tracing_subscriber::registry()
                    .with(env_filter)
                    .with(fmt::layer().pretty())
                    .init();
            }
        }
    });
}

/// Creates a span for per-package pipeline operations.
///
/// # Example
///
/// ```rust
/// use quarry_core::observability::package_span;
///
/// let span = package_span("unpack", "i3-wm_4.7.2-1");
/// let _guard = span.enter();
/// ```
#[must_use]
pub fn package_span(operation: &str, pkg: &str) -> Span {
    tracing::info_span!("package", op = operation, pkg = pkg)
}
