//! Tracing setup.

use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Installs the global subscriber at the configured `level`.
///
/// A `RUST_LOG` directive takes precedence over the configured level.
pub fn init_tracing(level: &str) {
    let filter = log_filter(level, std::env::var("RUST_LOG").ok().as_deref());
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer())
        .try_init();
}

fn log_filter(level: &str, rust_log: Option<&str>) -> EnvFilter {
    rust_log
        .filter(|directives| !directives.trim().is_empty())
        .and_then(|directives| EnvFilter::try_new(directives).ok())
        .unwrap_or_else(|| EnvFilter::new(level))
}
