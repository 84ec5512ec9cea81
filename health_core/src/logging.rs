//! Logging setup shared by the library's consumers.

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Initialize logging at WARN, overridable with RUST_LOG.
///
/// The CLI prints its results on stdout, so the default stays quiet and
/// diagnostics go to stderr.
pub fn init() {
    init_with_level("warn")
}

/// Install the stderr subscriber with `default_level` as the filter used
/// when RUST_LOG is unset or unparsable.
pub fn init_with_level(default_level: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().compact().with_writer(std::io::stderr))
        .init();
}

/// Debug-level logging routed through the test harness; safe to call from
/// every test.
#[cfg(test)]
pub fn init_test() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_env_filter(EnvFilter::new("debug"))
        .try_init();
}
