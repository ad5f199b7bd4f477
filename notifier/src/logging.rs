//! Diagnostic tracing for the notifier.
//!
//! Tracing output goes to stderr. User-facing annotations (warnings, errors,
//! masks) are workflow commands issued through the platform instead, and are
//! unaffected by the filter below.

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize the tracing subscriber.
///
/// Reads `RUST_LOG`. Without it, defaults to `debug` when the runner has
/// step debug logging on (`RUNNER_DEBUG=1`), else `warn`.
///
/// # Example
/// ```bash
/// RUST_LOG=notifier=debug notifier run
/// ```
pub fn init() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive(std::env::var("RUNNER_DEBUG").ok())));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).compact())
        .init();
}

fn default_directive(runner_debug: Option<String>) -> &'static str {
    match runner_debug.as_deref() {
        Some("1") => "debug",
        _ => "warn",
    }
}
