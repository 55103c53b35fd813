//! Tracing subscriber setup.

use tracing_subscriber::EnvFilter;

/// Install the process-wide subscriber: JSON lines to stderr, `RUST_LOG`
/// style filtering, `info` when no filter is set.
///
/// Only the first call installs anything; tests and benches can all call it.
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .json()
        .with_timer(tracing_subscriber::fmt::time::SystemTime)
        .with_target(false)
        .try_init();
}
