//! Shared tracing setup for test harnesses and benches.
//!
//! Allocation decisions (shortfalls, retries, confirmations) are traced where
//! they happen; this crate only owns the subscriber wiring.

/// Install the process-wide tracing subscriber. Idempotent.
pub fn init() {
    tracing::init();
}

/// Subscriber configuration (filter and formatting).
pub mod tracing;
