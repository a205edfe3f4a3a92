//! Tracing/logging initialization.
//!
//! JSON lines with timestamps and targets, filtered by `RUST_LOG`. Operational
//! alerts are emitted on [`OPS_TARGET`], so a deployment can route or filter
//! them on their own (`RUST_LOG=warn,rolegate::ops=error`).

use tracing_subscriber::EnvFilter;

/// Filter used when `RUST_LOG` is unset or invalid.
pub const DEFAULT_FILTER: &str = "info";

/// Target carrying operational alerts.
pub const OPS_TARGET: &str = "rolegate::ops";

/// Filter from `RUST_LOG`, falling back to `default`.
pub fn env_filter(default: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default))
}

/// Initialize tracing/logging for the process.
///
/// Safe to call multiple times (subsequent calls are no-ops).
pub fn init() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter(DEFAULT_FILTER))
        .json()
        .with_timer(tracing_subscriber::fmt::time::SystemTime)
        .with_target(true)
        .try_init();
}
