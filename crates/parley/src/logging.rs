//! Logging setup for binaries built on Parley.
//!
//! The library itself only emits `tracing` events. Binaries call
//! [`init_logging`] once at startup to print them.

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// The filter used when `RUST_LOG` is not set.
pub const DEFAULT_LOG_DIRECTIVE: &str = "info";

/// Installs a console subscriber filtered by `RUST_LOG`, falling back to
/// `default_directive` (e.g. `"info,parley=debug"`).
///
/// Returns `false` if a global subscriber was already installed; calling
/// this twice is harmless.
pub fn init_logging(default_directive: &str) -> bool {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive));

    let console = fmt::layer()
        .with_target(true)
        .with_thread_names(true)
        .with_level(true)
        .with_timer(fmt::time::uptime());

    tracing_subscriber::registry()
        .with(filter)
        .with(console)
        .try_init()
        .is_ok()
}
