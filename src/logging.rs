//! Logging setup for the provider.
//!
//! Logs go to **stderr** through a `tracing-subscriber` registry. The filter
//! is read from `TERASWITCH_LOG` first, then `RUST_LOG`, falling back to the
//! given default level.
//!
//! ```bash
//! # Trace every poll iteration and request
//! TERASWITCH_LOG=teraswitch_provider=debug ./my-host
//! ```

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Environment variable consulted before `RUST_LOG`.
pub const LOG_ENV: &str = "TERASWITCH_LOG";

fn env_filter(default_level: &str) -> EnvFilter {
    EnvFilter::try_from_env(LOG_ENV)
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new(default_level))
}

fn subscriber(default_level: &str) -> impl tracing::Subscriber + Send + Sync + 'static {
    tracing_subscriber::registry().with(env_filter(default_level)).with(
        fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(true)
            .with_thread_ids(false)
            .with_file(false)
            .with_line_number(false),
    )
}

/// Install the default subscriber at `info`.
///
/// # Panics
///
/// Panics if a global subscriber has already been set.
pub fn init_logging() {
    init_logging_with_default("info");
}

/// Install the subscriber with a custom default level.
///
/// # Panics
///
/// Panics if a global subscriber has already been set.
pub fn init_logging_with_default(default_level: &str) {
    subscriber(default_level).init();
}

/// Try to install the subscriber, returning false if one already exists.
pub fn try_init_logging() -> bool {
    subscriber("info").try_init().is_ok()
}
