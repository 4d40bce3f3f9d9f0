//! Diagnostics setup.
//!
//! Standard output may be the data channel, so all diagnostics go to
//! standard error.

use std::io::IsTerminal;

use tracing_subscriber::EnvFilter;

/// Environment variable holding a `tracing` filter directive.
pub const LOG_ENV: &str = "STAGEIO_LOG";

/// Install the global subscriber.
///
/// Uses `STAGEIO_LOG` if set, otherwise `default_level`. Returns `false`
/// when a subscriber was already installed.
pub fn init_logging(default_level: &str) -> bool {
    let env_filter =
        EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .with_ansi(std::io::stderr().is_terminal())
        .with_target(false)
        .try_init()
        .is_ok()
}
