//! Log output for the command-line tool.

use tracing_subscriber::{fmt, EnvFilter};

/// Environment variable holding the log filter directive.
pub const LOG_ENV: &str = "ARTIFACT_STAGER_LOG";

/// Install a stderr subscriber filtered by [`LOG_ENV`] (default `info`).
///
/// Calling it more than once is harmless; later calls are ignored.
pub fn init() {
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}
