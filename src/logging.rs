//! Subscriber setup for binaries embedding the library.

use thiserror::Error;
use tracing_subscriber::{fmt, EnvFilter};

/// Failure to install the global subscriber.
#[derive(Debug, Error)]
pub enum LoggingError {
    /// The level string is not a valid `EnvFilter` directive.
    #[error("invalid log level: {0}")]
    InvalidLevel(String),
    /// A global subscriber was installed earlier in the process.
    #[error("logging already initialized")]
    AlreadyInitialized,
}

/// Installs a formatted subscriber filtered by `level` (any `EnvFilter`
/// directive, e.g. `warn` or `planscope=debug`). Output goes to stderr.
pub fn init_logging(level: &str) -> Result<(), LoggingError> {
    let filter = EnvFilter::try_new(level).map_err(|e| LoggingError::InvalidLevel(e.to_string()))?;
    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|_| LoggingError::AlreadyInitialized)
}
