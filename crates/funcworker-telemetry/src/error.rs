//! Logging setup failures.

use thiserror::Error;

/// Why logging could not be installed.
#[derive(Debug, Error)]
pub enum TelemetryError {
    /// Bad level, directive or format.
    #[error("invalid logging config: {0}")]
    ConfigError(String),

    /// Another global subscriber is already installed.
    #[error("cannot install subscriber: {0}")]
    InitError(String),

    /// The log directory could not be created.
    #[error("log directory: {0}")]
    IoError(#[from] std::io::Error),
}

/// Telemetry result alias.
pub type TelemetryResult<T> = Result<T, TelemetryError>;
