use std::io;
use thiserror::Error;

/// Why a worker config could not be produced.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file named on load was unreadable.
    #[error("cannot read worker config {path}: {source}")]
    ReadError {
        /// File path as given.
        path: String,
        /// I/O cause.
        #[source]
        source: io::Error,
    },

    /// A layer was not valid TOML, or the merged tree did not fit
    /// [`crate::WorkerConfig`].
    #[error("invalid TOML in {path}: {source}")]
    ParseError {
        /// File path, or `<embedded defaults>` / `<merged config>`.
        path: String,
        /// TOML cause.
        #[source]
        source: toml::de::Error,
    },

    /// A value parsed but is out of range.
    #[error("{field}: {message}")]
    ValidationError {
        /// Dotted field path.
        field: String,
        /// What is wrong with it.
        message: String,
    },
}

/// Config result alias.
pub type ConfigResult<T> = Result<T, ConfigError>;
