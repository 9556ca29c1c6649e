#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
//! Configuration for the funcworker language worker.
//!
//! # Usage
//!
//! ```rust,no_run
//! use funcworker_config::WorkerConfig;
//!
//! let config = WorkerConfig::load(Some(std::path::Path::new("worker.toml"))).unwrap();
//! println!("pool size: {}", config.pool.size);
//! ```
//!
//! # Precedence
//!
//! From highest to lowest priority:
//!
//! 1. The config file passed to [`WorkerConfig::load`]
//! 2. Environment variables (`FUNCWORKER_*`), fallback only
//! 3. Embedded defaults (`defaults.toml` compiled into the binary)
//!
//! This crate has no dependencies on other funcworker crates. Conversion to
//! runtime types happens in `funcworker-runtime`'s config bridge.

/// Environment variable fallback resolution.
pub mod env;
/// Configuration error types.
pub mod error;
/// Config file loading.
pub mod loader;
/// Layered TOML merging.
pub mod merge;
/// Configuration struct definitions.
pub mod types;
/// Configuration validation rules.
pub mod validate;

pub use error::{ConfigError, ConfigResult};
pub use types::*;

impl WorkerConfig {
    /// Load configuration: defaults, then `path`, then env fallbacks.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] if the file is unreadable or malformed, or
    /// if the final configuration fails validation.
    pub fn load(path: Option<&std::path::Path>) -> ConfigResult<Self> {
        loader::load(path)
    }

    /// Validate this configuration.
    ///
    /// # Errors
    ///
    /// Returns the first [`ConfigError::ValidationError`] found.
    pub fn validate(&self) -> ConfigResult<()> {
        validate::validate(self)
    }
}
