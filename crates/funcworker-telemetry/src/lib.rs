//! funcworker Telemetry - Logging and tracing for the funcworker language worker.
//!
//! This crate provides:
//! - `tracing` subscriber setup for stderr, stdout or rolling files, in
//!   pretty, compact, full or JSON format
//! - [`RequestContext`] and [`RequestGuard`], the scope opened around each
//!   protocol message so log lines carry the request and invocation ids
//!
//! # Example
//!
//! ```rust,no_run
//! use funcworker_telemetry::{LogConfig, LogFormat, RequestContext, RequestGuard, setup_logging};
//!
//! # fn main() -> Result<(), funcworker_telemetry::TelemetryError> {
//! let config = LogConfig::new("debug")
//!     .with_format(LogFormat::Json)
//!     .with_directive("funcworker_runtime=trace");
//! let _logging = setup_logging(&config)?;
//!
//! let _guard = RequestGuard::new(
//!     RequestContext::new("r1", "invocationRequest").with_invocation_id("inv-7"),
//! );
//! tracing::info!("handling message");
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

mod context;
mod error;
mod logging;

pub use context::{RequestContext, RequestGuard};
pub use error::{TelemetryError, TelemetryResult};
pub use logging::{FileRotation, LogConfig, LogFormat, LogTarget, LoggingGuard, setup_logging};
