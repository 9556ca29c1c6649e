//! funcworker Runtime - The language worker's request handling.
//!
//! This crate provides:
//! - The [`Dispatcher`], which drives the init / load / invoke protocol
//! - The [`UnitPool`] of exclusive, reusable execution units
//! - The [`FunctionRegistry`] of loaded functions
//! - Conversion between wire and native binding values ([`bindings`])
//! - Channel and JSON-lines transports
//!
//! The scripting engine is reached only through the [`ExecutionEngine`] and
//! [`EngineFactory`] traits.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use funcworker_config::WorkerConfig;
//! use funcworker_runtime::{EngineFactory, JsonLinesSink, JsonLinesSource, config_bridge};
//!
//! # async fn example(factory: Arc<dyn EngineFactory>) -> Result<(), Box<dyn std::error::Error>> {
//! let config = WorkerConfig::load(None)?;
//! let dispatcher = config_bridge::build_dispatcher(&config, factory);
//!
//! let source = JsonLinesSource::new(tokio::io::stdin());
//! let sink = Arc::new(JsonLinesSink::new(tokio::io::stdout()));
//! dispatcher.run(source, sink).await?;
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]

pub mod bindings;
pub mod config_bridge;
pub mod dispatcher;
pub mod environment;
pub mod pool;
pub mod prelude;
pub mod registry;
pub mod transport;
pub mod unit;

pub use dispatcher::{Dispatcher, DispatcherSettings, RUNTIME_NAME};
pub use environment::{TypeAlias, UnitSetup, WorkerEnvironment};
pub use pool::{PoolConfig, PoolStats, UnitLease, UnitPool};
pub use registry::FunctionRegistry;
pub use transport::{
    ChannelSink, ChannelSource, HostEndpoint, JsonLinesSink, JsonLinesSource, MessageSink,
    MessageSource, channel_transport,
};
pub use unit::{EngineFactory, ExecutionEngine, ExecutionUnit, InvocationOutcome, UnitId};
