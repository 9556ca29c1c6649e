//! Prelude module - commonly used types for convenient import.
//!
//! Use `use funcworker_runtime::prelude::*;` to import all essential types.

// Dispatch
pub use crate::{Dispatcher, DispatcherSettings, MessageSink, MessageSource};

// Pool and engines
pub use crate::{EngineFactory, ExecutionEngine, PoolConfig, UnitPool, UnitSetup};

// Registry
pub use crate::FunctionRegistry;

// Core types
pub use funcworker_core::prelude::*;
