//! Prelude module - commonly used types for convenient import.
//!
//! Use `use funcworker_core::prelude::*;` to import all essential types.

// Errors
pub use crate::{ErrorKind, WorkerError, WorkerResult};

// Protocol
pub use crate::{
    Content, InvocationRequest, InvocationResponse, MessageKind, ParameterBinding, StatusResult,
    StreamingMessage,
};

// Values and metadata
pub use crate::{BindingMap, FunctionKind, FunctionMetadata, NativeValue, TypedData};
