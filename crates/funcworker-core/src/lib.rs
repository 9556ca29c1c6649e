//! funcworker Core - Protocol and value types for the funcworker language worker.
//!
//! This crate provides:
//! - The host protocol messages and their JSON object form
//! - The wire value set ([`TypedData`]) and the native value set ([`NativeValue`])
//! - [`BindingMap`], the ordered case-insensitive mapping used for bindings
//! - Validated [`FunctionMetadata`]
//! - The [`WorkerError`] taxonomy

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]

pub mod prelude;

pub mod binding_map;
pub mod error;
pub mod function;
pub mod message;
mod serde_base64;
pub mod typed_data;
pub mod value;

pub use binding_map::BindingMap;
pub use error::{ErrorKind, WorkerError, WorkerResult};
pub use function::{
    BindingInfo, FunctionKind, FunctionMetadata, HTTP_BINDING_TYPE, RETURN_BINDING_NAME,
    is_return_binding,
};
pub use message::{
    Content, DataType, Direction, FunctionLoadRequest, FunctionLoadResponse, InvocationRequest,
    InvocationResponse, MessageKind, ParameterBinding, RpcBindingInfo, RpcException,
    RpcFunctionMetadata, Status, StatusResult, StreamingMessage, WorkerInitRequest,
    WorkerInitResponse, WorkerMetadata,
};
pub use typed_data::{RpcHttpRequest, RpcHttpResponse, TypedData};
pub use value::{HttpRequestContext, HttpResponseContext, NativeValue};
