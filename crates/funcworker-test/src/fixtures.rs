//! Test fixtures for protocol messages and metadata.

use std::collections::BTreeMap;
use std::path::Path;

use funcworker_core::{
    Content, DataType, Direction, FunctionLoadRequest, FunctionMetadata, InvocationRequest,
    ParameterBinding, RpcBindingInfo, RpcFunctionMetadata, RpcHttpRequest, StreamingMessage,
    TypedData, WorkerInitRequest,
};
use funcworker_runtime::{UnitSetup, WorkerEnvironment};

/// Function-app root used by load fixtures.
pub const TEST_APP_ROOT: &str = "/home/site/wwwroot";

/// Create a worker init request.
#[must_use]
pub fn test_worker_init(request_id: &str) -> StreamingMessage {
    StreamingMessage::new(
        request_id,
        Content::WorkerInitRequest(WorkerInitRequest {
            host_version: "4.0.0".into(),
            ..WorkerInitRequest::default()
        }),
    )
}

/// Create a binding declaration.
#[must_use]
pub fn test_binding(name: &str, binding_type: &str, direction: Direction) -> RpcBindingInfo {
    RpcBindingInfo {
        name: name.into(),
        binding_type: binding_type.into(),
        direction,
        data_type: DataType::Undefined,
    }
}

/// Bindings of an HTTP function: `req` trigger in, `res` http out.
#[must_use]
pub fn test_http_bindings() -> Vec<RpcBindingInfo> {
    vec![
        test_binding("req", "httpTrigger", Direction::In),
        test_binding("res", "http", Direction::Out),
    ]
}

/// Bindings of a queue function with a `$return` output.
#[must_use]
pub fn test_queue_bindings() -> Vec<RpcBindingInfo> {
    vec![
        test_binding("item", "queueTrigger", Direction::In),
        test_binding("$return", "queue", Direction::Out),
    ]
}

/// Create a load request body for a function under [`TEST_APP_ROOT`].
#[must_use]
pub fn test_load_request(
    function_id: &str,
    name: &str,
    bindings: Vec<RpcBindingInfo>,
) -> FunctionLoadRequest {
    test_load_request_in(Path::new(TEST_APP_ROOT), function_id, name, bindings)
}

/// Create a load request body for a function under `root`.
#[must_use]
pub fn test_load_request_in(
    root: &Path,
    function_id: &str,
    name: &str,
    bindings: Vec<RpcBindingInfo>,
) -> FunctionLoadRequest {
    let directory = root.join(name);
    FunctionLoadRequest {
        function_id: function_id.into(),
        metadata: RpcFunctionMetadata {
            name: name.into(),
            directory: directory.display().to_string(),
            script_file: directory.join("run.script").display().to_string(),
            entry_point: None,
            bindings,
            uses_trigger_metadata: false,
        },
    }
}

/// Wrap a load request body in a message.
#[must_use]
pub fn test_function_load_message(request_id: &str, request: FunctionLoadRequest) -> StreamingMessage {
    StreamingMessage::new(request_id, Content::FunctionLoadRequest(request))
}

/// Create a function load message for a function under [`TEST_APP_ROOT`].
#[must_use]
pub fn test_function_load(
    request_id: &str,
    function_id: &str,
    name: &str,
    bindings: Vec<RpcBindingInfo>,
) -> StreamingMessage {
    test_function_load_message(request_id, test_load_request(function_id, name, bindings))
}

/// Validated metadata for a function under [`TEST_APP_ROOT`].
///
/// # Panics
///
/// Panics if the bindings do not form valid metadata.
#[must_use]
pub fn test_function_metadata(
    function_id: &str,
    name: &str,
    bindings: Vec<RpcBindingInfo>,
) -> FunctionMetadata {
    FunctionMetadata::from_load_request(&test_load_request(function_id, name, bindings))
        .expect("fixture bindings are valid")
}

/// Create an invocation message.
#[must_use]
pub fn test_invocation(
    request_id: &str,
    invocation_id: &str,
    function_id: &str,
    input_data: Vec<ParameterBinding>,
) -> StreamingMessage {
    StreamingMessage::new(
        request_id,
        Content::InvocationRequest(InvocationRequest {
            invocation_id: invocation_id.into(),
            function_id: function_id.into(),
            input_data,
            trigger_metadata: Vec::new(),
        }),
    )
}

/// Create an invocation message carrying trigger metadata.
#[must_use]
pub fn test_invocation_with_metadata(
    request_id: &str,
    invocation_id: &str,
    function_id: &str,
    input_data: Vec<ParameterBinding>,
    trigger_metadata: Vec<ParameterBinding>,
) -> StreamingMessage {
    StreamingMessage::new(
        request_id,
        Content::InvocationRequest(InvocationRequest {
            invocation_id: invocation_id.into(),
            function_id: function_id.into(),
            input_data,
            trigger_metadata,
        }),
    )
}

/// Create an HTTP GET request with query parameters.
#[must_use]
pub fn test_http_request(query: &[(&str, &str)]) -> TypedData {
    TypedData::HttpRequest(RpcHttpRequest {
        method: "GET".into(),
        url: "https://localhost/api/echo".into(),
        headers: BTreeMap::from([("accept".to_owned(), "application/json".to_owned())]),
        query: query
            .iter()
            .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
            .collect(),
        params: BTreeMap::new(),
        body: None,
    })
}

/// One-time setup rooted at [`TEST_APP_ROOT`].
#[must_use]
pub fn test_unit_setup() -> UnitSetup {
    UnitSetup::new(WorkerEnvironment::from_root(Path::new(TEST_APP_ROOT), "profile"))
}
