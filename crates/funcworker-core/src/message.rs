//! Host protocol messages.
//!
//! A [`StreamingMessage`] carries a correlation id and exactly one payload.
//! On the wire a message is a JSON object holding `requestId` plus a single
//! key naming the payload kind:
//!
//! ```json
//! {"requestId": "r1", "workerInitRequest": {"hostVersion": "4.0"}}
//! ```

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{WorkerError, WorkerResult};
use crate::typed_data::TypedData;

/// A single protocol message.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamingMessage {
    /// Correlation id; responses echo the id of their request.
    pub request_id: String,
    /// The kind-specific payload.
    #[serde(flatten)]
    pub content: Content,
}

impl StreamingMessage {
    /// Build a message.
    #[must_use]
    pub fn new(request_id: impl Into<String>, content: Content) -> Self {
        Self {
            request_id: request_id.into(),
            content,
        }
    }

    /// The kind of the payload, or `None` for unrecognized kinds.
    #[must_use]
    pub fn kind(&self) -> Option<MessageKind> {
        self.content.kind()
    }

    /// Decode a message from its JSON object form.
    ///
    /// A payload key the worker does not know yields
    /// [`Content::Unrecognized`], and a known payload that does not decode
    /// yields [`Content::Malformed`], so that the dispatcher can decide how
    /// to treat them.
    ///
    /// # Errors
    ///
    /// Returns [`WorkerError::Transport`] when the value is not an object or
    /// does not carry exactly one payload.
    pub fn from_json(value: serde_json::Value) -> WorkerResult<Self> {
        let serde_json::Value::Object(mut object) = value else {
            return Err(WorkerError::Transport("message is not a JSON object".into()));
        };

        let request_id = match object.remove("requestId") {
            Some(serde_json::Value::String(id)) => id,
            Some(other) => {
                return Err(WorkerError::Transport(format!(
                    "requestId must be a string, got {other}"
                )));
            },
            None => String::new(),
        };

        if object.len() != 1 {
            return Err(WorkerError::Transport(format!(
                "message '{request_id}' must carry exactly one payload, found {}",
                object.len()
            )));
        }

        let Some((kind, payload)) = object.into_iter().next() else {
            return Err(WorkerError::Transport("message has no payload".into()));
        };

        let Some(message_kind) = MessageKind::from_wire_name(&kind) else {
            return Ok(Self::new(request_id, Content::Unrecognized { kind }));
        };

        let tagged = serde_json::Value::Object(std::iter::once((kind, payload.clone())).collect());
        let content = serde_json::from_value(tagged).unwrap_or_else(|e| Content::Malformed {
            kind: message_kind,
            payload,
            reason: e.to_string(),
        });
        Ok(Self::new(request_id, content))
    }
}

/// Kind-specific message payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Content {
    /// Host asks the worker to start.
    WorkerInitRequest(WorkerInitRequest),
    /// Worker acknowledges start.
    WorkerInitResponse(WorkerInitResponse),
    /// Host registers a function.
    FunctionLoadRequest(FunctionLoadRequest),
    /// Worker reports the load outcome.
    FunctionLoadResponse(FunctionLoadResponse),
    /// Host invokes a function.
    InvocationRequest(InvocationRequest),
    /// Worker returns the invocation outcome.
    InvocationResponse(InvocationResponse),
    /// A payload kind this worker does not know.
    #[serde(skip)]
    Unrecognized {
        /// The payload key as received.
        kind: String,
    },
    /// A known payload kind whose body did not decode.
    #[serde(skip)]
    Malformed {
        /// The payload kind named by the key.
        kind: MessageKind,
        /// The payload as received.
        payload: serde_json::Value,
        /// Decode error.
        reason: String,
    },
}

impl Content {
    /// The payload kind, or `None` for [`Content::Unrecognized`].
    #[must_use]
    pub fn kind(&self) -> Option<MessageKind> {
        match self {
            Self::WorkerInitRequest(_) => Some(MessageKind::WorkerInitRequest),
            Self::WorkerInitResponse(_) => Some(MessageKind::WorkerInitResponse),
            Self::FunctionLoadRequest(_) => Some(MessageKind::FunctionLoadRequest),
            Self::FunctionLoadResponse(_) => Some(MessageKind::FunctionLoadResponse),
            Self::InvocationRequest(_) => Some(MessageKind::InvocationRequest),
            Self::InvocationResponse(_) => Some(MessageKind::InvocationResponse),
            Self::Malformed { kind, .. } => Some(*kind),
            Self::Unrecognized { .. } => None,
        }
    }

    /// The status carried by a response payload.
    #[must_use]
    pub fn status(&self) -> Option<&StatusResult> {
        match self {
            Self::WorkerInitResponse(r) => Some(&r.result),
            Self::FunctionLoadResponse(r) => Some(&r.result),
            Self::InvocationResponse(r) => Some(&r.result),
            _ => None,
        }
    }
}

/// Every payload kind the protocol defines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKind {
    /// See [`WorkerInitRequest`].
    WorkerInitRequest,
    /// See [`WorkerInitResponse`].
    WorkerInitResponse,
    /// See [`FunctionLoadRequest`].
    FunctionLoadRequest,
    /// See [`FunctionLoadResponse`].
    FunctionLoadResponse,
    /// See [`InvocationRequest`].
    InvocationRequest,
    /// See [`InvocationResponse`].
    InvocationResponse,
}

impl MessageKind {
    const ALL: [Self; 6] = [
        Self::WorkerInitRequest,
        Self::WorkerInitResponse,
        Self::FunctionLoadRequest,
        Self::FunctionLoadResponse,
        Self::InvocationRequest,
        Self::InvocationResponse,
    ];

    /// JSON key naming this payload.
    #[must_use]
    pub fn wire_name(self) -> &'static str {
        match self {
            Self::WorkerInitRequest => "workerInitRequest",
            Self::WorkerInitResponse => "workerInitResponse",
            Self::FunctionLoadRequest => "functionLoadRequest",
            Self::FunctionLoadResponse => "functionLoadResponse",
            Self::InvocationRequest => "invocationRequest",
            Self::InvocationResponse => "invocationResponse",
        }
    }

    /// Parse a JSON payload key.
    #[must_use]
    pub fn from_wire_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.wire_name() == name)
    }

    /// Whether the host sends this kind to the worker.
    #[must_use]
    pub fn is_request(self) -> bool {
        self.response_kind().is_some()
    }

    /// The response kind paired with a request kind.
    #[must_use]
    pub fn response_kind(self) -> Option<Self> {
        match self {
            Self::WorkerInitRequest => Some(Self::WorkerInitResponse),
            Self::FunctionLoadRequest => Some(Self::FunctionLoadResponse),
            Self::InvocationRequest => Some(Self::InvocationResponse),
            _ => None,
        }
    }
}

impl std::fmt::Display for MessageKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.wire_name())
    }
}

// ---------------------------------------------------------------------------
// Status
// ---------------------------------------------------------------------------

/// Outcome flag of a processed request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Status {
    /// The request succeeded.
    Success,
    /// The request failed; see the exception.
    Failure,
}

/// Structured error returned to the host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RpcException {
    /// Human-readable message.
    pub message: String,
    /// Error type name.
    pub type_name: String,
    /// Stack trace, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stack_trace: Option<String>,
}

/// Outcome of processing one request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusResult {
    /// Success or failure.
    pub status: Status,
    /// Present exactly when `status` is `Failure`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exception: Option<RpcException>,
}

impl StatusResult {
    /// A successful outcome.
    #[must_use]
    pub fn success() -> Self {
        Self {
            status: Status::Success,
            exception: None,
        }
    }

    /// A failed outcome describing `err`.
    ///
    /// Engine errors keep their own type name and stack trace; every other
    /// error reports its [`ErrorKind`](crate::ErrorKind) name.
    #[must_use]
    pub fn failure(err: &WorkerError) -> Self {
        let (type_name, stack_trace) = match err {
            WorkerError::Engine {
                type_name,
                stack_trace,
                ..
            } => (
                type_name
                    .clone()
                    .unwrap_or_else(|| err.kind().as_str().to_string()),
                stack_trace.clone(),
            ),
            _ => (err.kind().as_str().to_string(), None),
        };
        Self {
            status: Status::Failure,
            exception: Some(RpcException {
                message: err.to_string(),
                type_name,
                stack_trace,
            }),
        }
    }

    /// Build from a handler result.
    #[must_use]
    pub fn from_result<T>(result: &WorkerResult<T>) -> Self {
        match result {
            Ok(_) => Self::success(),
            Err(e) => Self::failure(e),
        }
    }

    /// Whether the outcome is a success.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.status == Status::Success
    }
}

// ---------------------------------------------------------------------------
// Payloads
// ---------------------------------------------------------------------------

/// Host → worker: start the protocol.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct WorkerInitRequest {
    /// Version of the host runtime.
    pub host_version: String,
    /// Capabilities advertised by the host.
    pub capabilities: BTreeMap<String, String>,
    /// Directory the worker was launched from.
    pub worker_directory: Option<String>,
}

/// Details about the worker process, returned on init.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkerMetadata {
    /// Name of the language runtime.
    pub runtime_name: String,
    /// Version of the language runtime, as reported by the engine.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub runtime_version: Option<String>,
    /// Version of this worker.
    pub worker_version: String,
}

/// Worker → host: init acknowledged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkerInitResponse {
    /// Capabilities the worker supports.
    #[serde(default)]
    pub capabilities: BTreeMap<String, String>,
    /// Worker process details.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub worker_metadata: Option<WorkerMetadata>,
    /// Outcome.
    pub result: StatusResult,
}

/// Binding direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Direction {
    /// Input binding.
    #[default]
    In,
    /// Output binding.
    Out,
    /// Both input and output.
    Inout,
}

/// Declared data shape of a binding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DataType {
    /// No declaration; values pass through unchanged.
    #[default]
    Undefined,
    /// The function expects text.
    String,
    /// The function expects bytes.
    Binary,
    /// The function expects a byte stream.
    Stream,
}

/// A binding as declared in a load request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RpcBindingInfo {
    /// Binding (parameter) name.
    pub name: String,
    /// Binding type, e.g. `httpTrigger`, `http`, `queue`.
    #[serde(rename = "type")]
    pub binding_type: String,
    /// Direction.
    #[serde(default)]
    pub direction: Direction,
    /// Declared data type.
    #[serde(default)]
    pub data_type: DataType,
}

/// Function description in a load request.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RpcFunctionMetadata {
    /// Function name.
    pub name: String,
    /// Directory containing the function.
    pub directory: String,
    /// Script or module file implementing the function.
    pub script_file: String,
    /// Optional entry point inside the script file.
    pub entry_point: Option<String>,
    /// Bindings in declaration order.
    pub bindings: Vec<RpcBindingInfo>,
    /// Whether the function wants the trigger metadata passed in.
    pub uses_trigger_metadata: bool,
}

/// Host → worker: register a function.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FunctionLoadRequest {
    /// Function id assigned by the host.
    pub function_id: String,
    /// Function description.
    #[serde(default)]
    pub metadata: RpcFunctionMetadata,
}

/// Worker → host: load outcome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FunctionLoadResponse {
    /// Function id from the request.
    pub function_id: String,
    /// Outcome.
    pub result: StatusResult,
}

/// A named wire value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParameterBinding {
    /// Binding name.
    pub name: String,
    /// Value.
    #[serde(default)]
    pub data: TypedData,
}

impl ParameterBinding {
    /// Build a binding.
    #[must_use]
    pub fn new(name: impl Into<String>, data: TypedData) -> Self {
        Self {
            name: name.into(),
            data,
        }
    }
}

/// Host → worker: run a function.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct InvocationRequest {
    /// Invocation id assigned by the host.
    pub invocation_id: String,
    /// Function to run.
    pub function_id: String,
    /// Input bindings in host order.
    pub input_data: Vec<ParameterBinding>,
    /// Trigger metadata entries in host order. Duplicates are allowed on
    /// the wire; the first entry for a key (ignoring case) is used.
    pub trigger_metadata: Vec<ParameterBinding>,
}

/// Worker → host: invocation outcome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvocationResponse {
    /// Invocation id from the request.
    pub invocation_id: String,
    /// Output bindings in declaration order.
    #[serde(default)]
    pub output_data: Vec<ParameterBinding>,
    /// Designated return value.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub return_value: Option<TypedData>,
    /// Outcome.
    pub result: StatusResult,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_every_request_has_a_response_kind() {
        for kind in MessageKind::ALL {
            if kind.is_request() {
                let response = kind.response_kind().unwrap();
                assert!(!response.is_request());
            }
        }
        assert_eq!(
            MessageKind::InvocationRequest.response_kind(),
            Some(MessageKind::InvocationResponse)
        );
    }

    #[test]
    fn test_decode_known_kind() {
        let msg = StreamingMessage::from_json(json!({
            "requestId": "r1",
            "workerInitRequest": { "hostVersion": "4.1" }
        }))
        .unwrap();

        assert_eq!(msg.request_id, "r1");
        assert_eq!(msg.kind(), Some(MessageKind::WorkerInitRequest));
    }

    #[test]
    fn test_decode_unknown_kind() {
        let msg = StreamingMessage::from_json(json!({
            "requestId": "r9",
            "fileChangeEventRequest": {}
        }))
        .unwrap();

        assert_eq!(
            msg.content,
            Content::Unrecognized {
                kind: "fileChangeEventRequest".into()
            }
        );
        assert_eq!(msg.kind(), None);
    }

    #[test]
    fn test_decode_keeps_malformed_known_payload() {
        let msg = StreamingMessage::from_json(json!({
            "requestId": "r4",
            "functionLoadRequest": {
                "functionId": "f1",
                "metadata": { "name": "Echo", "bindings": "not-a-list" }
            }
        }))
        .unwrap();

        assert_eq!(msg.request_id, "r4");
        assert_eq!(msg.kind(), Some(MessageKind::FunctionLoadRequest));
        let Content::Malformed { payload, reason, .. } = &msg.content else {
            panic!("expected a malformed payload, got {:?}", msg.content);
        };
        assert_eq!(payload["functionId"], "f1");
        assert!(!reason.is_empty());
    }

    #[test]
    fn test_decode_rejects_multiple_payloads() {
        let err = StreamingMessage::from_json(json!({
            "requestId": "r1",
            "workerInitRequest": {},
            "invocationRequest": {}
        }))
        .unwrap_err();
        assert!(matches!(err, WorkerError::Transport(_)));
    }

    #[test]
    fn test_encode_response() {
        let msg = StreamingMessage::new(
            "r2",
            Content::FunctionLoadResponse(FunctionLoadResponse {
                function_id: "f1".into(),
                result: StatusResult::success(),
            }),
        );
        let value = serde_json::to_value(&msg).unwrap();
        assert_eq!(
            value,
            json!({
                "requestId": "r2",
                "functionLoadResponse": {
                    "functionId": "f1",
                    "result": { "status": "success" }
                }
            })
        );
    }

    #[test]
    fn test_failure_status_uses_kind_name() {
        let status = StatusResult::failure(&WorkerError::UnknownFunction {
            function_id: "nope".into(),
        });
        assert!(!status.is_success());
        let exception = status.exception.unwrap();
        assert_eq!(exception.type_name, "UnknownFunction");
        assert_eq!(exception.message, "unknown function: nope");
    }

    #[test]
    fn test_failure_status_keeps_engine_details() {
        let status = StatusResult::failure(&WorkerError::Engine {
            message: "division by zero".into(),
            type_name: Some("ArithmeticError".into()),
            stack_trace: Some("at line 3".into()),
        });
        let exception = status.exception.unwrap();
        assert_eq!(exception.type_name, "ArithmeticError");
        assert_eq!(exception.stack_trace.as_deref(), Some("at line 3"));
    }
}
