//! Function metadata built from load requests.

use std::fmt;
use std::path::PathBuf;

use crate::binding_map::BindingMap;
use crate::error::{WorkerError, WorkerResult};
use crate::message::{DataType, Direction, FunctionLoadRequest, RpcBindingInfo};

/// Output binding name reserved for a function's return value.
pub const RETURN_BINDING_NAME: &str = "$return";

/// Binding type used by HTTP output bindings.
pub const HTTP_BINDING_TYPE: &str = "http";

/// Whether `name` is the reserved return slot (ignoring case).
#[must_use]
pub fn is_return_binding(name: &str) -> bool {
    name.eq_ignore_ascii_case(RETURN_BINDING_NAME)
}

/// How a function is executed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FunctionKind {
    /// An ordinary function.
    Regular,
    /// A durable orchestrator.
    Orchestration,
    /// A durable activity.
    Activity,
}

impl FunctionKind {
    /// Derive the kind from a trigger binding type.
    #[must_use]
    pub fn from_trigger_type(binding_type: &str) -> Self {
        if binding_type.eq_ignore_ascii_case("orchestrationTrigger") {
            Self::Orchestration
        } else if binding_type.eq_ignore_ascii_case("activityTrigger") {
            Self::Activity
        } else {
            Self::Regular
        }
    }
}

impl fmt::Display for FunctionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Regular => write!(f, "regular"),
            Self::Orchestration => write!(f, "orchestration"),
            Self::Activity => write!(f, "activity"),
        }
    }
}

/// A declared binding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BindingInfo {
    /// Binding type, e.g. `httpTrigger` or `http`.
    pub binding_type: String,
    /// Direction.
    pub direction: Direction,
    /// Declared data type.
    pub data_type: DataType,
}

impl BindingInfo {
    /// Whether the binding is one of the trigger types.
    #[must_use]
    pub fn is_trigger(&self) -> bool {
        self.binding_type.to_ascii_lowercase().ends_with("trigger")
    }

    /// Whether the binding is an HTTP output.
    #[must_use]
    pub fn is_http(&self) -> bool {
        self.binding_type.eq_ignore_ascii_case(HTTP_BINDING_TYPE)
    }
}

impl From<&RpcBindingInfo> for BindingInfo {
    fn from(info: &RpcBindingInfo) -> Self {
        Self {
            binding_type: info.binding_type.clone(),
            direction: info.direction,
            data_type: info.data_type,
        }
    }
}

/// Immutable description of a loaded function.
#[derive(Debug, Clone, PartialEq)]
pub struct FunctionMetadata {
    /// Host-assigned function id.
    pub function_id: String,
    /// Function name.
    pub name: String,
    /// Execution kind.
    pub kind: FunctionKind,
    /// Directory containing the function.
    pub directory: PathBuf,
    /// Script or module file.
    pub script_file: PathBuf,
    /// Optional entry point.
    pub entry_point: Option<String>,
    /// Input bindings in declaration order (`inout` bindings appear in both).
    pub input_bindings: BindingMap<BindingInfo>,
    /// Output bindings in declaration order, including `$return` if declared.
    pub output_bindings: BindingMap<BindingInfo>,
    /// Whether trigger metadata is passed to the function.
    pub uses_trigger_metadata: bool,
}

impl FunctionMetadata {
    /// Build and validate metadata from a load request.
    ///
    /// # Errors
    ///
    /// Returns [`WorkerError::LoadError`] when the function id or script is
    /// missing, a binding name is declared twice (ignoring case), or
    /// `$return` is declared as an input.
    pub fn from_load_request(request: &FunctionLoadRequest) -> WorkerResult<Self> {
        let id = request.function_id.as_str();
        let meta = &request.metadata;

        if id.is_empty() {
            return Err(WorkerError::load(id, "function id must not be empty"));
        }
        if meta.script_file.is_empty() {
            return Err(WorkerError::load(id, "script file must not be empty"));
        }

        let mut input_bindings = BindingMap::new();
        let mut output_bindings = BindingMap::new();
        let mut seen = BindingMap::new();
        let mut kind = FunctionKind::Regular;

        for binding in &meta.bindings {
            if !seen.insert(binding.name.as_str(), ()) {
                return Err(WorkerError::load(
                    id,
                    format!("binding '{}' is declared more than once", binding.name),
                ));
            }

            let info = BindingInfo::from(binding);
            if matches!(binding.direction, Direction::In | Direction::Inout) {
                if is_return_binding(&binding.name) {
                    return Err(WorkerError::load(
                        id,
                        format!("'{RETURN_BINDING_NAME}' can only be an output binding"),
                    ));
                }
                if info.is_trigger() {
                    kind = FunctionKind::from_trigger_type(&info.binding_type);
                }
                input_bindings.insert(binding.name.as_str(), info.clone());
            }
            if matches!(binding.direction, Direction::Out | Direction::Inout) {
                output_bindings.insert(binding.name.as_str(), info);
            }
        }

        Ok(Self {
            function_id: request.function_id.clone(),
            name: meta.name.clone(),
            kind,
            directory: PathBuf::from(&meta.directory),
            script_file: PathBuf::from(&meta.script_file),
            entry_point: meta.entry_point.clone().filter(|e| !e.is_empty()),
            input_bindings,
            output_bindings,
            uses_trigger_metadata: meta.uses_trigger_metadata,
        })
    }

    /// Whether a `$return` output is declared.
    #[must_use]
    pub fn has_return_binding(&self) -> bool {
        self.output_bindings.contains_key(RETURN_BINDING_NAME)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::RpcFunctionMetadata;

    fn binding(name: &str, binding_type: &str, direction: Direction) -> RpcBindingInfo {
        RpcBindingInfo {
            name: name.into(),
            binding_type: binding_type.into(),
            direction,
            data_type: DataType::Undefined,
        }
    }

    fn request(bindings: Vec<RpcBindingInfo>) -> FunctionLoadRequest {
        FunctionLoadRequest {
            function_id: "f1".into(),
            metadata: RpcFunctionMetadata {
                name: "HttpEcho".into(),
                directory: "/app/HttpEcho".into(),
                script_file: "/app/HttpEcho/run.script".into(),
                bindings,
                ..Default::default()
            },
        }
    }

    #[test]
    fn test_splits_bindings_by_direction() {
        let meta = FunctionMetadata::from_load_request(&request(vec![
            binding("req", "httpTrigger", Direction::In),
            binding("res", "http", Direction::Out),
            binding("state", "blob", Direction::Inout),
        ]))
        .unwrap();

        assert_eq!(meta.kind, FunctionKind::Regular);
        assert_eq!(meta.input_bindings.keys().collect::<Vec<_>>(), vec!["req", "state"]);
        assert_eq!(meta.output_bindings.keys().collect::<Vec<_>>(), vec!["res", "state"]);
        assert!(meta.output_bindings.get("RES").unwrap().is_http());
        assert!(!meta.has_return_binding());
    }

    #[test]
    fn test_kind_from_trigger() {
        let meta = FunctionMetadata::from_load_request(&request(vec![binding(
            "context",
            "orchestrationTrigger",
            Direction::In,
        )]))
        .unwrap();
        assert_eq!(meta.kind, FunctionKind::Orchestration);

        let meta = FunctionMetadata::from_load_request(&request(vec![binding(
            "input",
            "activityTrigger",
            Direction::In,
        )]))
        .unwrap();
        assert_eq!(meta.kind, FunctionKind::Activity);
    }

    #[test]
    fn test_return_binding_detected_ignoring_case() {
        let meta = FunctionMetadata::from_load_request(&request(vec![
            binding("req", "httpTrigger", Direction::In),
            binding("$Return", "http", Direction::Out),
        ]))
        .unwrap();
        assert!(meta.has_return_binding());
    }

    #[test]
    fn test_duplicate_binding_name_rejected() {
        let err = FunctionMetadata::from_load_request(&request(vec![
            binding("req", "httpTrigger", Direction::In),
            binding("Req", "queue", Direction::Out),
        ]))
        .unwrap_err();
        assert!(matches!(err, WorkerError::LoadError { .. }));
    }

    #[test]
    fn test_return_as_input_rejected() {
        let err = FunctionMetadata::from_load_request(&request(vec![binding(
            "$return",
            "queue",
            Direction::In,
        )]))
        .unwrap_err();
        assert!(err.to_string().contains("only be an output"));
    }

    #[test]
    fn test_missing_script_rejected() {
        let mut req = request(Vec::new());
        req.metadata.script_file.clear();
        assert!(FunctionMetadata::from_load_request(&req).is_err());
    }
}
