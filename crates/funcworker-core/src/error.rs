//! Worker error taxonomy.
//!
//! Every failure the worker can observe maps onto one [`ErrorKind`]. Handlers
//! return [`WorkerError`] values; the dispatcher folds the recoverable ones
//! into a failed `StatusResult` and aborts only on fatal kinds.

use std::fmt;

use thiserror::Error;

/// Errors raised while serving the host protocol.
#[derive(Debug, Error)]
pub enum WorkerError {
    /// The inbound stream carried a message the worker cannot handle.
    #[error("protocol violation: {0}")]
    ProtocolViolation(String),

    /// Function load or one-time environment setup failed.
    #[error("failed to load function '{function_id}': {message}")]
    LoadError {
        /// Function being loaded.
        function_id: String,
        /// Failure description.
        message: String,
    },

    /// No function with this id has been loaded.
    #[error("unknown function: {function_id}")]
    UnknownFunction {
        /// The requested function id.
        function_id: String,
    },

    /// A function with this id has already been loaded.
    #[error("function already loaded: {function_id}")]
    DuplicateFunction {
        /// The duplicated function id.
        function_id: String,
    },

    /// The requested behavior is deliberately unsupported.
    #[error("not implemented: {0}")]
    NotImplemented(String),

    /// A request of a known kind whose payload did not decode.
    #[error("malformed request: {0}")]
    MalformedRequest(String),

    /// A value could not be converted between wire and native form.
    #[error("unsupported binding type: {0}")]
    UnsupportedBindingType(String),

    /// No execution unit became available within the configured wait.
    #[error("no execution unit available after {waited_ms}ms")]
    PoolExhaustedTimeout {
        /// How long the caller waited.
        waited_ms: u64,
    },

    /// The execution engine raised while running a function.
    #[error("{message}")]
    Engine {
        /// Error message reported by the engine.
        message: String,
        /// Engine-side type name of the error.
        type_name: Option<String>,
        /// Engine-side stack trace, when available.
        stack_trace: Option<String>,
    },

    /// Reading or writing the message stream failed.
    #[error("transport error: {0}")]
    Transport(String),
}

impl WorkerError {
    /// Create an engine error carrying only a message.
    #[must_use]
    pub fn engine(message: impl Into<String>) -> Self {
        Self::Engine {
            message: message.into(),
            type_name: None,
            stack_trace: None,
        }
    }

    /// Create a load error for the given function.
    #[must_use]
    pub fn load(function_id: impl Into<String>, message: impl fmt::Display) -> Self {
        Self::LoadError {
            function_id: function_id.into(),
            message: message.to_string(),
        }
    }

    /// The classification of this error.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::ProtocolViolation(_) => ErrorKind::ProtocolViolation,
            Self::LoadError { .. } => ErrorKind::LoadError,
            Self::UnknownFunction { .. } => ErrorKind::UnknownFunction,
            Self::DuplicateFunction { .. } => ErrorKind::DuplicateFunction,
            Self::NotImplemented(_) => ErrorKind::NotImplemented,
            Self::MalformedRequest(_) => ErrorKind::MalformedRequest,
            Self::UnsupportedBindingType(_) => ErrorKind::UnsupportedBindingType,
            Self::PoolExhaustedTimeout { .. } => ErrorKind::PoolExhaustedTimeout,
            Self::Engine { .. } => ErrorKind::InvocationFailed,
            Self::Transport(_) => ErrorKind::Transport,
        }
    }

    /// Whether this error must terminate the dispatch loop.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        self.kind().is_fatal()
    }
}

impl From<std::io::Error> for WorkerError {
    fn from(e: std::io::Error) -> Self {
        Self::Transport(e.to_string())
    }
}

/// Classification of a [`WorkerError`], reported to the host as the
/// exception type name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Unrecognized or unexpected message kind.
    ProtocolViolation,
    /// Function load failure.
    LoadError,
    /// Lookup of an unregistered function.
    UnknownFunction,
    /// Registration of an already registered function.
    DuplicateFunction,
    /// Unsupported function kind or feature.
    NotImplemented,
    /// Request payload that did not decode.
    MalformedRequest,
    /// Binding conversion failure.
    UnsupportedBindingType,
    /// Bounded checkout wait elapsed.
    PoolExhaustedTimeout,
    /// The function itself failed.
    InvocationFailed,
    /// Stream I/O or decoding failure.
    Transport,
}

impl ErrorKind {
    /// Stable name sent on the wire.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ProtocolViolation => "ProtocolViolation",
            Self::LoadError => "LoadError",
            Self::UnknownFunction => "UnknownFunction",
            Self::DuplicateFunction => "DuplicateFunction",
            Self::NotImplemented => "NotImplemented",
            Self::MalformedRequest => "MalformedRequest",
            Self::UnsupportedBindingType => "UnsupportedBindingType",
            Self::PoolExhaustedTimeout => "PoolExhaustedTimeout",
            Self::InvocationFailed => "InvocationFailed",
            Self::Transport => "Transport",
        }
    }

    /// Fatal kinds end the dispatch loop instead of producing a response.
    #[must_use]
    pub fn is_fatal(self) -> bool {
        matches!(self, Self::ProtocolViolation | Self::Transport)
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result type for worker operations.
pub type WorkerResult<T> = Result<T, WorkerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = WorkerError::UnknownFunction {
            function_id: "f1".to_string(),
        };
        assert_eq!(err.to_string(), "unknown function: f1");

        let err = WorkerError::load("f2", "bad script path");
        assert_eq!(err.to_string(), "failed to load function 'f2': bad script path");
    }

    #[test]
    fn test_kind_mapping() {
        assert_eq!(
            WorkerError::NotImplemented("x".into()).kind(),
            ErrorKind::NotImplemented
        );
        assert_eq!(
            WorkerError::engine("boom").kind(),
            ErrorKind::InvocationFailed
        );
        assert_eq!(ErrorKind::UnknownFunction.as_str(), "UnknownFunction");
        assert!(!WorkerError::MalformedRequest("bad".into()).is_fatal());
    }

    #[test]
    fn test_only_protocol_and_transport_are_fatal() {
        assert!(WorkerError::ProtocolViolation("?".into()).is_fatal());
        assert!(WorkerError::Transport("closed".into()).is_fatal());
        assert!(!WorkerError::load("f", "x").is_fatal());
        assert!(!WorkerError::PoolExhaustedTimeout { waited_ms: 5 }.is_fatal());
        assert!(
            !WorkerError::DuplicateFunction {
                function_id: "f".into()
            }
            .is_fatal()
        );
    }
}
