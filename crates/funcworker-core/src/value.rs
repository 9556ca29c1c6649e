//! Native values as seen by an execution engine.

use std::collections::BTreeMap;

use crate::binding_map::BindingMap;

/// A value in the form an execution engine consumes and produces.
#[derive(Debug, Clone, PartialEq)]
pub enum NativeValue {
    /// Absent value.
    Null,
    /// Boolean.
    Bool(bool),
    /// Signed integer.
    Int(i64),
    /// Float.
    Double(f64),
    /// Text.
    String(String),
    /// Raw bytes.
    Bytes(Vec<u8>),
    /// Parsed JSON document.
    Json(serde_json::Value),
    /// Ordered list.
    Array(Vec<NativeValue>),
    /// Ordered, case-insensitive dictionary.
    Map(BindingMap<NativeValue>),
    /// HTTP request context handed to HTTP-triggered functions.
    HttpRequest(HttpRequestContext),
    /// HTTP response produced by a function.
    HttpResponse(HttpResponseContext),
    /// An engine object with no wire representation.
    Opaque {
        /// Engine-side type name, reported in conversion errors.
        type_name: String,
    },
}

impl NativeValue {
    /// Short description of the value's shape for error messages.
    #[must_use]
    pub fn type_name(&self) -> &str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::Double(_) => "double",
            Self::String(_) => "string",
            Self::Bytes(_) => "bytes",
            Self::Json(_) => "json",
            Self::Array(_) => "array",
            Self::Map(_) => "map",
            Self::HttpRequest(_) => "httpRequest",
            Self::HttpResponse(_) => "httpResponse",
            Self::Opaque { type_name } => type_name,
        }
    }

    /// Borrow the text of a `String` value.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }
}

impl From<&str> for NativeValue {
    fn from(s: &str) -> Self {
        Self::String(s.to_string())
    }
}

impl From<String> for NativeValue {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}

impl From<i64> for NativeValue {
    fn from(n: i64) -> Self {
        Self::Int(n)
    }
}

/// HTTP request as presented to a function.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct HttpRequestContext {
    /// Request method.
    pub method: String,
    /// Full request URL.
    pub url: String,
    /// Request headers.
    pub headers: BTreeMap<String, String>,
    /// Query string parameters.
    pub query: BTreeMap<String, String>,
    /// Route parameters.
    pub params: BTreeMap<String, String>,
    /// Converted request body.
    pub body: Option<Box<NativeValue>>,
}

/// HTTP response as produced by a function.
#[derive(Debug, Clone, PartialEq)]
pub struct HttpResponseContext {
    /// Status code.
    pub status_code: u16,
    /// Response headers.
    pub headers: BTreeMap<String, String>,
    /// Response body.
    pub body: Option<Box<NativeValue>>,
}

impl HttpResponseContext {
    /// A 200 response with the given body.
    #[must_use]
    pub fn ok(body: NativeValue) -> Self {
        Self {
            status_code: 200,
            headers: BTreeMap::new(),
            body: Some(Box::new(body)),
        }
    }
}

impl Default for HttpResponseContext {
    fn default() -> Self {
        Self {
            status_code: 200,
            headers: BTreeMap::new(),
            body: None,
        }
    }
}
