//! Wire representation of binding values.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// A typed value as exchanged with the host.
///
/// The set of variants is closed; anything the worker produces must be
/// expressible as one of these.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TypedData {
    /// No value / untyped raw slot.
    #[default]
    None,
    /// UTF-8 text.
    String(String),
    /// JSON document serialized as text.
    Json(String),
    /// Raw bytes.
    Bytes(#[serde(with = "crate::serde_base64::bytes")] Vec<u8>),
    /// Signed 64-bit integer.
    Int(i64),
    /// Double-precision float.
    Double(f64),
    /// Incoming HTTP request.
    HttpRequest(RpcHttpRequest),
    /// Outgoing HTTP response.
    HttpResponse(RpcHttpResponse),
    /// List of strings.
    CollectionString(Vec<String>),
    /// List of byte buffers.
    CollectionBytes(#[serde(with = "crate::serde_base64::bytes_list")] Vec<Vec<u8>>),
    /// List of signed integers.
    CollectionSint64(Vec<i64>),
    /// List of doubles.
    CollectionDouble(Vec<f64>),
}

impl TypedData {
    /// Short variant name, used in conversion errors and logs.
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::String(_) => "string",
            Self::Json(_) => "json",
            Self::Bytes(_) => "bytes",
            Self::Int(_) => "int",
            Self::Double(_) => "double",
            Self::HttpRequest(_) => "httpRequest",
            Self::HttpResponse(_) => "httpResponse",
            Self::CollectionString(_) => "collectionString",
            Self::CollectionBytes(_) => "collectionBytes",
            Self::CollectionSint64(_) => "collectionSint64",
            Self::CollectionDouble(_) => "collectionDouble",
        }
    }

    /// Whether this is the empty value.
    #[must_use]
    pub fn is_none(&self) -> bool {
        matches!(self, Self::None)
    }
}

impl From<&str> for TypedData {
    fn from(s: &str) -> Self {
        Self::String(s.to_string())
    }
}

impl From<String> for TypedData {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}

/// HTTP request delivered by an HTTP trigger.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RpcHttpRequest {
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
    /// Request body.
    pub body: Option<Box<TypedData>>,
}

/// HTTP response produced for an HTTP output binding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RpcHttpResponse {
    /// Status code.
    pub status_code: u16,
    /// Response headers.
    pub headers: BTreeMap<String, String>,
    /// Response body.
    pub body: Option<Box<TypedData>>,
}

impl Default for RpcHttpResponse {
    fn default() -> Self {
        Self {
            status_code: 200,
            headers: BTreeMap::new(),
            body: None,
        }
    }
}
