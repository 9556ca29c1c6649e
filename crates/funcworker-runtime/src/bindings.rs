//! Conversion between wire values ([`TypedData`]) and native values
//! ([`NativeValue`]).
//!
//! `to_native` applies the coercions a binding's declared [`DataType`] asks
//! for. `to_wire` picks the most specific wire variant for a native value.
//! Without coercion the pair round-trips every wire variant, with two lossy
//! cases: JSON text is re-emitted compact, and an empty collection comes back
//! as the JSON text `[]` since its element type is unknown. JSON numbers keep
//! their source text, so big integers and decimals like `1.10` survive.

use funcworker_core::{
    BindingMap, DataType, HttpRequestContext, HttpResponseContext, NativeValue, ParameterBinding,
    RpcHttpRequest, RpcHttpResponse, TypedData, WorkerError, WorkerResult,
};

/// Convert a wire value for a binding declared with `data_type`.
///
/// # Errors
///
/// Returns [`WorkerError::UnsupportedBindingType`] for invalid JSON text or
/// bytes that are not UTF-8 when a string is declared.
pub fn to_native(data: &TypedData, data_type: DataType) -> WorkerResult<NativeValue> {
    match (data, data_type) {
        (TypedData::Bytes(bytes), DataType::String) => String::from_utf8(bytes.clone())
            .map(NativeValue::String)
            .map_err(|e| {
                WorkerError::UnsupportedBindingType(format!("bytes are not valid UTF-8: {e}"))
            }),
        (TypedData::Int(n), DataType::String) => Ok(NativeValue::String(n.to_string())),
        (TypedData::Double(d), DataType::String) => Ok(NativeValue::String(d.to_string())),
        (TypedData::String(s), DataType::Binary) => Ok(NativeValue::Bytes(s.as_bytes().to_vec())),
        _ => convert_native(data),
    }
}

fn convert_native(data: &TypedData) -> WorkerResult<NativeValue> {
    let value = match data {
        TypedData::None => NativeValue::Null,
        TypedData::String(s) => NativeValue::String(s.clone()),
        TypedData::Json(text) => NativeValue::Json(serde_json::from_str(text).map_err(|e| {
            WorkerError::UnsupportedBindingType(format!("invalid JSON payload: {e}"))
        })?),
        TypedData::Bytes(bytes) => NativeValue::Bytes(bytes.clone()),
        TypedData::Int(n) => NativeValue::Int(*n),
        TypedData::Double(d) => NativeValue::Double(*d),
        TypedData::HttpRequest(request) => NativeValue::HttpRequest(HttpRequestContext {
            method: request.method.clone(),
            url: request.url.clone(),
            headers: request.headers.clone(),
            query: request.query.clone(),
            params: request.params.clone(),
            body: native_body(request.body.as_deref())?,
        }),
        TypedData::HttpResponse(response) => NativeValue::HttpResponse(HttpResponseContext {
            status_code: response.status_code,
            headers: response.headers.clone(),
            body: native_body(response.body.as_deref())?,
        }),
        TypedData::CollectionString(items) => {
            NativeValue::Array(items.iter().cloned().map(NativeValue::String).collect())
        },
        TypedData::CollectionBytes(items) => {
            NativeValue::Array(items.iter().cloned().map(NativeValue::Bytes).collect())
        },
        TypedData::CollectionSint64(items) => {
            NativeValue::Array(items.iter().copied().map(NativeValue::Int).collect())
        },
        TypedData::CollectionDouble(items) => {
            NativeValue::Array(items.iter().copied().map(NativeValue::Double).collect())
        },
    };
    Ok(value)
}

fn native_body(body: Option<&TypedData>) -> WorkerResult<Option<Box<NativeValue>>> {
    body.map(|b| to_native(b, DataType::Undefined).map(Box::new))
        .transpose()
}

/// Convert a native value to its most specific wire variant.
///
/// # Errors
///
/// Returns [`WorkerError::UnsupportedBindingType`] for opaque engine values,
/// and for bytes, HTTP contexts or opaque values nested inside a structure
/// that has to be sent as JSON.
pub fn to_wire(value: &NativeValue) -> WorkerResult<TypedData> {
    let data = match value {
        NativeValue::Null => TypedData::None,
        NativeValue::Int(n) => TypedData::Int(*n),
        NativeValue::Double(d) => TypedData::Double(*d),
        NativeValue::String(s) => TypedData::String(s.clone()),
        NativeValue::Bytes(bytes) => TypedData::Bytes(bytes.clone()),
        NativeValue::Json(json) => TypedData::Json(json.to_string()),
        NativeValue::Bool(_) | NativeValue::Map(_) => TypedData::Json(to_json(value)?.to_string()),
        NativeValue::Array(items) => array_to_wire(items)?,
        NativeValue::HttpRequest(request) => TypedData::HttpRequest(RpcHttpRequest {
            method: request.method.clone(),
            url: request.url.clone(),
            headers: request.headers.clone(),
            query: request.query.clone(),
            params: request.params.clone(),
            body: wire_body(request.body.as_deref())?,
        }),
        NativeValue::HttpResponse(response) => TypedData::HttpResponse(RpcHttpResponse {
            status_code: response.status_code,
            headers: response.headers.clone(),
            body: wire_body(response.body.as_deref())?,
        }),
        NativeValue::Opaque { type_name } => {
            return Err(WorkerError::UnsupportedBindingType(format!(
                "engine value of type '{type_name}' has no wire representation"
            )));
        },
    };
    Ok(data)
}

fn wire_body(body: Option<&NativeValue>) -> WorkerResult<Option<Box<TypedData>>> {
    body.map(|b| to_wire(b).map(Box::new)).transpose()
}

fn array_to_wire(items: &[NativeValue]) -> WorkerResult<TypedData> {
    let Some(first) = items.first() else {
        return Ok(TypedData::Json("[]".to_owned()));
    };

    let collection = match first {
        NativeValue::String(_) => items
            .iter()
            .map(|v| match v {
                NativeValue::String(s) => Some(s.clone()),
                _ => None,
            })
            .collect::<Option<Vec<_>>>()
            .map(TypedData::CollectionString),
        NativeValue::Bytes(_) => items
            .iter()
            .map(|v| match v {
                NativeValue::Bytes(b) => Some(b.clone()),
                _ => None,
            })
            .collect::<Option<Vec<_>>>()
            .map(TypedData::CollectionBytes),
        NativeValue::Int(_) => items
            .iter()
            .map(|v| match v {
                NativeValue::Int(n) => Some(*n),
                _ => None,
            })
            .collect::<Option<Vec<_>>>()
            .map(TypedData::CollectionSint64),
        NativeValue::Double(_) => items
            .iter()
            .map(|v| match v {
                NativeValue::Double(d) => Some(*d),
                _ => None,
            })
            .collect::<Option<Vec<_>>>()
            .map(TypedData::CollectionDouble),
        _ => None,
    };

    match collection {
        Some(data) => Ok(data),
        None => {
            let json = serde_json::Value::Array(items.iter().map(to_json).collect::<WorkerResult<_>>()?);
            Ok(TypedData::Json(json.to_string()))
        },
    }
}

/// Render a native value as JSON. Map keys keep their insertion order.
fn to_json(value: &NativeValue) -> WorkerResult<serde_json::Value> {
    let json = match value {
        NativeValue::Null => serde_json::Value::Null,
        NativeValue::Bool(b) => serde_json::Value::Bool(*b),
        NativeValue::Int(n) => serde_json::Value::from(*n),
        NativeValue::Double(d) => serde_json::Number::from_f64(*d)
            .map(serde_json::Value::Number)
            .ok_or_else(|| {
                WorkerError::UnsupportedBindingType(format!("{d} cannot be represented in JSON"))
            })?,
        NativeValue::String(s) => serde_json::Value::String(s.clone()),
        NativeValue::Json(json) => json.clone(),
        NativeValue::Array(items) => {
            serde_json::Value::Array(items.iter().map(to_json).collect::<WorkerResult<_>>()?)
        },
        NativeValue::Map(map) => {
            let mut object = serde_json::Map::with_capacity(map.len());
            for (key, item) in map.iter() {
                object.insert(key.to_owned(), to_json(item)?);
            }
            serde_json::Value::Object(object)
        },
        NativeValue::Bytes(_)
        | NativeValue::HttpRequest(_)
        | NativeValue::HttpResponse(_)
        | NativeValue::Opaque { .. } => {
            return Err(WorkerError::UnsupportedBindingType(format!(
                "{} cannot be nested inside a JSON value",
                value.type_name()
            )));
        },
    };
    Ok(json)
}

/// Coerce a value bound to an `http` output into a response.
///
/// A response passes through unchanged. Anything else becomes the body of a
/// 200 response; `Null` yields an empty 200.
#[must_use]
pub fn to_http_response(value: NativeValue) -> HttpResponseContext {
    match value {
        NativeValue::HttpResponse(response) => response,
        NativeValue::Null => HttpResponseContext::default(),
        other => HttpResponseContext::ok(other),
    }
}

/// Convert trigger metadata into a case-insensitive map.
///
/// The first entry for a key wins. Later entries differing only by case are
/// dropped without being converted.
///
/// # Errors
///
/// Returns [`WorkerError::UnsupportedBindingType`] if a kept entry fails to
/// convert.
pub fn trigger_metadata(entries: &[ParameterBinding]) -> WorkerResult<BindingMap<NativeValue>> {
    let mut map = BindingMap::new();
    for entry in entries {
        if map.contains_key(&entry.name) {
            tracing::trace!(key = %entry.name, "dropping duplicate trigger metadata key");
            continue;
        }
        map.insert(entry.name.as_str(), to_native(&entry.data, DataType::Undefined)?);
    }
    Ok(map)
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;

    fn round_trip(data: TypedData) {
        let native = to_native(&data, DataType::Undefined).unwrap();
        assert_eq!(to_wire(&native).unwrap(), data, "round trip of {}", data.type_name());
    }

    #[test]
    fn test_round_trip_every_variant() {
        round_trip(TypedData::None);
        round_trip(TypedData::String("hello".into()));
        round_trip(TypedData::Json(r#"{"b":1,"a":[true,null,"x"]}"#.into()));
        round_trip(TypedData::Json(r#"{"id":12345678901234567890123}"#.into()));
        round_trip(TypedData::Json(r#"{"price":1.10,"qty":3}"#.into()));
        round_trip(TypedData::Bytes(vec![0, 159, 146, 150]));
        round_trip(TypedData::Int(-42));
        round_trip(TypedData::Double(2.5));
        round_trip(TypedData::CollectionString(vec!["a".into(), "b".into()]));
        round_trip(TypedData::CollectionBytes(vec![vec![1], vec![2, 3]]));
        round_trip(TypedData::CollectionSint64(vec![1, -2, 3]));
        round_trip(TypedData::CollectionDouble(vec![0.5, 1.5]));
        round_trip(TypedData::HttpRequest(RpcHttpRequest {
            method: "POST".into(),
            url: "https://example.test/api/f1?x=1".into(),
            headers: BTreeMap::from([("content-type".into(), "application/json".into())]),
            query: BTreeMap::from([("x".into(), "1".into())]),
            params: BTreeMap::new(),
            body: Some(Box::new(TypedData::Json(r#"{"name":"a"}"#.into()))),
        }));
        round_trip(TypedData::HttpResponse(RpcHttpResponse {
            status_code: 404,
            headers: BTreeMap::new(),
            body: Some(Box::new(TypedData::String("missing".into()))),
        }));
    }

    #[test]
    fn test_string_coercions() {
        assert_eq!(
            to_native(&TypedData::Bytes(b"abc".to_vec()), DataType::String).unwrap(),
            NativeValue::String("abc".into())
        );
        assert_eq!(
            to_native(&TypedData::Int(7), DataType::String).unwrap(),
            NativeValue::String("7".into())
        );
        assert_eq!(
            to_native(&TypedData::Double(1.25), DataType::String).unwrap(),
            NativeValue::String("1.25".into())
        );
        assert_eq!(
            to_native(&TypedData::String("hi".into()), DataType::Binary).unwrap(),
            NativeValue::Bytes(b"hi".to_vec())
        );
    }

    #[test]
    fn test_invalid_utf8_for_string_binding() {
        let err = to_native(&TypedData::Bytes(vec![0xff, 0xfe]), DataType::String).unwrap_err();
        assert!(matches!(err, WorkerError::UnsupportedBindingType(_)));
    }

    #[test]
    fn test_invalid_json() {
        let err = to_native(&TypedData::Json("{not json".into()), DataType::Undefined).unwrap_err();
        assert!(matches!(err, WorkerError::UnsupportedBindingType(_)));
    }

    #[test]
    fn test_bool_and_map_become_json() {
        assert_eq!(
            to_wire(&NativeValue::Bool(true)).unwrap(),
            TypedData::Json("true".into())
        );

        let mut map = BindingMap::new();
        map.insert("zeta", NativeValue::Int(1));
        map.insert("alpha", NativeValue::String("x".into()));
        assert_eq!(
            to_wire(&NativeValue::Map(map)).unwrap(),
            TypedData::Json(r#"{"zeta":1,"alpha":"x"}"#.into())
        );
    }

    #[test]
    fn test_mixed_array_becomes_json() {
        let value = NativeValue::Array(vec![NativeValue::Int(1), NativeValue::String("a".into())]);
        assert_eq!(to_wire(&value).unwrap(), TypedData::Json(r#"[1,"a"]"#.into()));
    }

    #[test]
    fn test_empty_array_is_json() {
        assert_eq!(
            to_wire(&NativeValue::Array(Vec::new())).unwrap(),
            TypedData::Json("[]".into())
        );
    }

    #[test]
    fn test_unconvertible_values() {
        let opaque = NativeValue::Opaque {
            type_name: "ScriptBlock".into(),
        };
        assert!(matches!(
            to_wire(&opaque),
            Err(WorkerError::UnsupportedBindingType(_))
        ));

        let nested = NativeValue::Array(vec![NativeValue::Bool(true), NativeValue::Bytes(vec![1])]);
        assert!(matches!(
            to_wire(&nested),
            Err(WorkerError::UnsupportedBindingType(_))
        ));

        assert!(matches!(
            to_wire(&NativeValue::Array(vec![NativeValue::Bool(false), NativeValue::Double(f64::NAN)])),
            Err(WorkerError::UnsupportedBindingType(_))
        ));
    }

    #[test]
    fn test_to_http_response() {
        let passthrough = HttpResponseContext {
            status_code: 201,
            ..Default::default()
        };
        assert_eq!(
            to_http_response(NativeValue::HttpResponse(passthrough.clone())),
            passthrough
        );

        let wrapped = to_http_response(NativeValue::String("body".into()));
        assert_eq!(wrapped.status_code, 200);
        assert_eq!(wrapped.body.as_deref(), Some(&NativeValue::String("body".into())));

        assert_eq!(to_http_response(NativeValue::Null).body, None);
    }

    #[test]
    fn test_trigger_metadata_first_wins() {
        let entries = vec![
            ParameterBinding::new("Req", TypedData::String("first".into())),
            ParameterBinding::new("req", TypedData::String("second".into())),
            ParameterBinding::new("sys", TypedData::Json(r#"{"MethodName":"f1"}"#.into())),
        ];
        let map = trigger_metadata(&entries).unwrap();
        assert_eq!(map.len(), 2);
        assert_eq!(map.get("REQ"), Some(&NativeValue::String("first".into())));
        assert_eq!(map.keys().next(), Some("Req"));
    }

    #[test]
    fn test_trigger_metadata_duplicate_not_converted() {
        let entries = vec![
            ParameterBinding::new("Req", TypedData::String("ok".into())),
            ParameterBinding::new("REQ", TypedData::Json("{broken".into())),
        ];
        assert!(trigger_metadata(&entries).is_ok());
    }
}
