//! Lenient field access for SDK payloads whose key names drift between
//! endpoints and versions.

use serde_json::{Map, Value};

/// Render a scalar as a string. Empty strings, null, arrays and objects
/// read as absent.
pub(crate) fn scalar_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// The first key in `keys` whose value is a non-empty scalar.
pub(crate) fn first_string(obj: &Map<String, Value>, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|k| obj.get(*k).and_then(scalar_string))
}

/// True when `obj` has a non-empty scalar under any of `keys`.
pub(crate) fn has_any(obj: &Map<String, Value>, keys: &[&str]) -> bool {
    first_string(obj, keys).is_some()
}

/// A list either given directly or wrapped as `{ "data": [...] }`.
pub(crate) fn list_payload(value: &Value) -> &[Value] {
    match value {
        Value::Array(items) => items,
        Value::Object(obj) => match obj.get("data") {
            Some(Value::Array(items)) => items,
            Some(inner @ Value::Object(_)) => list_payload(inner),
            _ => &[],
        },
        _ => &[],
    }
}
