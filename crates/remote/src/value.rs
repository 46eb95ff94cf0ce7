//! Typed value codec for Firestore REST documents.
//!
//! Firestore wraps every field in a single-key object naming its type
//! (`{"stringValue": "x"}`, `{"mapValue": {"fields": {..}}}`). Dates are
//! carried as `timestampValue`; on our side they are `{seconds, nanoseconds}`
//! maps before encoding and after decoding, which the timestamp codec turns
//! into date strings.

use chrono::SecondsFormat;
use serde_json::{Map, Value};

use recordsync_core::utils::timestamp::{to_wire, WireTimestamp};

use crate::error::{FirestoreError, Result};

/// Encode a plain JSON value into its typed form.
pub fn encode_value(value: &Value) -> Value {
    let mut typed = Map::new();
    match value {
        Value::Null => {
            typed.insert("nullValue".to_string(), Value::Null);
        }
        Value::Bool(flag) => {
            typed.insert("booleanValue".to_string(), Value::Bool(*flag));
        }
        Value::Number(number) => match number.as_i64() {
            Some(int) => {
                typed.insert("integerValue".to_string(), Value::String(int.to_string()));
            }
            None => {
                typed.insert(
                    "doubleValue".to_string(),
                    Value::from(number.as_f64().unwrap_or_default()),
                );
            }
        },
        Value::String(text) => {
            typed.insert("stringValue".to_string(), Value::String(text.clone()));
        }
        Value::Array(items) => {
            let mut array = Map::new();
            array.insert(
                "values".to_string(),
                Value::Array(items.iter().map(encode_value).collect()),
            );
            typed.insert("arrayValue".to_string(), Value::Object(array));
        }
        Value::Object(fields) => match WireTimestamp::from_json(value) {
            Some(ts) => {
                let rendered = ts
                    .to_datetime()
                    .unwrap_or_default()
                    .to_rfc3339_opts(SecondsFormat::AutoSi, true);
                typed.insert("timestampValue".to_string(), Value::String(rendered));
            }
            None => {
                let mut map = Map::new();
                map.insert("fields".to_string(), Value::Object(encode_fields(fields)));
                typed.insert("mapValue".to_string(), Value::Object(map));
            }
        },
    }
    Value::Object(typed)
}

/// Encode every field of a document.
pub fn encode_fields(fields: &Map<String, Value>) -> Map<String, Value> {
    fields
        .iter()
        .map(|(key, value)| (key.clone(), encode_value(value)))
        .collect()
}

/// Decode a typed value back into plain JSON.
pub fn decode_value(typed: &Value) -> Result<Value> {
    let Some((kind, inner)) = typed.as_object().and_then(single_entry) else {
        return Err(FirestoreError::decode(format!(
            "expected a single typed entry, got {}",
            typed
        )));
    };

    let decoded = match kind {
        "nullValue" => Value::Null,
        "booleanValue" => Value::Bool(inner.as_bool().unwrap_or_default()),
        "integerValue" => {
            let parsed = match inner {
                Value::String(raw) => raw.parse::<i64>().ok(),
                other => other.as_i64(),
            };
            parsed
                .map(Value::from)
                .ok_or_else(|| FirestoreError::decode(format!("bad integerValue {}", inner)))?
        }
        "doubleValue" => match inner {
            Value::Number(number) => Value::Number(number.clone()),
            // NaN and infinities have no JSON form.
            _ => Value::Null,
        },
        "stringValue" | "referenceValue" | "bytesValue" => inner.clone(),
        "timestampValue" => {
            let raw = inner.as_str().unwrap_or_default();
            match to_wire(raw) {
                Some(ts) => ts.to_json(),
                None => Value::String(raw.to_string()),
            }
        }
        "geoPointValue" => inner.clone(),
        "arrayValue" => {
            let values = match inner.get("values") {
                Some(Value::Array(values)) => values
                    .iter()
                    .map(decode_value)
                    .collect::<Result<Vec<_>>>()?,
                _ => Vec::new(),
            };
            Value::Array(values)
        }
        "mapValue" => match inner.get("fields") {
            Some(Value::Object(fields)) => Value::Object(decode_fields(fields)?),
            _ => Value::Object(Map::new()),
        },
        other => {
            return Err(FirestoreError::decode(format!(
                "unsupported value type '{}'",
                other
            )))
        }
    };
    Ok(decoded)
}

/// Decode every field of a document.
pub fn decode_fields(fields: &Map<String, Value>) -> Result<Map<String, Value>> {
    fields
        .iter()
        .map(|(key, value)| Ok((key.clone(), decode_value(value)?)))
        .collect()
}

fn single_entry(map: &Map<String, Value>) -> Option<(&str, &Value)> {
    if map.len() != 1 {
        return None;
    }
    map.iter().next().map(|(k, v)| (k.as_str(), v))
}

/// Field path for `updateMask.fieldPaths`; non-identifier names are backquoted.
pub fn field_path(name: &str) -> String {
    let simple = name
        .chars()
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
    if simple {
        name.to_string()
    } else {
        format!("`{}`", name.replace('\\', "\\\\").replace('`', "\\`"))
    }
}
