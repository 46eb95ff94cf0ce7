//! Record envelope and the value types that flow between cache and remote.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A business record as the sync engine sees it.
///
/// Only `id`, the two timestamps and the archive flag are interpreted; every
/// other field is carried verbatim in `fields`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Record {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_archived: Option<bool>,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl Record {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            created_at: None,
            updated_at: None,
            is_archived: None,
            fields: Map::new(),
        }
    }

    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }

    pub fn is_archived(&self) -> bool {
        self.is_archived.unwrap_or(false)
    }

    pub fn field(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    pub fn str_field(&self, key: &str) -> Option<&str> {
        self.fields.get(key).and_then(Value::as_str)
    }

    pub fn set_field(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.fields.insert(key.into(), value.into());
    }

    /// Build a record from an arbitrary JSON document.
    ///
    /// Numeric ids are stringified. When the document has no usable id the
    /// `fallback_id` (for example the document key of a map-shaped payload) is
    /// used. Envelope fields of the wrong type stay in `fields` untouched.
    pub fn from_json(value: Value, fallback_id: Option<&str>) -> Option<Self> {
        let Value::Object(mut map) = value else {
            return None;
        };

        let id = match map.remove("id") {
            Some(Value::String(id)) if !id.trim().is_empty() => id,
            Some(Value::Number(id)) => id.to_string(),
            other => {
                if let Some(original) = other {
                    map.insert("id".to_string(), original);
                }
                match fallback_id {
                    Some(fallback) if !fallback.trim().is_empty() => {
                        map.remove("id");
                        fallback.to_string()
                    }
                    _ => return None,
                }
            }
        };

        let created_at = take_string(&mut map, "createdAt");
        let updated_at = take_string(&mut map, "updatedAt");
        let is_archived = match map.remove("isArchived") {
            Some(Value::Bool(flag)) => Some(flag),
            Some(Value::Null) | None => None,
            Some(other) => {
                map.insert("isArchived".to_string(), other);
                None
            }
        };

        Some(Self {
            id,
            created_at,
            updated_at,
            is_archived,
            fields: map,
        })
    }

    pub fn to_json(&self) -> Value {
        let mut map = self.fields.clone();
        map.insert("id".to_string(), Value::String(self.id.clone()));
        if let Some(created_at) = &self.created_at {
            map.insert("createdAt".to_string(), Value::String(created_at.clone()));
        }
        if let Some(updated_at) = &self.updated_at {
            map.insert("updatedAt".to_string(), Value::String(updated_at.clone()));
        }
        if let Some(flag) = self.is_archived {
            map.insert("isArchived".to_string(), Value::Bool(flag));
        }
        Value::Object(map)
    }
}

fn take_string(map: &mut Map<String, Value>, key: &str) -> Option<String> {
    match map.remove(key) {
        Some(Value::String(value)) => Some(value),
        Some(Value::Null) | None => None,
        Some(other) => {
            map.insert(key.to_string(), other);
            None
        }
    }
}

/// Remote read outcome that keeps "nothing there" apart from a failed call.
#[derive(Debug, Clone, PartialEq)]
pub enum Fetched<T> {
    Data(T),
    Empty,
}

impl<T> Fetched<T> {
    pub fn into_option(self) -> Option<T> {
        match self {
            Self::Data(value) => Some(value),
            Self::Empty => None,
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, Self::Empty)
    }
}

/// Where a cache change came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeOrigin {
    Local,
    Remote,
    External,
}

/// Emitted by the cache store after a collection snapshot was replaced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheEvent {
    pub cache_key: String,
    pub origin: ChangeOrigin,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn envelope_round_trips_unknown_fields() {
        let raw = json!({
            "id": "t1",
            "title": "Ship it",
            "createdAt": "2026-01-01T00:00:00.000Z",
            "isArchived": false,
            "tags": ["a", "b"]
        });

        let record: Record = serde_json::from_value(raw.clone()).expect("deserialize record");
        assert_eq!(record.id, "t1");
        assert_eq!(record.str_field("title"), Some("Ship it"));
        assert_eq!(record.is_archived, Some(false));
        assert!(record.updated_at.is_none());
        assert_eq!(serde_json::to_value(&record).expect("serialize"), raw);
        assert_eq!(record.to_json(), raw);
    }

    #[test]
    fn from_json_uses_fallback_id_and_stringifies_numbers() {
        let keyed = Record::from_json(json!({"name": "Main"}), Some("doc-1")).expect("fallback");
        assert_eq!(keyed.id, "doc-1");

        let numeric = Record::from_json(json!({"id": 42}), None).expect("numeric id");
        assert_eq!(numeric.id, "42");

        assert!(Record::from_json(json!({"name": "orphan"}), None).is_none());
        assert!(Record::from_json(json!("not a record"), Some("x")).is_none());
    }

    #[test]
    fn from_json_keeps_mistyped_envelope_fields() {
        let record = Record::from_json(
            json!({"id": "a", "isArchived": "yes", "createdAt": 12}),
            None,
        )
        .expect("record");
        assert_eq!(record.is_archived, None);
        assert_eq!(record.created_at, None);
        assert_eq!(record.field("isArchived"), Some(&json!("yes")));
        assert_eq!(record.field("createdAt"), Some(&json!(12)));
    }
}
