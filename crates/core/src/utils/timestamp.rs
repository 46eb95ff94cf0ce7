//! Conversion between document-store timestamps and canonical date strings.
//!
//! Dates live in records as ISO-8601 strings. The remote store keeps them as
//! structured timestamps (`{seconds, nanoseconds}`, or `timestampValue` on the
//! REST surface). Older documents were written both ways, so readers accept
//! either form.

use chrono::{DateTime, NaiveDate, NaiveDateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

const NAIVE_DATETIME_FORMATS: [&str; 3] = [
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M:%S%.f",
];

/// Structured timestamp as stored by the document store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireTimestamp {
    pub seconds: i64,
    pub nanoseconds: i32,
}

impl WireTimestamp {
    pub fn from_datetime(value: DateTime<Utc>) -> Self {
        Self {
            seconds: value.timestamp(),
            nanoseconds: value.timestamp_subsec_nanos() as i32,
        }
    }

    pub fn to_datetime(&self) -> Option<DateTime<Utc>> {
        let nanos = self.nanoseconds.clamp(0, 999_999_999) as u32;
        DateTime::<Utc>::from_timestamp(self.seconds, nanos)
    }

    /// JSON map form (`{"seconds": .., "nanoseconds": ..}`).
    pub fn to_json(&self) -> Value {
        let mut map = Map::new();
        map.insert("seconds".to_string(), Value::from(self.seconds));
        map.insert("nanoseconds".to_string(), Value::from(self.nanoseconds));
        Value::Object(map)
    }

    /// Recognizes the structured forms only; plain strings are not timestamps here.
    ///
    /// Accepted: `{seconds, nanoseconds}`, `{_seconds, _nanoseconds}` (admin SDK
    /// JSON) and `{timestampValue: "<rfc3339>"}` (REST).
    pub fn from_json(value: &Value) -> Option<Self> {
        let map = value.as_object()?;
        if map.len() == 1 {
            let raw = map.get("timestampValue")?.as_str()?;
            return to_wire(raw);
        }
        if map.len() != 2 {
            return None;
        }
        let (seconds, nanos) = match (map.get("seconds"), map.get("nanoseconds")) {
            (Some(s), Some(n)) => (s, n),
            _ => (map.get("_seconds")?, map.get("_nanoseconds")?),
        };
        Some(Self {
            seconds: seconds.as_i64()?,
            nanoseconds: i32::try_from(nanos.as_i64()?).ok()?,
        })
    }
}

/// Parse a date string into its wire form. Returns `None` instead of failing.
pub fn to_wire(input: &str) -> Option<WireTimestamp> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return None;
    }

    if let Ok(parsed) = DateTime::parse_from_rfc3339(trimmed) {
        return Some(WireTimestamp::from_datetime(parsed.with_timezone(&Utc)));
    }

    for format in NAIVE_DATETIME_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(trimmed, format) {
            return Some(WireTimestamp::from_datetime(naive.and_utc()));
        }
    }

    NaiveDate::parse_from_str(trimmed, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| WireTimestamp::from_datetime(naive.and_utc()))
}

/// Render a wire timestamp as an ISO-8601 UTC string with millisecond precision.
pub fn from_wire(timestamp: &WireTimestamp) -> String {
    timestamp
        .to_datetime()
        .unwrap_or_default()
        .to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Decode any timestamp representation, passing plain strings through unchanged.
pub fn decode_timestamp(value: &Value) -> Option<String> {
    match value {
        Value::String(raw) => Some(raw.clone()),
        Value::Object(_) => WireTimestamp::from_json(value).map(|ts| from_wire(&ts)),
        _ => None,
    }
}

/// Whether a field name carries a date that should be stored as a timestamp.
pub fn is_date_key(key: &str) -> bool {
    key.contains("date")
        || key.contains("Date")
        || key.contains("createdAt")
        || key.contains("updatedAt")
}

/// Convert date strings under date-like keys into structured timestamps, at any depth.
///
/// Unparsable strings are kept as they are. Strings directly inside arrays have
/// no key and are never converted.
pub fn encode_dates_for_write(value: Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.into_iter()
                .map(|(key, field)| {
                    let encoded = match field {
                        Value::String(raw) if is_date_key(&key) => match to_wire(&raw) {
                            Some(ts) => ts.to_json(),
                            None => Value::String(raw),
                        },
                        Value::Object(_) | Value::Array(_) => encode_dates_for_write(field),
                        other => other,
                    };
                    (key, encoded)
                })
                .collect(),
        ),
        Value::Array(items) => Value::Array(items.into_iter().map(encode_dates_for_write).collect()),
        other => other,
    }
}

/// Replace every structured timestamp with its date string, at any depth.
pub fn decode_dates_from_read(value: Value) -> Value {
    if let Some(ts) = WireTimestamp::from_json(&value) {
        return Value::String(from_wire(&ts));
    }
    match value {
        Value::Object(map) => Value::Object(
            map.into_iter()
                .map(|(key, field)| (key, decode_dates_from_read(field)))
                .collect(),
        ),
        Value::Array(items) => Value::Array(items.into_iter().map(decode_dates_from_read).collect()),
        other => other,
    }
}
