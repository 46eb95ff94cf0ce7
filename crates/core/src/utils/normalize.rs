//! Canonicalizes remote collection payloads into ordered record sequences.
//!
//! A collection may arrive as an array, as a map keyed by document id (legacy
//! push-style writes), or not at all.

use std::collections::HashSet;

use log::warn;
use serde_json::Value;
use thiserror::Error;

use crate::sync::Record;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ShapeError {
    #[error("expected an array or a map of records, found {0}")]
    UnexpectedShape(&'static str),
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Normalize a raw payload into records, keeping encounter order.
///
/// Entries that are not objects or carry no usable id are dropped.
pub fn normalize_collection(payload: Option<&Value>) -> Result<Vec<Record>, ShapeError> {
    let records = match payload {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::Array(items)) => items
            .iter()
            .enumerate()
            .filter_map(|(index, item)| {
                let record = Record::from_json(item.clone(), None);
                if record.is_none() {
                    warn!(
                        "[Normalize] Dropping array entry {} ({}) without a usable id",
                        index,
                        kind_of(item)
                    );
                }
                record
            })
            .collect(),
        Some(Value::Object(map)) => map
            .iter()
            .filter_map(|(key, item)| {
                let record = Record::from_json(item.clone(), Some(key));
                if record.is_none() {
                    warn!(
                        "[Normalize] Dropping map entry '{}' ({}) that is not a record",
                        key,
                        kind_of(item)
                    );
                }
                record
            })
            .collect(),
        Some(other) => return Err(ShapeError::UnexpectedShape(kind_of(other))),
    };
    Ok(records)
}

/// Lenient variant: any shape failure yields an empty sequence.
pub fn normalize_or_empty(payload: Option<&Value>) -> Vec<Record> {
    normalize_collection(payload).unwrap_or_else(|err| {
        warn!("[Normalize] Falling back to empty collection: {}", err);
        Vec::new()
    })
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum DedupKey {
    Business(String),
    Id(String),
}

fn business_value(record: &Record, business_key: &str) -> Option<String> {
    match record.field(business_key)? {
        Value::String(value) if !value.is_empty() => Some(value.clone()),
        Value::Number(value) => Some(value.to_string()),
        _ => None,
    }
}

/// Drop records that collide on `business_key`, keeping the last one by position.
///
/// Records without the key are deduplicated by `id` instead. Survivors keep
/// their relative order.
pub fn dedup_by_business_key(records: Vec<Record>, business_key: &str) -> Vec<Record> {
    let mut seen = HashSet::new();
    let mut keep = vec![false; records.len()];

    for (index, record) in records.iter().enumerate().rev() {
        let key = match business_value(record, business_key) {
            Some(value) => DedupKey::Business(value),
            None => DedupKey::Id(record.id.clone()),
        };
        if seen.insert(key) {
            keep[index] = true;
        }
    }

    records
        .into_iter()
        .zip(keep)
        .filter_map(|(record, kept)| kept.then_some(record))
        .collect()
}
