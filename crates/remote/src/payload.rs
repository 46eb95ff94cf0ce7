//! Turns fetched documents into the raw collection payloads the normalizer reads.

use serde_json::{Map, Value};

use recordsync_core::sync::{CollectionShape, Record, SINGLETON_DOCUMENT_ID};
use recordsync_core::utils::timestamp::{decode_dates_from_read, encode_dates_for_write};

/// A document as stored remotely: id plus wire-encoded fields.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredDocument {
    pub id: String,
    pub fields: Map<String, Value>,
}

impl StoredDocument {
    /// Plain JSON view with dates decoded. A stored `id` field wins over the
    /// document key.
    pub fn to_plain(&self) -> Value {
        let mut plain = Map::new();
        plain.insert("id".to_string(), Value::String(self.id.clone()));
        for (key, value) in &self.fields {
            plain.insert(key.clone(), value.clone());
        }
        decode_dates_from_read(Value::Object(plain))
    }

    /// Fields only, for singleton documents.
    pub fn to_plain_fields(&self) -> Value {
        decode_dates_from_read(Value::Object(self.fields.clone()))
    }
}

/// Wire fields for a record: envelope included, dates as structured timestamps.
pub fn record_to_wire_fields(record: &Record) -> Map<String, Value> {
    match encode_dates_for_write(record.to_json()) {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}

/// Wire fields for a singleton document. Non-object documents are stored as empty.
pub fn document_to_wire_fields(document: &Value) -> Map<String, Value> {
    match encode_dates_for_write(document.clone()) {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}

/// Shape the documents of one collection the way the normalizer expects.
///
/// Lists become an array of records; singletons become the `default` document
/// (or the first one when legacy writes used another id). No documents at all
/// reads as absent.
pub fn collection_payload(shape: CollectionShape, documents: &[StoredDocument]) -> Option<Value> {
    if documents.is_empty() {
        return None;
    }
    match shape {
        CollectionShape::List => Some(Value::Array(
            documents.iter().map(StoredDocument::to_plain).collect(),
        )),
        CollectionShape::Singleton => documents
            .iter()
            .find(|doc| doc.id == SINGLETON_DOCUMENT_ID)
            .or_else(|| documents.first())
            .map(StoredDocument::to_plain_fields),
    }
}
