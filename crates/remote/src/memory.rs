//! In-process document store with the same contract as the Firestore client.
//!
//! Documents are kept wire-encoded (dates as `{seconds, nanoseconds}`), so
//! reads go through the same timestamp decoding as real remote payloads.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use log::debug;
use serde_json::Value;

use recordsync_core::errors::{Error as CoreError, Result as CoreResult};
use recordsync_core::sync::{
    ensure_record_id, CollectionRegistry, Fetched, PushPayload, PushPlan, Record, RemoteState,
    RemoteStore, SINGLETON_DOCUMENT_ID,
};

use crate::error::FirestoreError;
use crate::payload::{
    collection_payload, document_to_wire_fields, record_to_wire_fields, StoredDocument,
};

#[derive(Debug, Default)]
pub struct MemoryRemoteStore {
    documents: Mutex<HashMap<String, Vec<StoredDocument>>>,
    raw_payloads: Mutex<HashMap<String, Value>>,
    failing: Mutex<HashSet<String>>,
    offline: AtomicBool,
    latency_ms: AtomicU64,
    load_calls: AtomicUsize,
    save_all_calls: AtomicUsize,
}

impl MemoryRemoteStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// While offline every call fails with a transport error.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Delay applied before every call completes.
    pub fn set_latency(&self, latency: Duration) {
        self.latency_ms
            .store(latency.as_millis() as u64, Ordering::SeqCst);
    }

    /// Serve `payload` verbatim for `collection` on full loads, bypassing the
    /// stored documents. Used to reproduce legacy map-shaped or corrupt data.
    pub fn seed_raw(&self, collection: &str, payload: Value) {
        lock(&self.raw_payloads).insert(collection.to_string(), payload);
    }

    pub fn clear_raw(&self, collection: &str) {
        lock(&self.raw_payloads).remove(collection);
    }

    /// Make loads of `collection` fail until cleared.
    pub fn fail_collection(&self, collection: &str, failing: bool) {
        let mut set = lock(&self.failing);
        if failing {
            set.insert(collection.to_string());
        } else {
            set.remove(collection);
        }
    }

    /// Insert or replace whole records without going through the trait.
    pub fn seed_records(&self, collection: &str, records: &[Record]) {
        let mut documents = lock(&self.documents);
        let stored = documents.entry(collection.to_string()).or_default();
        for record in records {
            upsert(stored, &record.id, record_to_wire_fields(record));
        }
    }

    /// Plain (date-decoded) documents of a collection, in insertion order.
    pub fn documents(&self, collection: &str) -> Vec<Value> {
        lock(&self.documents)
            .get(collection)
            .map(|docs| docs.iter().map(StoredDocument::to_plain).collect())
            .unwrap_or_default()
    }

    pub fn document_ids(&self, collection: &str) -> Vec<String> {
        lock(&self.documents)
            .get(collection)
            .map(|docs| docs.iter().map(|doc| doc.id.clone()).collect())
            .unwrap_or_default()
    }

    /// Wire form of one document, as it would sit in the store.
    pub fn wire_document(&self, collection: &str, id: &str) -> Option<Value> {
        lock(&self.documents)
            .get(collection)?
            .iter()
            .find(|doc| doc.id == id)
            .map(|doc| Value::Object(doc.fields.clone()))
    }

    pub fn load_calls(&self) -> usize {
        self.load_calls.load(Ordering::SeqCst)
    }

    pub fn save_all_calls(&self) -> usize {
        self.save_all_calls.load(Ordering::SeqCst)
    }

    async fn simulate_call(&self) -> CoreResult<()> {
        let latency = self.latency_ms.load(Ordering::SeqCst);
        if latency > 0 {
            tokio::time::sleep(Duration::from_millis(latency)).await;
        }
        if self.offline.load(Ordering::SeqCst) {
            return Err(FirestoreError::Unavailable("memory store is offline".to_string()).into());
        }
        Ok(())
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn upsert(stored: &mut Vec<StoredDocument>, id: &str, fields: serde_json::Map<String, Value>) {
    match stored.iter_mut().find(|doc| doc.id == id) {
        Some(existing) => existing.fields = fields,
        None => stored.push(StoredDocument {
            id: id.to_string(),
            fields,
        }),
    }
}

#[async_trait]
impl RemoteStore for MemoryRemoteStore {
    async fn get_all(&self, collection: &str) -> CoreResult<Fetched<Vec<Record>>> {
        self.simulate_call().await?;
        let records: Vec<Record> = lock(&self.documents)
            .get(collection)
            .map(|docs| {
                docs.iter()
                    .filter_map(|doc| Record::from_json(doc.to_plain(), Some(&doc.id)))
                    .collect()
            })
            .unwrap_or_default();
        Ok(if records.is_empty() {
            Fetched::Empty
        } else {
            Fetched::Data(records)
        })
    }

    async fn get_by_id(&self, collection: &str, id: &str) -> CoreResult<Fetched<Record>> {
        self.simulate_call().await?;
        let record = lock(&self.documents)
            .get(collection)
            .and_then(|docs| docs.iter().find(|doc| doc.id == id))
            .and_then(|doc| Record::from_json(doc.to_plain(), Some(&doc.id)));
        Ok(match record {
            Some(record) => Fetched::Data(record),
            None => Fetched::Empty,
        })
    }

    async fn save(&self, collection: &str, record: &Record) -> CoreResult<()> {
        ensure_record_id(record)?;
        self.simulate_call().await?;

        let mut documents = lock(&self.documents);
        let stored = documents.entry(collection.to_string()).or_default();
        let incoming = record_to_wire_fields(record);
        match stored.iter_mut().find(|doc| doc.id == record.id) {
            Some(existing) => existing.fields.extend(incoming),
            None => stored.push(StoredDocument {
                id: record.id.clone(),
                fields: incoming,
            }),
        }
        Ok(())
    }

    async fn delete(&self, collection: &str, id: &str) -> CoreResult<()> {
        if id.trim().is_empty() {
            return Err(CoreError::invalid_request("document id is required"));
        }
        self.simulate_call().await?;
        if let Some(stored) = lock(&self.documents).get_mut(collection) {
            stored.retain(|doc| doc.id != id);
        }
        Ok(())
    }

    async fn load_all_collections(&self, registry: &CollectionRegistry) -> CoreResult<RemoteState> {
        self.load_calls.fetch_add(1, Ordering::SeqCst);
        self.simulate_call().await?;

        let documents = lock(&self.documents);
        let raw = lock(&self.raw_payloads);
        let failing = lock(&self.failing);

        let mut state = RemoteState::default();
        for descriptor in registry.iter() {
            let name = descriptor.remote_name.as_str();
            let payload = if failing.contains(name) {
                Err(CoreError::api(503, format!("collection '{}' unavailable", name)))
            } else if let Some(payload) = raw.get(name) {
                Ok(Some(payload.clone()))
            } else {
                Ok(documents
                    .get(name)
                    .and_then(|docs| collection_payload(descriptor.shape, docs)))
            };
            state.insert(name, payload);
        }
        Ok(state)
    }

    async fn save_all_collections(&self, plan: &PushPlan) -> CoreResult<()> {
        self.save_all_calls.fetch_add(1, Ordering::SeqCst);
        self.simulate_call().await?;

        let mut documents = lock(&self.documents);
        for push in &plan.collections {
            let stored = documents.entry(push.remote_name.clone()).or_default();
            match &push.payload {
                PushPayload::Records { upserts, removals } => {
                    for record in upserts.iter().filter(|r| !r.id.trim().is_empty()) {
                        upsert(stored, &record.id, record_to_wire_fields(record));
                    }
                    stored.retain(|doc| !removals.contains(&doc.id));
                }
                PushPayload::Document(Some(document)) => {
                    upsert(stored, SINGLETON_DOCUMENT_ID, document_to_wire_fields(document));
                }
                PushPayload::Document(None) => {}
            }
        }
        debug!(
            "[MemoryRemote] Applied batch: {} upserts, {} deletes",
            plan.upsert_count(),
            plan.removal_count()
        );
        Ok(())
    }
}
