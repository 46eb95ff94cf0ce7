//! Remote document store contract and the batch types exchanged with it.

use std::collections::HashMap;

use async_trait::async_trait;
use serde_json::Value;

use super::{CollectionRegistry, Fetched, Record};
use crate::errors::{Error, Result};

/// Raw per-collection payloads from a full remote load.
///
/// Each entry is either the decoded payload (`None` when the collection has no
/// documents) or the error that collection failed with.
#[derive(Debug, Default)]
pub struct RemoteState {
    collections: HashMap<String, Result<Option<Value>>>,
}

impl RemoteState {
    pub fn insert(&mut self, remote_name: impl Into<String>, payload: Result<Option<Value>>) {
        self.collections.insert(remote_name.into(), payload);
    }

    /// Take a collection's payload. A collection missing from the state is
    /// reported as absent.
    pub fn take(&mut self, remote_name: &str) -> Result<Option<Value>> {
        self.collections.remove(remote_name).unwrap_or(Ok(None))
    }

    pub fn len(&self) -> usize {
        self.collections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.collections.is_empty()
    }

    pub fn failed_count(&self) -> usize {
        self.collections.values().filter(|p| p.is_err()).count()
    }
}

/// What a push writes for one collection.
#[derive(Debug, Clone, PartialEq)]
pub enum PushPayload {
    /// Upserted documents plus ids to hard-delete.
    Records {
        upserts: Vec<Record>,
        removals: Vec<String>,
    },
    /// Singleton document. `None` leaves the remote document untouched.
    Document(Option<Value>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct CollectionPush {
    pub remote_name: String,
    pub payload: PushPayload,
}

/// One logical batch write covering every registered collection.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PushPlan {
    pub collections: Vec<CollectionPush>,
}

impl PushPlan {
    pub fn push(&mut self, remote_name: impl Into<String>, payload: PushPayload) {
        self.collections.push(CollectionPush {
            remote_name: remote_name.into(),
            payload,
        });
    }

    pub fn upsert_count(&self) -> usize {
        self.collections
            .iter()
            .map(|c| match &c.payload {
                PushPayload::Records { upserts, .. } => upserts.len(),
                PushPayload::Document(Some(_)) => 1,
                PushPayload::Document(None) => 0,
            })
            .sum()
    }

    pub fn removal_count(&self) -> usize {
        self.collections
            .iter()
            .map(|c| match &c.payload {
                PushPayload::Records { removals, .. } => removals.len(),
                PushPayload::Document(_) => 0,
            })
            .sum()
    }
}

/// Contract for the remote document store (the single source of truth).
#[async_trait]
pub trait RemoteStore: Send + Sync {
    async fn get_all(&self, collection: &str) -> Result<Fetched<Vec<Record>>>;

    async fn get_by_id(&self, collection: &str, id: &str) -> Result<Fetched<Record>>;

    /// Upsert with merge semantics: only fields present on `record` are written.
    async fn save(&self, collection: &str, record: &Record) -> Result<()>;

    async fn delete(&self, collection: &str, id: &str) -> Result<()>;

    async fn load_all_collections(&self, registry: &CollectionRegistry) -> Result<RemoteState>;

    async fn save_all_collections(&self, plan: &PushPlan) -> Result<()>;
}

/// Rejects records that cannot be addressed as a document.
pub fn ensure_record_id(record: &Record) -> Result<()> {
    if record.id.trim().is_empty() {
        return Err(Error::invalid_request("record id is required"));
    }
    Ok(())
}
