//! Local cache store: in-memory collection snapshots over a persistent backend.
//!
//! Local writes persist first, swap the snapshot, then schedule a push to the
//! remote under a save-suppression guard. Remote replacements go through
//! [`LocalCacheStore::replace_from_remote`] and never push.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{SecondsFormat, Utc};
use log::{debug, warn};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::{broadcast, Mutex};

use recordsync_core::errors::{Error, Result};
use recordsync_core::sync::{
    tombstone_key, CacheBackend, CacheEvent, ChangeOrigin, CollectionDescriptor,
    CollectionRegistry, CollectionShape, Record, TombstoneSet,
};
use recordsync_core::utils::normalize::{dedup_by_business_key, normalize_collection};

use crate::push::RemotePusher;
use crate::suppression::{SaveSuppression, SuppressionGuard};

const EVENT_CHANNEL_CAPACITY: usize = 64;

type Snapshots = HashMap<String, Arc<Vec<Record>>>;

pub struct LocalCacheStore {
    backend: Arc<dyn CacheBackend>,
    registry: Arc<CollectionRegistry>,
    collections: RwLock<Snapshots>,
    /// Singleton documents and scalar settings.
    entries: RwLock<HashMap<String, Value>>,
    /// Serializes persist-then-swap so disk and memory agree on the last writer.
    write_lock: Mutex<()>,
    suppression: SaveSuppression,
    events: broadcast::Sender<CacheEvent>,
    pusher: Option<Arc<RemotePusher>>,
}

impl LocalCacheStore {
    /// Hydrate snapshots from `backend`. Stored collections that no longer
    /// parse are skipped with a warning.
    pub fn open(backend: Arc<dyn CacheBackend>, registry: Arc<CollectionRegistry>) -> Result<Self> {
        let stored = backend.load_all()?;

        let mut collections = Snapshots::new();
        let mut entries = HashMap::new();
        for (key, value) in stored {
            match registry.by_cache_key(&key).map(|d| d.shape) {
                Some(CollectionShape::List) => match normalize_collection(Some(&value)) {
                    Ok(records) => {
                        collections.insert(key, Arc::new(records));
                    }
                    Err(e) => warn!("[Cache] Ignoring stored collection '{}': {}", key, e),
                },
                _ => {
                    entries.insert(key, value);
                }
            }
        }
        debug!(
            "[Cache] Hydrated {} collection(s) and {} other entr(ies)",
            collections.len(),
            entries.len()
        );

        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Ok(Self {
            backend,
            registry,
            collections: RwLock::new(collections),
            entries: RwLock::new(entries),
            write_lock: Mutex::new(()),
            suppression: SaveSuppression::new(),
            events,
            pusher: None,
        })
    }

    /// Local writes schedule a push through `pusher`. Without one, local
    /// writes stay local.
    pub fn with_pusher(mut self, pusher: Arc<RemotePusher>) -> Self {
        self.pusher = Some(pusher);
        self
    }

    pub fn registry(&self) -> &CollectionRegistry {
        &self.registry
    }

    pub fn suppression(&self) -> &SaveSuppression {
        &self.suppression
    }

    pub fn subscribe(&self) -> broadcast::Receiver<CacheEvent> {
        self.events.subscribe()
    }

    // ── Reads ────────────────────────────────────────────────────────────

    /// Current snapshot, or `None` when the collection was never written.
    pub fn snapshot(&self, cache_key: &str) -> Option<Arc<Vec<Record>>> {
        self.read_collections().get(cache_key).cloned()
    }

    pub fn get(&self, cache_key: &str, default: Vec<Record>) -> Arc<Vec<Record>> {
        self.snapshot(cache_key)
            .unwrap_or_else(|| Arc::new(default))
    }

    pub fn get_document(&self, cache_key: &str) -> Option<Value> {
        self.read_entries().get(cache_key).cloned()
    }

    pub fn get_setting<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let value = self.read_entries().get(key).cloned()?;
        match serde_json::from_value(value) {
            Ok(parsed) => Some(parsed),
            Err(e) => {
                warn!("[Cache] Setting '{}' has an unexpected type: {}", key, e);
                None
            }
        }
    }

    pub fn tombstones(&self, cache_key: &str) -> TombstoneSet {
        self.get_setting(&tombstone_key(cache_key))
            .unwrap_or_default()
    }

    // ── Local writes ─────────────────────────────────────────────────────

    pub async fn set(self: &Arc<Self>, cache_key: &str, records: Vec<Record>) -> Result<()> {
        self.set_from(cache_key, records, ChangeOrigin::Local).await
    }

    /// Replace a list collection and push it. Collections with a business key
    /// are deduplicated first; archived records never displace a live one.
    ///
    /// Unarchiving a record that is still held archived locally counts as a
    /// restore and clears its tombstone.
    pub async fn set_from(
        self: &Arc<Self>,
        cache_key: &str,
        records: Vec<Record>,
        origin: ChangeOrigin,
    ) -> Result<()> {
        let descriptor = self.descriptor(cache_key, CollectionShape::List)?;
        let archivable = descriptor.archivable;
        let records = match descriptor.business_key.as_deref() {
            Some(business_key) if archivable => dedup_live_by_business_key(records, business_key),
            Some(business_key) => dedup_by_business_key(records, business_key),
            None => records,
        };

        let guard = self.suppression.acquire();
        {
            let _write = self.write_lock.lock().await;
            if archivable {
                self.clear_restored_tombstones(cache_key, &records).await?;
            }
            self.write_collection(cache_key, records, origin).await?;
        }
        self.spawn_push(guard);
        Ok(())
    }

    pub async fn set_document(self: &Arc<Self>, cache_key: &str, document: Value) -> Result<()> {
        self.descriptor(cache_key, CollectionShape::Singleton)?;

        let guard = self.suppression.acquire();
        {
            let _write = self.write_lock.lock().await;
            self.write_entry(cache_key, document).await?;
        }
        self.emit(cache_key, ChangeOrigin::Local);
        self.spawn_push(guard);
        Ok(())
    }

    /// Scalar setting. Persisted, never pushed.
    pub async fn set_setting<T: Serialize>(&self, key: &str, value: &T) -> Result<()> {
        let value = serde_json::to_value(value)?;
        let _write = self.write_lock.lock().await;
        self.write_entry(key, value).await
    }

    pub async fn remove_setting(&self, key: &str) -> Result<()> {
        let _write = self.write_lock.lock().await;
        self.backend.remove(key).await?;
        self.write_entries().remove(key);
        Ok(())
    }

    /// Soft-delete `id`. The push removes it remotely; the local copy stays
    /// until the next pull. Returns `false` when there was nothing to archive.
    pub async fn archive(self: &Arc<Self>, cache_key: &str, id: &str) -> Result<bool> {
        let descriptor = self.descriptor(cache_key, CollectionShape::List)?;
        if !descriptor.archivable {
            return Err(Error::invalid_request(format!(
                "collection '{}' does not support archiving",
                cache_key
            )));
        }

        let mut records = self.get(cache_key, Vec::new()).as_ref().clone();
        let Some(record) = records.iter_mut().find(|r| r.id == id) else {
            return Ok(false);
        };
        if record.is_archived() {
            return Ok(false);
        }
        record.is_archived = Some(true);
        record.updated_at = Some(now_iso());

        self.set(cache_key, records).await?;
        Ok(true)
    }

    /// Bring a record back after an archive. Clears its tombstone so the next
    /// push upserts it again.
    pub async fn restore(self: &Arc<Self>, cache_key: &str, mut record: Record) -> Result<()> {
        self.descriptor(cache_key, CollectionShape::List)?;
        record.is_archived = Some(false);
        record.updated_at = Some(now_iso());

        let mut tombstones = self.tombstones(cache_key);
        if tombstones.remove(&record.id) {
            self.set_setting(&tombstone_key(cache_key), &tombstones)
                .await?;
        }

        let mut records = self.get(cache_key, Vec::new()).as_ref().clone();
        match records.iter_mut().find(|r| r.id == record.id) {
            Some(slot) => *slot = record,
            None => records.push(record),
        }
        self.set(cache_key, records).await
    }

    /// Resolves once every scheduled push has settled.
    pub async fn wait_for_pushes(&self) {
        self.suppression.wait_idle().await;
    }

    // ── Remote writes ────────────────────────────────────────────────────

    /// Replace a collection with pulled records without pushing. Refused
    /// (returns `false`) while a local write is waiting on its push.
    pub async fn replace_from_remote(&self, cache_key: &str, records: Vec<Record>) -> Result<bool> {
        let _write = self.write_lock.lock().await;
        if self.suppression.is_active() {
            debug!("[Cache] Remote replace of '{}' refused: push pending", cache_key);
            return Ok(false);
        }
        self.write_collection(cache_key, records, ChangeOrigin::Remote)
            .await?;
        Ok(true)
    }

    pub async fn replace_document_from_remote(&self, cache_key: &str, document: Value) -> Result<bool> {
        let _write = self.write_lock.lock().await;
        if self.suppression.is_active() {
            debug!("[Cache] Remote replace of '{}' refused: push pending", cache_key);
            return Ok(false);
        }
        self.write_entry(cache_key, document).await?;
        self.emit(cache_key, ChangeOrigin::Remote);
        Ok(true)
    }

    /// Remember ids the remote hard-deleted because they were archived.
    pub(crate) async fn record_tombstones(&self, cache_key: &str, ids: &[String]) -> Result<()> {
        let mut tombstones = self.tombstones(cache_key);
        let mut changed = false;
        for id in ids {
            changed |= tombstones.insert(id);
        }
        if changed {
            self.set_setting(&tombstone_key(cache_key), &tombstones)
                .await?;
        }
        Ok(())
    }

    /// Drop tombstones of ids the remote holds again.
    pub(crate) async fn forget_tombstones(&self, cache_key: &str, present: &[Record]) -> Result<()> {
        let mut tombstones = self.tombstones(cache_key);
        if tombstones.is_empty() {
            return Ok(());
        }
        let mut changed = false;
        for record in present {
            changed |= tombstones.remove(&record.id);
        }
        if changed {
            debug!("[Cache] Remote holds tombstoned record(s) of '{}' again", cache_key);
            self.set_setting(&tombstone_key(cache_key), &tombstones)
                .await?;
        }
        Ok(())
    }

    // ── Internals ────────────────────────────────────────────────────────

    fn descriptor(&self, cache_key: &str, shape: CollectionShape) -> Result<&CollectionDescriptor> {
        self.registry
            .by_cache_key(cache_key)
            .filter(|d| d.shape == shape)
            .ok_or_else(|| {
                Error::invalid_request(format!(
                    "'{}' is not a registered {:?} collection",
                    cache_key, shape
                ))
            })
    }

    /// Caller holds `write_lock`.
    async fn clear_restored_tombstones(&self, cache_key: &str, records: &[Record]) -> Result<()> {
        let mut tombstones = self.tombstones(cache_key);
        if tombstones.is_empty() {
            return Ok(());
        }
        let held_archived: HashSet<String> = self
            .snapshot(cache_key)
            .map(|current| {
                current
                    .iter()
                    .filter(|r| r.is_archived())
                    .map(|r| r.id.clone())
                    .collect()
            })
            .unwrap_or_default();

        let mut changed = false;
        for record in records
            .iter()
            .filter(|r| !r.is_archived() && held_archived.contains(&r.id))
        {
            changed |= tombstones.remove(&record.id);
        }
        if changed {
            self.write_entry(&tombstone_key(cache_key), serde_json::to_value(&tombstones)?)
                .await?;
        }
        Ok(())
    }

    /// Caller holds `write_lock`.
    async fn write_collection(
        &self,
        cache_key: &str,
        records: Vec<Record>,
        origin: ChangeOrigin,
    ) -> Result<()> {
        let value = Value::Array(records.iter().map(Record::to_json).collect());
        self.backend.store(cache_key, value).await?;
        self.write_collections()
            .insert(cache_key.to_string(), Arc::new(records));
        self.emit(cache_key, origin);
        Ok(())
    }

    /// Caller holds `write_lock`.
    async fn write_entry(&self, key: &str, value: Value) -> Result<()> {
        self.backend.store(key, value.clone()).await?;
        self.write_entries().insert(key.to_string(), value);
        Ok(())
    }

    fn emit(&self, cache_key: &str, origin: ChangeOrigin) {
        // No subscribers is fine.
        let _ = self.events.send(CacheEvent {
            cache_key: cache_key.to_string(),
            origin,
        });
    }

    fn spawn_push(self: &Arc<Self>, guard: SuppressionGuard) {
        let Some(pusher) = self.pusher.clone() else {
            return;
        };
        let cache = Arc::clone(self);
        tokio::spawn(async move {
            let _guard = guard;
            if let Err(e) = pusher.push_all(&cache).await {
                warn!("[Push] Push failed, will retry on next local write: {}", e);
            }
        });
    }

    fn read_collections(&self) -> RwLockReadGuard<'_, Snapshots> {
        self.collections.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_collections(&self) -> RwLockWriteGuard<'_, Snapshots> {
        self.collections.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn read_entries(&self) -> RwLockReadGuard<'_, HashMap<String, Value>> {
        self.entries.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_entries(&self) -> RwLockWriteGuard<'_, HashMap<String, Value>> {
        self.entries.write().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Business-key dedup among live records only. Archived records keep their
/// place and never win over a live record with the same key.
fn dedup_live_by_business_key(records: Vec<Record>, business_key: &str) -> Vec<Record> {
    let live: Vec<Record> = records.iter().filter(|r| !r.is_archived()).cloned().collect();
    let kept: HashSet<String> = dedup_by_business_key(live, business_key)
        .into_iter()
        .map(|r| r.id)
        .collect();
    records
        .into_iter()
        .filter(|r| r.is_archived() || kept.contains(&r.id))
        .collect()
}

pub(crate) fn now_iso() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}
