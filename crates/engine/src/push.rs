//! Push pipeline: one batch write of every cached collection to the remote.

use std::sync::Arc;
use std::time::Duration;

use log::{debug, warn};
use tokio::sync::Mutex;

use recordsync_core::errors::{Error, Result};
use recordsync_core::sync::{
    CollectionDescriptor, CollectionShape, PushPayload, PushPlan, Record, RemoteStore,
    TombstoneSet,
};

use crate::cache::LocalCacheStore;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PushReport {
    pub collections: usize,
    pub upserts: usize,
    pub removals: usize,
    /// Records skipped because the remote already deleted them by archive.
    pub stale_skipped: usize,
}

/// Split of one list collection into remote writes.
#[derive(Debug, Default, PartialEq)]
pub(crate) struct CollectionWrites {
    pub upserts: Vec<Record>,
    pub removals: Vec<String>,
    pub stale: Vec<String>,
}

/// Archived records of archivable collections become removals. Live records
/// whose id carries a tombstone are stale copies and are not written back.
pub(crate) fn plan_collection(
    descriptor: &CollectionDescriptor,
    records: &[Record],
    tombstones: &TombstoneSet,
) -> CollectionWrites {
    let mut writes = CollectionWrites::default();
    for record in records {
        if !descriptor.archivable {
            writes.upserts.push(record.clone());
        } else if record.is_archived() {
            writes.removals.push(record.id.clone());
        } else if tombstones.contains(&record.id) {
            writes.stale.push(record.id.clone());
        } else {
            writes.upserts.push(record.clone());
        }
    }
    writes
}

pub struct RemotePusher {
    remote: Arc<dyn RemoteStore>,
    timeout: Duration,
    push_lock: Mutex<()>,
}

impl RemotePusher {
    pub fn new(remote: Arc<dyn RemoteStore>, timeout: Duration) -> Self {
        Self {
            remote,
            timeout,
            push_lock: Mutex::new(()),
        }
    }

    /// Write every cached collection in one batch. Concurrent calls run one
    /// at a time and each reads the latest snapshots once it holds the lock.
    pub async fn push_all(&self, cache: &LocalCacheStore) -> Result<PushReport> {
        let _serial = self.push_lock.lock().await;

        let mut plan = PushPlan::default();
        let mut removed: Vec<(String, Vec<String>)> = Vec::new();
        let mut report = PushReport::default();

        for descriptor in cache.registry().iter() {
            match descriptor.shape {
                CollectionShape::Singleton => {
                    if let Some(document) = cache.get_document(&descriptor.cache_key) {
                        plan.push(
                            descriptor.remote_name.as_str(),
                            PushPayload::Document(Some(document)),
                        );
                    }
                }
                CollectionShape::List => {
                    let Some(records) = cache.snapshot(&descriptor.cache_key) else {
                        continue;
                    };
                    let tombstones = cache.tombstones(&descriptor.cache_key);
                    let writes = plan_collection(descriptor, &records, &tombstones);
                    for id in &writes.stale {
                        warn!(
                            "[Push] Not writing back '{}' in {}: it was archived and deleted remotely (restore it explicitly)",
                            id, descriptor.remote_name
                        );
                    }
                    report.stale_skipped += writes.stale.len();
                    if !writes.removals.is_empty() {
                        removed.push((descriptor.cache_key.clone(), writes.removals.clone()));
                    }
                    plan.push(
                        descriptor.remote_name.as_str(),
                        PushPayload::Records {
                            upserts: writes.upserts,
                            removals: writes.removals,
                        },
                    );
                }
            }
        }

        if plan.collections.is_empty() {
            return Ok(report);
        }
        report.collections = plan.collections.len();
        report.upserts = plan.upsert_count();
        report.removals = plan.removal_count();

        tokio::time::timeout(self.timeout, self.remote.save_all_collections(&plan))
            .await
            .map_err(|_| Error::Timeout(self.timeout.as_secs()))??;

        for (cache_key, ids) in &removed {
            cache.record_tombstones(cache_key, ids).await?;
        }

        debug!(
            "[Push] Pushed {} collection(s): {} upsert(s), {} removal(s), {} stale skipped",
            report.collections, report.upserts, report.removals, report.stale_skipped
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{engine_with, record};
    use recordsync_core::sync::{default_registry, tombstone_key, DEALS_CACHE_KEY};
    use recordsync_remote::MemoryRemoteStore;
    use serde_json::json;

    fn archived(id: &str) -> Record {
        let mut record = record(id, "gone");
        record.is_archived = Some(true);
        record
    }

    #[test]
    fn plan_splits_archived_and_stale_records() {
        let registry = default_registry();
        let deals = registry.by_cache_key(DEALS_CACHE_KEY).expect("deals");
        let mut tombstones = TombstoneSet::default();
        tombstones.insert("d3");

        let writes = plan_collection(
            deals,
            &[record("d1", "live"), archived("d2"), record("d3", "stale")],
            &tombstones,
        );
        assert_eq!(writes.upserts.len(), 1);
        assert_eq!(writes.upserts[0].id, "d1");
        assert_eq!(writes.removals, vec!["d2".to_string()]);
        assert_eq!(writes.stale, vec!["d3".to_string()]);
    }

    #[test]
    fn plan_keeps_archived_records_of_plain_collections() {
        let registry = default_registry();
        let statuses = registry.by_cache_key("cfo_statuses").expect("statuses");
        let writes = plan_collection(statuses, &[archived("s1")], &TombstoneSet::default());
        assert_eq!(writes.upserts.len(), 1);
        assert!(writes.removals.is_empty());
    }

    #[tokio::test]
    async fn local_write_reaches_remote() {
        let (cache, remote) = engine_with(default_registry());
        cache
            .set("cfo_tasks", vec![record("t1", "Plan"), record("t2", "Ship")])
            .await
            .expect("set");
        cache
            .set_document("cfo_finance_plan", json!({"month": "2026-01"}))
            .await
            .expect("set document");
        cache.wait_for_pushes().await;

        assert_eq!(remote.document_ids("tasks"), vec!["t1", "t2"]);
        assert_eq!(remote.document_ids("financePlan"), vec!["default"]);
        assert!(remote.document_ids("projects").is_empty());
    }

    #[tokio::test]
    async fn archive_round_trip_deletes_remotely_and_keeps_local_copy() {
        let (cache, remote) = engine_with(default_registry());
        cache
            .set(DEALS_CACHE_KEY, vec![record("d1", "Lead"), record("d2", "Other")])
            .await
            .expect("set");
        cache.wait_for_pushes().await;
        assert_eq!(remote.document_ids("deals"), vec!["d1", "d2"]);

        assert!(cache.archive(DEALS_CACHE_KEY, "d1").await.expect("archive"));
        cache.wait_for_pushes().await;

        assert_eq!(remote.document_ids("deals"), vec!["d2"]);
        let local = cache.get(DEALS_CACHE_KEY, Vec::new());
        let archived = local.iter().find(|r| r.id == "d1").expect("local copy");
        assert!(archived.is_archived());
        assert!(cache.tombstones(DEALS_CACHE_KEY).contains("d1"));
    }

    #[tokio::test]
    async fn stale_copy_is_not_resurrected_until_restored() {
        let (cache, remote) = engine_with(default_registry());
        cache
            .set(DEALS_CACHE_KEY, vec![record("d1", "Lead")])
            .await
            .expect("set");
        cache.archive(DEALS_CACHE_KEY, "d1").await.expect("archive");
        cache.wait_for_pushes().await;
        assert!(remote.document_ids("deals").is_empty());
        // The next pull drops the archived copy locally.
        assert!(cache
            .replace_from_remote(DEALS_CACHE_KEY, Vec::new())
            .await
            .expect("pull"));

        // A stale, unarchived copy written back by an older view.
        cache
            .set(DEALS_CACHE_KEY, vec![record("d1", "Lead")])
            .await
            .expect("stale set");
        cache.wait_for_pushes().await;
        assert!(remote.document_ids("deals").is_empty());

        cache
            .restore(DEALS_CACHE_KEY, record("d1", "Lead"))
            .await
            .expect("restore");
        cache.wait_for_pushes().await;
        assert_eq!(remote.document_ids("deals"), vec!["d1"]);
        assert!(cache.tombstones(DEALS_CACHE_KEY).is_empty());
        assert!(cache
            .get_setting::<serde_json::Value>(&tombstone_key(DEALS_CACHE_KEY))
            .is_some());
    }

    #[tokio::test]
    async fn failed_push_records_no_tombstones() {
        let (cache, remote) = engine_with(default_registry());
        cache
            .set(DEALS_CACHE_KEY, vec![record("d1", "Lead")])
            .await
            .expect("set");
        cache.wait_for_pushes().await;

        remote.set_offline(true);
        cache.archive(DEALS_CACHE_KEY, "d1").await.expect("archive");
        cache.wait_for_pushes().await;

        assert!(cache.tombstones(DEALS_CACHE_KEY).is_empty());
        assert!(!cache.suppression().is_active());
        remote.set_offline(false);
        assert_eq!(remote.document_ids("deals"), vec!["d1"]);
    }

    #[tokio::test]
    async fn push_times_out_against_slow_remote() {
        let remote = Arc::new(MemoryRemoteStore::new());
        remote.set_latency(Duration::from_millis(200));
        let pusher = RemotePusher::new(remote.clone(), Duration::from_millis(20));
        let (cache, _unused) = engine_with(default_registry());
        cache
            .set("cfo_tasks", vec![record("t1", "Plan")])
            .await
            .expect("set");
        cache.wait_for_pushes().await;

        let err = pusher.push_all(&cache).await.expect_err("timeout");
        assert!(matches!(err, Error::Timeout(_)));
    }
}
