//! Reconciliation scheduler: pull every collection and let the remote win.

use std::sync::{Arc, Mutex as StdMutex, PoisonError};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use log::{debug, warn};
use serde_json::Value;
use tokio::sync::Mutex;

use recordsync_core::errors::{Error, Result};
use recordsync_core::sync::{
    filter_archived, overlay_document, reconcile, CollectionDescriptor, CollectionShape,
    ReconcilePhase, ReconcileReport, ReconcileStatus, RemoteStore, Resolution,
};
use recordsync_core::utils::normalize::{dedup_by_business_key, normalize_collection};

use crate::cache::LocalCacheStore;
use crate::runtime::PeriodicJob;

/// Result of merging one collection.
enum Merge {
    Unchanged,
    Updated,
    /// A local write started meanwhile; its push takes precedence.
    Suppressed,
}

pub struct ReconciliationScheduler {
    cache: Arc<LocalCacheStore>,
    remote: Arc<dyn RemoteStore>,
    timeout: Duration,
    phase: StdMutex<ReconcilePhase>,
    cycle_lock: Mutex<()>,
}

impl ReconciliationScheduler {
    pub fn new(cache: Arc<LocalCacheStore>, remote: Arc<dyn RemoteStore>, timeout: Duration) -> Self {
        Self {
            cache,
            remote,
            timeout,
            phase: StdMutex::new(ReconcilePhase::Idle),
            cycle_lock: Mutex::new(()),
        }
    }

    pub fn phase(&self) -> ReconcilePhase {
        *self.phase.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_phase(&self, phase: ReconcilePhase) {
        *self.phase.lock().unwrap_or_else(PoisonError::into_inner) = phase;
    }

    /// Run one cycle now. Never fails: a remote load failure is reported as
    /// `Aborted`.
    pub async fn run_cycle(&self) -> ReconcileReport {
        let started = Instant::now();
        match self.try_cycle().await {
            Ok(report) => report,
            Err(e) => {
                warn!("[Reconcile] Cycle aborted: {}", e);
                ReconcileReport::aborted(elapsed_ms(started))
            }
        }
    }

    /// Like [`run_cycle`](Self::run_cycle) but surfaces the load failure.
    pub async fn try_cycle(&self) -> Result<ReconcileReport> {
        if self.cache.suppression().is_active() {
            debug!("[Reconcile] Skipped: push in flight");
            return Ok(ReconcileReport::skipped());
        }
        let Ok(_cycle) = self.cycle_lock.try_lock() else {
            debug!("[Reconcile] Skipped: cycle already running");
            return Ok(ReconcileReport::skipped());
        };

        let started = Instant::now();
        let result = self.pull_and_merge(started).await;
        self.set_phase(ReconcilePhase::Idle);
        result
    }

    async fn pull_and_merge(&self, started: Instant) -> Result<ReconcileReport> {
        self.set_phase(ReconcilePhase::Pulling);
        let registry = self.cache.registry();
        let mut state = tokio::time::timeout(self.timeout, self.remote.load_all_collections(registry))
            .await
            .map_err(|_| Error::Timeout(self.timeout.as_secs()))??;

        self.set_phase(ReconcilePhase::Merging);
        let mut report = ReconcileReport {
            status: ReconcileStatus::Completed,
            updated: Vec::new(),
            failed: Vec::new(),
            duration_ms: 0,
        };

        for descriptor in registry.iter() {
            let key = descriptor.cache_key.as_str();
            let payload = match state.take(&descriptor.remote_name) {
                Ok(payload) => payload,
                Err(e) => {
                    warn!("[Reconcile] Fetch of {} failed: {}", descriptor.remote_name, e);
                    report.failed.push(key.to_string());
                    continue;
                }
            };

            let merged = match descriptor.shape {
                CollectionShape::List => self.merge_list(descriptor, payload.as_ref()).await,
                CollectionShape::Singleton => self.merge_document(descriptor, payload).await,
            };
            match merged {
                Ok(Merge::Unchanged) => {}
                Ok(Merge::Updated) => report.updated.push(key.to_string()),
                Ok(Merge::Suppressed) => {
                    debug!("[Reconcile] Local write arrived mid-cycle; stopping merge");
                    report.status = ReconcileStatus::Skipped;
                    break;
                }
                Err(e) => {
                    warn!("[Reconcile] Keeping local {}: {}", key, e);
                    report.failed.push(key.to_string());
                }
            }
        }

        report.duration_ms = elapsed_ms(started);
        debug!(
            "[Reconcile] Cycle {:?} in {}ms: {} updated, {} failed",
            report.status,
            report.duration_ms,
            report.updated.len(),
            report.failed.len()
        );
        Ok(report)
    }

    async fn merge_list(&self, descriptor: &CollectionDescriptor, payload: Option<&Value>) -> Result<Merge> {
        let mut records = normalize_collection(payload)?;
        if descriptor.archivable {
            records = filter_archived(records);
            self.cache
                .forget_tombstones(&descriptor.cache_key, &records)
                .await?;
        }
        if let Some(business_key) = descriptor.business_key.as_deref() {
            records = dedup_by_business_key(records, business_key);
        }

        let local = self.cache.get(&descriptor.cache_key, Vec::new());
        match reconcile(&local, records) {
            Resolution::Unchanged => Ok(Merge::Unchanged),
            Resolution::Replace(records) => {
                if self.cache.replace_from_remote(&descriptor.cache_key, records).await? {
                    Ok(Merge::Updated)
                } else {
                    Ok(Merge::Suppressed)
                }
            }
        }
    }

    async fn merge_document(&self, descriptor: &CollectionDescriptor, payload: Option<Value>) -> Result<Merge> {
        let Some(remote) = payload.filter(|value| !value.is_null()) else {
            return Ok(Merge::Unchanged);
        };
        let local = self.cache.get_document(&descriptor.cache_key);
        let Some(merged) = overlay_document(local.as_ref(), &remote) else {
            return Ok(Merge::Unchanged);
        };
        if self
            .cache
            .replace_document_from_remote(&descriptor.cache_key, merged)
            .await?
        {
            Ok(Merge::Updated)
        } else {
            Ok(Merge::Suppressed)
        }
    }
}

fn elapsed_ms(started: Instant) -> i64 {
    started.elapsed().as_millis() as i64
}

#[async_trait]
impl PeriodicJob for ReconciliationScheduler {
    fn name(&self) -> &'static str {
        "Reconcile"
    }

    async fn run_once(&self) -> Result<()> {
        self.try_cycle().await.map(|_| ())
    }
}
