//! Background loops for reconciliation and external polling.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use log::{debug, info, warn};
use rand::Rng;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use recordsync_core::errors::{Result, RetryClass};
use recordsync_core::sync::backoff_seconds;

use crate::context::SyncContext;

/// One unit of periodic work.
#[async_trait]
pub trait PeriodicJob: Send + Sync {
    /// Log prefix, e.g. `Reconcile`.
    fn name(&self) -> &'static str;

    async fn run_once(&self) -> Result<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Schedule {
    pub interval: Duration,
    pub jitter_ms: u64,
}

impl Schedule {
    pub fn every_secs(interval_secs: u64, jitter_ms: u64) -> Self {
        Self {
            interval: Duration::from_secs(interval_secs.max(1)),
            jitter_ms,
        }
    }

    /// Delay before the next run. Consecutive failures back off
    /// exponentially from the base interval.
    pub fn next_delay(&self, consecutive_failures: u32) -> Duration {
        let base = if consecutive_failures == 0 {
            self.interval
        } else {
            Duration::from_secs(backoff_seconds(consecutive_failures, self.interval.as_secs()))
        };
        let jitter = if self.jitter_ms > 0 {
            rand::thread_rng().gen_range(0..=self.jitter_ms)
        } else {
            0
        };
        base + Duration::from_millis(jitter)
    }
}

/// Spawn a loop that runs `job` on `schedule` until `shutdown` flips to true.
pub fn spawn_periodic(
    job: Arc<dyn PeriodicJob>,
    schedule: Schedule,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let name = job.name();
        let mut consecutive_failures: u32 = 0;
        loop {
            if *shutdown.borrow() {
                break;
            }

            match job.run_once().await {
                Ok(()) => consecutive_failures = 0,
                Err(e) => {
                    consecutive_failures = consecutive_failures.saturating_add(1);
                    if e.retry_class() == RetryClass::ReauthRequired {
                        warn!("[{}] Credentials rejected, check configuration: {}", name, e);
                    } else {
                        warn!(
                            "[{}] Run failed ({} in a row): {}",
                            name, consecutive_failures, e
                        );
                    }
                }
            }

            let delay = schedule.next_delay(consecutive_failures);
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
                _ = tokio::time::sleep(delay) => {}
            }
        }
        debug!("[{}] Loop stopped", name);
    })
}

/// Running background tasks of one engine instance.
pub struct SyncRuntime {
    shutdown: watch::Sender<bool>,
    tasks: Vec<JoinHandle<()>>,
}

impl SyncRuntime {
    /// Start the reconcile loop plus one loop per configured external source.
    pub fn start(context: &SyncContext) -> Self {
        let (shutdown, receiver) = watch::channel(false);
        let config = &context.config;
        let jitter_ms = config.interval_jitter_ms;

        let mut tasks = vec![spawn_periodic(
            context.scheduler.clone(),
            Schedule::every_secs(config.reconcile_interval_secs, jitter_ms),
            receiver.clone(),
        )];
        if let Some(poller) = &context.telegram {
            tasks.push(spawn_periodic(
                poller.clone(),
                Schedule::every_secs(config.telegram_interval_secs, jitter_ms),
                receiver.clone(),
            ));
        }
        if let Some(poller) = &context.instagram {
            tasks.push(spawn_periodic(
                poller.clone(),
                Schedule::every_secs(config.instagram_interval_secs, jitter_ms),
                receiver.clone(),
            ));
        }

        info!("[Runtime] Started {} background loop(s)", tasks.len());
        Self { shutdown, tasks }
    }

    pub fn task_count(&self) -> usize {
        self.tasks.len()
    }

    /// Signal every loop and wait for them to finish their current run.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        for task in self.tasks {
            if let Err(e) = task.await {
                warn!("[Runtime] Background task ended abnormally: {}", e);
            }
        }
        info!("[Runtime] Stopped");
    }
}
