//! Cache/cloud reconciliation engine.
//!
//! [`LocalCacheStore`] owns the local snapshots and pushes local writes,
//! [`ReconciliationScheduler`] pulls the remote and lets it win, and the
//! pollers merge external chat events into deals. [`SyncRuntime`] runs all
//! of them in the background.

pub mod cache;
pub mod context;
pub mod poller;
pub mod push;
pub mod reconcile;
pub mod runtime;
pub mod suppression;

#[cfg(test)]
pub(crate) mod test_support;

pub use cache::LocalCacheStore;
pub use context::{ExternalSources, SyncContext};
pub use poller::{DealDefaults, InstagramPoller, PollReport, TelegramPoller};
pub use push::{PushReport, RemotePusher};
pub use reconcile::ReconciliationScheduler;
pub use runtime::{PeriodicJob, Schedule, SyncRuntime};
pub use suppression::{SaveSuppression, SuppressionGuard};
