//! Save-suppression: counts pushes that are requested but not yet settled.
//!
//! While any guard is alive the reconciliation scheduler skips its cycle and
//! refuses to replace collections from the remote.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::Notify;

#[derive(Debug, Default)]
struct SuppressionState {
    in_flight: AtomicUsize,
    idle: Notify,
}

/// Per-engine counter of in-flight pushes. Cloning shares the counter.
#[derive(Debug, Clone, Default)]
pub struct SaveSuppression {
    state: Arc<SuppressionState>,
}

impl SaveSuppression {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn acquire(&self) -> SuppressionGuard {
        self.state.in_flight.fetch_add(1, Ordering::SeqCst);
        SuppressionGuard {
            state: Arc::clone(&self.state),
        }
    }

    pub fn is_active(&self) -> bool {
        self.in_flight() > 0
    }

    pub fn in_flight(&self) -> usize {
        self.state.in_flight.load(Ordering::SeqCst)
    }

    /// Resolves once no guard is alive.
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.state.idle.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if !self.is_active() {
                return;
            }
            notified.await;
        }
    }
}

/// Released on drop, including when the owning task panics.
#[derive(Debug)]
pub struct SuppressionGuard {
    state: Arc<SuppressionState>,
}

impl Drop for SuppressionGuard {
    fn drop(&mut self) {
        if self.state.in_flight.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.state.idle.notify_waiters();
        }
    }
}
