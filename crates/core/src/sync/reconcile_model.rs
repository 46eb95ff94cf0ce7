//! Core helpers for reconciliation cycles.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::Record;
use crate::errors::RetryClass;

/// Outcome of one reconciliation cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReconcileStatus {
    Completed,
    /// Save-suppression was held or another cycle was already running.
    Skipped,
    /// The remote load failed; nothing was written.
    Aborted,
}

/// Phase of the reconciliation state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReconcilePhase {
    Idle,
    Pulling,
    Merging,
}

/// Cycle metrics reported to callers and logs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconcileReport {
    pub status: ReconcileStatus,
    /// Cache keys whose snapshot was replaced.
    pub updated: Vec<String>,
    /// Cache keys left untouched because their remote payload was unusable.
    pub failed: Vec<String>,
    pub duration_ms: i64,
}

impl ReconcileReport {
    pub fn skipped() -> Self {
        Self {
            status: ReconcileStatus::Skipped,
            updated: Vec::new(),
            failed: Vec::new(),
            duration_ms: 0,
        }
    }

    pub fn aborted(duration_ms: i64) -> Self {
        Self {
            status: ReconcileStatus::Aborted,
            duration_ms,
            ..Self::skipped()
        }
    }
}

/// What to do with a local collection after comparing it with the remote one.
#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    Unchanged,
    Replace(Vec<Record>),
}

/// Remote wins. Returns `Unchanged` when both sides are deeply equal, so an
/// idle cycle writes nothing.
pub fn reconcile(local: &[Record], remote: Vec<Record>) -> Resolution {
    if local == remote.as_slice() {
        Resolution::Unchanged
    } else {
        Resolution::Replace(remote)
    }
}

/// Drop soft-deleted records.
pub fn filter_archived(records: Vec<Record>) -> Vec<Record> {
    records.into_iter().filter(|r| !r.is_archived()).collect()
}

/// Overlay a remote singleton document onto the local one.
///
/// Remote fields overwrite local ones; local-only fields survive. Returns the
/// merged document only when it differs from `local`. A remote value that is
/// null or not an object leaves the local document alone.
pub fn overlay_document(local: Option<&Value>, remote: &Value) -> Option<Value> {
    let Value::Object(remote_fields) = remote else {
        return None;
    };

    let mut merged = match local {
        Some(Value::Object(fields)) => fields.clone(),
        _ => serde_json::Map::new(),
    };
    for (key, value) in remote_fields {
        merged.insert(key.clone(), value.clone());
    }

    let merged = Value::Object(merged);
    if local == Some(&merged) {
        None
    } else {
        Some(merged)
    }
}

/// Classify HTTP status into retry behavior.
pub fn classify_http_status(status: u16) -> RetryClass {
    match status {
        401 | 403 => RetryClass::ReauthRequired,
        408 | 409 | 423 | 425 | 429 => RetryClass::Retryable,
        500..=599 => RetryClass::Retryable,
        _ => RetryClass::Permanent,
    }
}

/// Exponential backoff in seconds with cap.
pub fn backoff_seconds(consecutive_failures: u32, base_delay_seconds: u64) -> u64 {
    const MAX_EXPONENT: u32 = 6;

    let capped = consecutive_failures.min(MAX_EXPONENT);
    2_u64.pow(capped) * base_delay_seconds
}
