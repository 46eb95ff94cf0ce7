//! Core scheduler constants/helpers for background sync loops.

/// Remote pull cadence in seconds.
pub const RECONCILE_INTERVAL_SECS: u64 = 5;

/// Telegram `getUpdates` polling cadence in seconds.
pub const TELEGRAM_POLL_INTERVAL_SECS: u64 = 10;

/// Instagram conversations polling cadence in seconds.
pub const INSTAGRAM_POLL_INTERVAL_SECS: u64 = 60;

/// Maximum jitter (milliseconds) added to periodic cycle intervals.
pub const INTERVAL_JITTER_MS: u64 = 500;

/// Deadline applied to every remote and external call.
pub const REMOTE_CALL_TIMEOUT_SECS: u64 = 30;

/// Maximum updates requested per Telegram poll.
pub const TELEGRAM_UPDATE_BATCH_LIMIT: u32 = 20;
