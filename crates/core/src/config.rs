//! Runtime configuration for the sync engine.

use std::str::FromStr;

use log::warn;
use serde::Deserialize;

use crate::sync::{
    INSTAGRAM_POLL_INTERVAL_SECS, INTERVAL_JITTER_MS, RECONCILE_INTERVAL_SECS,
    REMOTE_CALL_TIMEOUT_SECS, TELEGRAM_POLL_INTERVAL_SECS,
};

pub const DEFAULT_FIRESTORE_API_URL: &str = "https://firestore.googleapis.com/v1";
pub const DEFAULT_TELEGRAM_API_URL: &str = "https://api.telegram.org";
pub const DEFAULT_INSTAGRAM_API_URL: &str = "https://graph.facebook.com/v18.0";
pub const DEFAULT_DEAL_STAGE: &str = "new";
pub const DEFAULT_DEAL_CURRENCY: &str = "UZS";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SyncConfig {
    pub firestore_project: Option<String>,
    pub firestore_api_url: String,
    pub firestore_token: Option<String>,
    /// SQLite cache file. `None` keeps the cache in memory.
    pub sqlite_path: Option<String>,
    pub reconcile_interval_secs: u64,
    pub telegram_bot_token: Option<String>,
    pub telegram_api_url: String,
    pub telegram_interval_secs: u64,
    pub instagram_account_id: Option<String>,
    pub instagram_access_token: Option<String>,
    pub instagram_api_url: String,
    pub instagram_interval_secs: u64,
    pub remote_timeout_secs: u64,
    pub interval_jitter_ms: u64,
    pub initial_deal_stage: String,
    pub deal_currency: String,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            firestore_project: None,
            firestore_api_url: DEFAULT_FIRESTORE_API_URL.to_string(),
            firestore_token: None,
            sqlite_path: None,
            reconcile_interval_secs: RECONCILE_INTERVAL_SECS,
            telegram_bot_token: None,
            telegram_api_url: DEFAULT_TELEGRAM_API_URL.to_string(),
            telegram_interval_secs: TELEGRAM_POLL_INTERVAL_SECS,
            instagram_account_id: None,
            instagram_access_token: None,
            instagram_api_url: DEFAULT_INSTAGRAM_API_URL.to_string(),
            instagram_interval_secs: INSTAGRAM_POLL_INTERVAL_SECS,
            remote_timeout_secs: REMOTE_CALL_TIMEOUT_SECS,
            interval_jitter_ms: INTERVAL_JITTER_MS,
            initial_deal_stage: DEFAULT_DEAL_STAGE.to_string(),
            deal_currency: DEFAULT_DEAL_CURRENCY.to_string(),
        }
    }
}

impl SyncConfig {
    /// Read `RECORDSYNC_*` environment variables on top of the defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let text = |name: &str| {
            lookup(name)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        let url = |name: &str, default: String| {
            text(name)
                .map(|v| v.trim_end_matches('/').to_string())
                .unwrap_or(default)
        };
        let number = |name: &str, default: u64| parse_or(name, text(name), default);

        let defaults = Self::default();
        Self {
            firestore_project: text("RECORDSYNC_FIRESTORE_PROJECT"),
            firestore_api_url: url("RECORDSYNC_FIRESTORE_API_URL", defaults.firestore_api_url),
            firestore_token: text("RECORDSYNC_FIRESTORE_TOKEN"),
            sqlite_path: text("RECORDSYNC_SQLITE_PATH"),
            reconcile_interval_secs: number(
                "RECORDSYNC_RECONCILE_INTERVAL_SECS",
                defaults.reconcile_interval_secs,
            ),
            telegram_bot_token: text("RECORDSYNC_TELEGRAM_BOT_TOKEN"),
            telegram_api_url: url("RECORDSYNC_TELEGRAM_API_URL", defaults.telegram_api_url),
            telegram_interval_secs: number(
                "RECORDSYNC_TELEGRAM_INTERVAL_SECS",
                defaults.telegram_interval_secs,
            ),
            instagram_account_id: text("RECORDSYNC_INSTAGRAM_ACCOUNT_ID"),
            instagram_access_token: text("RECORDSYNC_INSTAGRAM_ACCESS_TOKEN"),
            instagram_api_url: url("RECORDSYNC_INSTAGRAM_API_URL", defaults.instagram_api_url),
            instagram_interval_secs: number(
                "RECORDSYNC_INSTAGRAM_INTERVAL_SECS",
                defaults.instagram_interval_secs,
            ),
            remote_timeout_secs: number(
                "RECORDSYNC_REMOTE_TIMEOUT_SECS",
                defaults.remote_timeout_secs,
            ),
            interval_jitter_ms: number("RECORDSYNC_INTERVAL_JITTER_MS", defaults.interval_jitter_ms),
            initial_deal_stage: text("RECORDSYNC_INITIAL_DEAL_STAGE")
                .unwrap_or(defaults.initial_deal_stage),
            deal_currency: text("RECORDSYNC_DEAL_CURRENCY").unwrap_or(defaults.deal_currency),
        }
    }

    pub fn telegram_enabled(&self) -> bool {
        self.telegram_bot_token.is_some()
    }

    pub fn instagram_enabled(&self) -> bool {
        self.instagram_account_id.is_some() && self.instagram_access_token.is_some()
    }
}

fn parse_or<T: FromStr + Copy>(name: &str, raw: Option<String>, default: T) -> T {
    match raw {
        None => default,
        Some(raw) => raw.parse().unwrap_or_else(|_| {
            warn!("[Config] Ignoring invalid value '{}' for {}", raw, name);
            default
        }),
    }
}
