//! External event sources.
//!
//! Each provider wraps one third-party API and implements the matching source
//! trait from `recordsync_core::sync`.

pub mod instagram;
pub mod telegram;

use reqwest::Client;
use std::time::Duration;

use crate::errors::ConnectorError;

const MAX_LOG_BODY_CHARS: usize = 512;

pub(crate) fn build_client(
    provider: &'static str,
    timeout: Duration,
) -> Result<Client, ConnectorError> {
    Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|source| ConnectorError::Http { provider, source })
}

pub(crate) fn truncate_body(body: &str) -> String {
    let mut preview = body.chars().take(MAX_LOG_BODY_CHARS).collect::<String>();
    if body.chars().count() > MAX_LOG_BODY_CHARS {
        preview.push_str("...");
    }
    preview
}
