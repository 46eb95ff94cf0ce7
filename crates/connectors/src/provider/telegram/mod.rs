//! Telegram Bot API source.
//!
//! Polls `getUpdates` with an explicit offset; the caller owns the cursor, so
//! no webhook or long-poll timeout is used.

use async_trait::async_trait;
use log::debug;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;

use recordsync_core::errors::Result;
use recordsync_core::sync::{ChatUpdate, ChatUpdateSource};

use crate::errors::ConnectorError;
use crate::provider::{build_client, truncate_body};

const PROVIDER_ID: &str = "TELEGRAM";

#[derive(Debug, Deserialize)]
struct BotApiResponse {
    ok: bool,
    #[serde(default)]
    result: Option<Vec<ChatUpdate>>,
    #[serde(default)]
    description: Option<String>,
}

pub struct TelegramBotSource {
    client: Client,
    api_url: String,
    token: String,
}

impl TelegramBotSource {
    pub fn new(api_url: &str, token: &str, timeout: Duration) -> Result<Self> {
        if token.trim().is_empty() {
            return Err(ConnectorError::Config {
                provider: PROVIDER_ID,
                message: "bot token is required".to_string(),
            }
            .into());
        }
        Ok(Self {
            client: build_client(PROVIDER_ID, timeout)?,
            api_url: api_url.trim_end_matches('/').to_string(),
            token: token.trim().to_string(),
        })
    }

    fn method_url(&self, method: &str) -> String {
        format!("{}/bot{}/{}", self.api_url, self.token, method)
    }

    async fn fetch_updates(&self, offset: i64, limit: u32) -> std::result::Result<Vec<ChatUpdate>, ConnectorError> {
        let resp = self
            .client
            .get(self.method_url("getUpdates"))
            .query(&[
                ("offset", offset.to_string()),
                ("limit", limit.to_string()),
                ("timeout", "0".to_string()),
            ])
            .send()
            .await
            .map_err(|e| ConnectorError::Http {
                provider: PROVIDER_ID,
                source: e.without_url(),
            })?;

        let status = resp.status();
        let body = resp.text().await.map_err(|e| ConnectorError::Http {
            provider: PROVIDER_ID,
            source: e.without_url(),
        })?;

        let parsed = serde_json::from_str::<BotApiResponse>(&body);
        if !status.is_success() {
            let message = parsed
                .ok()
                .and_then(|r| r.description)
                .unwrap_or_else(|| truncate_body(&body));
            return Err(ConnectorError::Api {
                provider: PROVIDER_ID,
                status: status.as_u16(),
                message,
            });
        }

        let parsed = parsed.map_err(|e| ConnectorError::ProviderError {
            provider: PROVIDER_ID,
            message: format!("JSON parse error: {}", e),
        })?;
        if !parsed.ok {
            return Err(ConnectorError::ProviderError {
                provider: PROVIDER_ID,
                message: parsed
                    .description
                    .unwrap_or_else(|| "request was not ok".to_string()),
            });
        }

        let updates = parsed.result.unwrap_or_default();
        debug!(
            "[TelegramPoll] getUpdates offset={} returned {} update(s)",
            offset,
            updates.len()
        );
        Ok(updates)
    }
}

#[async_trait]
impl ChatUpdateSource for TelegramBotSource {
    async fn get_updates(&self, offset: i64, limit: u32) -> Result<Vec<ChatUpdate>> {
        Ok(self.fetch_updates(offset, limit).await?)
    }
}
