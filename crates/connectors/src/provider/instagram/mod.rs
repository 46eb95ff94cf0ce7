//! Instagram Graph API inbox source.

use async_trait::async_trait;
use chrono::DateTime;
use log::debug;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::time::Duration;

use recordsync_core::errors::Result;
use recordsync_core::sync::{InboxConversation, InboxMessage, InboxSource};

use crate::errors::ConnectorError;
use crate::provider::{build_client, truncate_body};

const PROVIDER_ID: &str = "INSTAGRAM";
const CONVERSATION_FIELDS: &str = "id,participants,updated_time";
const MESSAGE_FIELDS: &str = "id,from,to,message,created_time";

#[derive(Debug, Deserialize)]
struct EdgeResponse<T> {
    #[serde(default = "Vec::new")]
    data: Vec<T>,
}

#[derive(Debug, Deserialize)]
struct GraphErrorEnvelope {
    error: GraphError,
}

#[derive(Debug, Deserialize)]
struct GraphError {
    message: String,
    #[serde(default)]
    code: Option<i64>,
}

pub struct InstagramGraphSource {
    client: Client,
    api_url: String,
    account_id: String,
    access_token: String,
}

impl InstagramGraphSource {
    pub fn new(
        api_url: &str,
        account_id: &str,
        access_token: &str,
        timeout: Duration,
    ) -> Result<Self> {
        if account_id.trim().is_empty() || access_token.trim().is_empty() {
            return Err(ConnectorError::Config {
                provider: PROVIDER_ID,
                message: "account id and access token are required".to_string(),
            }
            .into());
        }
        Ok(Self {
            client: build_client(PROVIDER_ID, timeout)?,
            api_url: api_url.trim_end_matches('/').to_string(),
            account_id: account_id.trim().to_string(),
            access_token: access_token.trim().to_string(),
        })
    }

    pub fn account_id(&self) -> &str {
        &self.account_id
    }

    async fn get_edge<T: DeserializeOwned>(
        &self,
        path: &str,
        params: &[(&str, String)],
    ) -> std::result::Result<Vec<T>, ConnectorError> {
        let url = format!("{}/{}", self.api_url, path);
        let resp = self
            .client
            .get(&url)
            .query(params)
            .query(&[("access_token", self.access_token.as_str())])
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

        if !status.is_success() {
            let message = match serde_json::from_str::<GraphErrorEnvelope>(&body) {
                Ok(envelope) => match envelope.error.code {
                    Some(code) => format!("{} (code {})", envelope.error.message, code),
                    None => envelope.error.message,
                },
                Err(_) => truncate_body(&body),
            };
            return Err(ConnectorError::Api {
                provider: PROVIDER_ID,
                status: status.as_u16(),
                message,
            });
        }

        let parsed: EdgeResponse<T> =
            serde_json::from_str(&body).map_err(|e| ConnectorError::ProviderError {
                provider: PROVIDER_ID,
                message: format!("JSON parse error: {}", e),
            })?;
        Ok(parsed.data)
    }
}

/// Graph API accepts `since` as unix seconds; other values pass through untouched.
fn since_param(since: &str) -> String {
    DateTime::parse_from_rfc3339(since)
        .or_else(|_| DateTime::parse_from_str(since, "%Y-%m-%dT%H:%M:%S%z"))
        .map(|parsed| parsed.timestamp().to_string())
        .unwrap_or_else(|_| since.to_string())
}

fn sort_key(created_time: &str) -> i64 {
    DateTime::parse_from_rfc3339(created_time)
        .or_else(|_| DateTime::parse_from_str(created_time, "%Y-%m-%dT%H:%M:%S%z"))
        .map(|parsed| parsed.timestamp_millis())
        .unwrap_or(0)
}

#[async_trait]
impl InboxSource for InstagramGraphSource {
    async fn list_conversations(&self, since: Option<&str>) -> Result<Vec<InboxConversation>> {
        let mut params = vec![
            ("platform", "instagram".to_string()),
            ("fields", CONVERSATION_FIELDS.to_string()),
        ];
        if let Some(since) = since.filter(|value| !value.is_empty()) {
            params.push(("since", since_param(since)));
        }

        let path = format!("{}/conversations", self.account_id);
        let conversations: Vec<InboxConversation> = self.get_edge(&path, &params).await?;
        debug!(
            "[InstagramPoll] {} conversation(s) since {:?}",
            conversations.len(),
            since
        );
        Ok(conversations)
    }

    async fn list_messages(&self, conversation_id: &str) -> Result<Vec<InboxMessage>> {
        let path = format!("{}/messages", urlencoding::encode(conversation_id));
        let mut messages: Vec<InboxMessage> = self
            .get_edge(&path, &[("fields", MESSAGE_FIELDS.to_string())])
            .await?;
        messages.sort_by_key(|message| sort_key(&message.created_time));
        Ok(messages)
    }
}
