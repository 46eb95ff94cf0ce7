//! Event payloads from external chat sources and the traits that fetch them.

use async_trait::async_trait;
use serde::{Deserialize, Deserializer, Serialize};

use crate::errors::Result;

/// One entry of a Telegram `getUpdates` result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatUpdate {
    pub update_id: i64,
    #[serde(default)]
    pub message: Option<ChatMessage>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub chat: Chat,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub from: Option<ChatUser>,
    /// Unix seconds.
    #[serde(default)]
    pub date: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chat {
    pub id: i64,
    #[serde(rename = "type")]
    pub kind: String,
}

impl Chat {
    pub fn is_private(&self) -> bool {
        self.kind == "private"
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatUser {
    pub id: i64,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub first_name: Option<String>,
}

impl ChatUser {
    /// `@username` when set, otherwise the first name.
    pub fn display_name(&self) -> String {
        match (&self.username, &self.first_name) {
            (Some(username), _) if !username.is_empty() => format!("@{}", username),
            (_, Some(first_name)) if !first_name.is_empty() => first_name.clone(),
            _ => self.id.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InboxParticipant {
    pub id: String,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
}

impl InboxParticipant {
    pub fn handle(&self) -> Option<&str> {
        self.username
            .as_deref()
            .or(self.name.as_deref())
            .filter(|value| !value.is_empty())
    }
}

/// Instagram conversation summary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InboxConversation {
    pub id: String,
    #[serde(default, deserialize_with = "participants_list")]
    pub participants: Vec<InboxParticipant>,
    /// RFC 3339.
    pub updated_time: String,
}

impl InboxConversation {
    /// The participant that is not the business account itself.
    ///
    /// Conversation ids are prefixed with the account id (`{account}_{thread}`).
    pub fn counterpart(&self) -> Option<&InboxParticipant> {
        let account = self.id.split('_').next().unwrap_or_default();
        self.participants
            .iter()
            .find(|p| p.id != account)
            .or_else(|| self.participants.first())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InboxMessage {
    pub id: String,
    pub from: InboxParticipant,
    #[serde(default)]
    pub message: Option<String>,
    /// RFC 3339.
    pub created_time: String,
}

/// Graph API wraps edges in `{ "data": [...] }`; older payloads use a plain array.
fn participants_list<'de, D>(deserializer: D) -> std::result::Result<Vec<InboxParticipant>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Participants {
        Plain(Vec<InboxParticipant>),
        Edge { data: Vec<InboxParticipant> },
    }

    Ok(match Participants::deserialize(deserializer)? {
        Participants::Plain(list) => list,
        Participants::Edge { data } => data,
    })
}

/// Long-poll style source of chat updates (Telegram bot).
#[async_trait]
pub trait ChatUpdateSource: Send + Sync {
    async fn get_updates(&self, offset: i64, limit: u32) -> Result<Vec<ChatUpdate>>;
}

/// Conversation inbox source (Instagram direct messages).
#[async_trait]
pub trait InboxSource: Send + Sync {
    async fn list_conversations(&self, since: Option<&str>) -> Result<Vec<InboxConversation>>;

    /// Messages of one conversation, oldest first.
    async fn list_messages(&self, conversation_id: &str) -> Result<Vec<InboxMessage>>;
}
