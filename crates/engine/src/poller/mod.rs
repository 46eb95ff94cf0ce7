//! External event pollers: merge chat messages into deal records.
//!
//! Each source keeps a persisted cursor that only moves past an event after
//! the deals it produced are stored. Comment ids are derived from the source
//! event, so replaying an event never duplicates a comment.

mod instagram;
mod telegram;

pub use instagram::InstagramPoller;
pub use telegram::TelegramPoller;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use recordsync_core::config::SyncConfig;
use recordsync_core::sync::Record;

use crate::cache::now_iso;

/// Deal field holding the external conversation id, shared by every source.
pub const CHAT_ID_FIELD: &str = "telegramChatId";
pub const COMMENT_TYPE_INBOUND: &str = "telegram_in";
const ATTACHMENT_PLACEHOLDER: &str = "[Attachment]";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PollReport {
    /// Events consumed (cursor moved past them).
    pub processed: usize,
    pub created: usize,
    pub appended: usize,
    /// Events consumed without a change: duplicates, group chats, empty threads.
    pub skipped: usize,
    pub cursor: Option<String>,
}

/// Values stamped on deals created from external leads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DealDefaults {
    pub stage: String,
    pub currency: String,
}

impl DealDefaults {
    pub fn from_config(config: &SyncConfig) -> Self {
        Self {
            stage: config.initial_deal_stage.clone(),
            currency: config.deal_currency.clone(),
        }
    }
}

/// Fields of a new lead deal before comments are attached.
pub(crate) struct NewLead<'a> {
    pub id: String,
    pub title: String,
    pub contact_name: String,
    pub username: String,
    pub source: &'a str,
    pub chat_id: String,
    pub created_at: String,
    pub notes: String,
}

pub(crate) fn new_deal(lead: NewLead<'_>, defaults: &DealDefaults, comments: Vec<Value>) -> Record {
    let mut deal = Record::new(lead.id)
        .with_field("title", lead.title)
        .with_field("contactName", lead.contact_name)
        .with_field("amount", 0)
        .with_field("currency", defaults.currency.clone())
        .with_field("stage", defaults.stage.clone())
        .with_field("source", lead.source)
        .with_field(CHAT_ID_FIELD, lead.chat_id)
        .with_field("telegramUsername", lead.username)
        .with_field("assigneeId", "")
        .with_field("notes", lead.notes)
        .with_field("comments", Value::Array(comments));
    deal.created_at = Some(lead.created_at);
    deal
}

pub(crate) fn inbound_comment(id: String, text: &str, author_id: &str, created_at: &str) -> Value {
    json!({
        "id": id,
        "text": text,
        "authorId": author_id,
        "createdAt": created_at,
        "type": COMMENT_TYPE_INBOUND,
    })
}

pub(crate) fn message_text(text: Option<&str>) -> &str {
    text.filter(|t| !t.is_empty())
        .unwrap_or(ATTACHMENT_PLACEHOLDER)
}

/// Index of the deal linked to `chat_id`.
pub(crate) fn find_deal(deals: &[Record], chat_id: &str) -> Option<usize> {
    deals
        .iter()
        .position(|deal| deal.str_field(CHAT_ID_FIELD) == Some(chat_id))
}

/// Append comments whose id is not on the deal yet. Returns how many were added.
pub(crate) fn append_comments(deal: &mut Record, comments: Vec<Value>) -> usize {
    let mut existing = match deal.fields.remove("comments") {
        Some(Value::Array(list)) => list,
        _ => Vec::new(),
    };
    let mut added = 0;
    for comment in comments {
        let id = comment.get("id").and_then(Value::as_str);
        let duplicate = existing
            .iter()
            .any(|c| c.get("id").and_then(Value::as_str) == id);
        if !duplicate {
            existing.push(comment);
            added += 1;
        }
    }
    deal.fields
        .insert("comments".to_string(), Value::Array(existing));
    added
}

/// Unarchive a deal that just received a new inbound message. Returns `true`
/// when it was archived.
pub(crate) fn revive_archived(deal: &mut Record) -> bool {
    if !deal.is_archived() {
        return false;
    }
    deal.is_archived = Some(false);
    deal.updated_at = Some(now_iso());
    true
}

/// What merging one event did to the deal list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum MergeOutcome {
    Created,
    Appended,
    Unchanged,
}

impl PollReport {
    pub(crate) fn count(&mut self, outcome: MergeOutcome) {
        self.processed += 1;
        match outcome {
            MergeOutcome::Created => self.created += 1,
            MergeOutcome::Appended => self.appended += 1,
            MergeOutcome::Unchanged => self.skipped += 1,
        }
    }
}
