use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use log::{debug, info, warn};

use recordsync_core::errors::{Error, Result};
use recordsync_core::sync::{
    ChangeOrigin, InboxConversation, InboxSource, DEALS_CACHE_KEY, SETTING_LAST_INSTAGRAM_SYNC_AT,
};

use super::{
    append_comments, find_deal, inbound_comment, message_text, new_deal, revive_archived,
    DealDefaults, MergeOutcome, NewLead, PollReport,
};
use crate::cache::LocalCacheStore;
use crate::runtime::PeriodicJob;

/// Graph API timestamps come as `2026-01-01T10:00:00+0000`.
fn parse_graph_time(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .or_else(|_| DateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%z"))
        .ok()
        .map(|parsed| parsed.with_timezone(&Utc))
}

fn canonical_time(value: &str) -> String {
    parse_graph_time(value)
        .map(|at| at.to_rfc3339_opts(SecondsFormat::Millis, true))
        .unwrap_or_else(|| value.to_string())
}

fn at_handle(username: &str) -> String {
    if username.starts_with('@') {
        username.to_string()
    } else {
        format!("@{}", username)
    }
}

pub struct InstagramPoller {
    cache: Arc<LocalCacheStore>,
    source: Arc<dyn InboxSource>,
    defaults: DealDefaults,
    timeout: Duration,
}

impl InstagramPoller {
    pub fn new(
        cache: Arc<LocalCacheStore>,
        source: Arc<dyn InboxSource>,
        defaults: DealDefaults,
        timeout: Duration,
    ) -> Self {
        Self {
            cache,
            source,
            defaults,
            timeout,
        }
    }

    /// Update time of the last conversation whose deals are stored.
    pub fn cursor(&self) -> Option<String> {
        self.cache
            .get_setting::<String>(SETTING_LAST_INSTAGRAM_SYNC_AT)
    }

    pub async fn poll_once(&self) -> Result<PollReport> {
        let cursor = self.cursor();
        let cursor_at = cursor.as_deref().and_then(parse_graph_time);
        let mut report = PollReport {
            cursor: cursor.clone(),
            ..PollReport::default()
        };

        let conversations = self
            .with_timeout(self.source.list_conversations(cursor.as_deref()))
            .await?;

        let mut pending: Vec<(Option<DateTime<Utc>>, InboxConversation)> = conversations
            .into_iter()
            .map(|conversation| (parse_graph_time(&conversation.updated_time), conversation))
            .filter(|(updated_at, _)| match (updated_at, cursor_at) {
                (Some(updated_at), Some(cursor_at)) => *updated_at > cursor_at,
                _ => true,
            })
            .collect();
        pending.sort_by_key(|(updated_at, _)| *updated_at);

        // The cursor only passes a timestamp once every conversation carrying
        // it is stored; the filter above is strict.
        let mut pending = pending.into_iter().peekable();
        while let Some((updated_at, conversation)) = pending.next() {
            let outcome = self.merge_conversation(&conversation).await?;
            report.count(outcome);

            let boundary_done = pending
                .peek()
                .map_or(true, |(next_at, _)| *next_at != updated_at);
            match updated_at {
                Some(_) if !boundary_done => {}
                Some(updated_at) => {
                    let next = updated_at.to_rfc3339_opts(SecondsFormat::Millis, true);
                    self.cache
                        .set_setting(SETTING_LAST_INSTAGRAM_SYNC_AT, &next)
                        .await?;
                    report.cursor = Some(next);
                }
                None => warn!(
                    "[InstagramPoll] Conversation {} has unreadable updated_time '{}'",
                    conversation.id, conversation.updated_time
                ),
            }
        }

        if report.processed > 0 {
            info!(
                "[InstagramPoll] {} conversation(s): {} new lead(s), {} appended",
                report.processed, report.created, report.appended
            );
        } else {
            debug!("[InstagramPoll] Nothing new since {:?}", report.cursor);
        }
        Ok(report)
    }

    async fn with_timeout<T>(&self, call: impl std::future::Future<Output = Result<T>>) -> Result<T> {
        tokio::time::timeout(self.timeout, call)
            .await
            .map_err(|_| Error::Timeout(self.timeout.as_secs()))?
    }

    async fn merge_conversation(&self, conversation: &InboxConversation) -> Result<MergeOutcome> {
        let messages = self
            .with_timeout(self.source.list_messages(&conversation.id))
            .await?;
        if messages.is_empty() {
            return Ok(MergeOutcome::Unchanged);
        }

        let comments = messages
            .iter()
            .map(|message| {
                inbound_comment(
                    format!("cm-{}", message.id),
                    message_text(message.message.as_deref()),
                    &message.from.id,
                    &canonical_time(&message.created_time),
                )
            })
            .collect::<Vec<_>>();

        let mut deals = self.cache.get(DEALS_CACHE_KEY, Vec::new()).as_ref().clone();
        let outcome = match find_deal(&deals, &conversation.id) {
            Some(index) => {
                if append_comments(&mut deals[index], comments) > 0 {
                    if revive_archived(&mut deals[index]) {
                        info!("[InstagramPoll] Reopened archived deal {}", deals[index].id);
                    }
                    MergeOutcome::Appended
                } else {
                    MergeOutcome::Unchanged
                }
            }
            None => {
                let participant = conversation.counterpart();
                let username = participant
                    .and_then(|p| p.handle())
                    .unwrap_or("unknown")
                    .to_string();
                let contact_name = participant
                    .and_then(|p| p.name.clone())
                    .filter(|name| !name.is_empty())
                    .unwrap_or_else(|| username.clone());
                let first = &messages[0];

                deals.push(new_deal(
                    NewLead {
                        id: format!("deal-ig-{}", conversation.id),
                        title: format!("Instagram lead: {}", username),
                        contact_name,
                        username: at_handle(&username),
                        source: "instagram",
                        chat_id: conversation.id.clone(),
                        created_at: canonical_time(&first.created_time),
                        notes: first.message.clone().unwrap_or_default(),
                    },
                    &self.defaults,
                    comments,
                ));
                MergeOutcome::Created
            }
        };

        if outcome == MergeOutcome::Created {
            // The conversation may have had a deal that was archived and pulled away.
            self.cache
                .forget_tombstones(DEALS_CACHE_KEY, &deals[deals.len() - 1..])
                .await?;
        }
        if outcome != MergeOutcome::Unchanged {
            self.cache
                .set_from(DEALS_CACHE_KEY, deals, ChangeOrigin::External)
                .await?;
        }
        Ok(outcome)
    }
}

#[async_trait]
impl PeriodicJob for InstagramPoller {
    fn name(&self) -> &'static str {
        "InstagramPoll"
    }

    async fn run_once(&self) -> Result<()> {
        self.poll_once().await.map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{engine_with, StaticInbox};
    use recordsync_core::sync::{default_registry, InboxMessage, InboxParticipant, Record};
    use serde_json::Value;

    fn participant(id: &str, username: &str) -> InboxParticipant {
        InboxParticipant {
            id: id.to_string(),
            username: Some(username.to_string()),
            name: None,
        }
    }

    fn conversation(id: &str, updated_time: &str) -> InboxConversation {
        InboxConversation {
            id: id.to_string(),
            participants: vec![participant("acct", "shop"), participant("u1", "buyer")],
            updated_time: updated_time.to_string(),
        }
    }

    fn message(id: &str, text: &str, created_time: &str) -> InboxMessage {
        InboxMessage {
            id: id.to_string(),
            from: participant("u1", "buyer"),
            message: Some(text.to_string()),
            created_time: created_time.to_string(),
        }
    }

    fn poller(inbox: Arc<StaticInbox>) -> (Arc<LocalCacheStore>, InstagramPoller) {
        let (cache, _remote) = engine_with(default_registry());
        let poller = InstagramPoller::new(
            cache.clone(),
            inbox,
            DealDefaults {
                stage: "new".to_string(),
                currency: "UZS".to_string(),
            },
            Duration::from_secs(5),
        );
        (cache, poller)
    }

    fn comments(deal: &Record) -> Vec<String> {
        deal.field("comments")
            .and_then(Value::as_array)
            .map(|list| {
                list.iter()
                    .filter_map(|c| c.get("id").and_then(Value::as_str).map(str::to_string))
                    .collect()
            })
            .unwrap_or_default()
    }

    #[tokio::test]
    async fn conversation_becomes_deal_and_advances_cursor() {
        let inbox = Arc::new(StaticInbox::default());
        *inbox.conversations.lock().expect("conversations") =
            vec![conversation("acct_1", "2026-01-01T10:05:00+0000")];
        *inbox.messages.lock().expect("messages") = vec![(
            "acct_1".to_string(),
            vec![
                message("m1", "hi", "2026-01-01T10:00:00+0000"),
                message("m2", "price?", "2026-01-01T10:05:00+0000"),
            ],
        )];
        let (cache, poller) = poller(inbox.clone());

        let report = poller.poll_once().await.expect("poll");

        assert_eq!(report.created, 1);
        assert_eq!(poller.cursor().as_deref(), Some("2026-01-01T10:05:00.000Z"));
        let deals = cache.get(DEALS_CACHE_KEY, Vec::new());
        let deal = &deals[0];
        assert_eq!(deal.id, "deal-ig-acct_1");
        assert_eq!(deal.str_field("telegramUsername"), Some("@buyer"));
        assert_eq!(deal.str_field("source"), Some("instagram"));
        assert_eq!(deal.created_at.as_deref(), Some("2026-01-01T10:00:00.000Z"));
        assert_eq!(comments(deal), vec!["cm-m1", "cm-m2"]);

        poller.poll_once().await.expect("second poll");
        let since = inbox.since.lock().expect("since").clone();
        assert_eq!(since, vec![None, Some("2026-01-01T10:05:00.000Z".to_string())]);
        cache.wait_for_pushes().await;
    }

    #[tokio::test]
    async fn new_messages_append_without_duplicates() {
        let inbox = Arc::new(StaticInbox::default());
        *inbox.conversations.lock().expect("conversations") =
            vec![conversation("acct_1", "2026-01-01T10:00:00+0000")];
        *inbox.messages.lock().expect("messages") = vec![(
            "acct_1".to_string(),
            vec![message("m1", "hi", "2026-01-01T10:00:00+0000")],
        )];
        let (cache, poller) = poller(inbox.clone());
        poller.poll_once().await.expect("first poll");

        *inbox.conversations.lock().expect("conversations") =
            vec![conversation("acct_1", "2026-01-01T11:00:00+0000")];
        inbox.messages.lock().expect("messages")[0]
            .1
            .push(message("m2", "still there?", "2026-01-01T11:00:00+0000"));
        let report = poller.poll_once().await.expect("second poll");
        assert_eq!(report.appended, 1);

        // Same conversation replayed after a cursor reset.
        cache
            .remove_setting(SETTING_LAST_INSTAGRAM_SYNC_AT)
            .await
            .expect("reset cursor");
        let report = poller.poll_once().await.expect("replay");
        assert_eq!(report.skipped, 1);

        let deals = cache.get(DEALS_CACHE_KEY, Vec::new());
        assert_eq!(deals.len(), 1);
        assert_eq!(comments(&deals[0]), vec!["cm-m1", "cm-m2"]);
        cache.wait_for_pushes().await;
    }

    #[tokio::test]
    async fn failed_conversation_stops_batch_before_its_cursor() {
        let inbox = Arc::new(StaticInbox::default());
        *inbox.conversations.lock().expect("conversations") = vec![
            conversation("acct_2", "2026-01-02T00:00:00+0000"),
            conversation("acct_1", "2026-01-01T00:00:00+0000"),
        ];
        *inbox.messages.lock().expect("messages") = vec![
            ("acct_1".to_string(), vec![message("m1", "a", "2026-01-01T00:00:00+0000")]),
            ("acct_2".to_string(), vec![message("m2", "b", "2026-01-02T00:00:00+0000")]),
        ];
        *inbox.failing_conversation.lock().expect("failing") = Some("acct_2".to_string());
        let (cache, poller) = poller(inbox.clone());

        assert!(poller.poll_once().await.is_err());
        assert_eq!(poller.cursor().as_deref(), Some("2026-01-01T00:00:00.000Z"));
        assert_eq!(cache.get(DEALS_CACHE_KEY, Vec::new()).len(), 1);

        *inbox.failing_conversation.lock().expect("failing") = None;
        let report = poller.poll_once().await.expect("retry");
        assert_eq!(report.created, 1);
        assert_eq!(poller.cursor().as_deref(), Some("2026-01-02T00:00:00.000Z"));
        cache.wait_for_pushes().await;
    }

    #[tokio::test]
    async fn conversations_sharing_a_timestamp_survive_partial_failure() {
        let inbox = Arc::new(StaticInbox::default());
        *inbox.conversations.lock().expect("conversations") = vec![
            conversation("a", "2026-01-01T10:00:00+0000"),
            conversation("b", "2026-01-01T10:00:00+0000"),
        ];
        *inbox.messages.lock().expect("messages") = vec![
            ("a".to_string(), vec![message("m1", "hi", "2026-01-01T10:00:00+0000")]),
            ("b".to_string(), vec![message("m2", "hey", "2026-01-01T10:00:00+0000")]),
        ];
        *inbox.failing_conversation.lock().expect("failing") = Some("b".to_string());
        let (cache, poller) = poller(inbox.clone());

        assert!(poller.poll_once().await.is_err());
        assert_eq!(poller.cursor(), None);

        *inbox.failing_conversation.lock().expect("failing") = None;
        let report = poller.poll_once().await.expect("retry");

        assert_eq!(report.processed, 2);
        assert_eq!(report.created, 1);
        assert_eq!(report.skipped, 1);
        let ids: Vec<String> = cache
            .get(DEALS_CACHE_KEY, Vec::new())
            .iter()
            .map(|d| d.id.clone())
            .collect();
        assert_eq!(ids, vec!["deal-ig-a", "deal-ig-b"]);
        assert_eq!(poller.cursor().as_deref(), Some("2026-01-01T10:00:00.000Z"));
        cache.wait_for_pushes().await;
    }

    #[tokio::test]
    async fn empty_conversation_is_consumed() {
        let inbox = Arc::new(StaticInbox::default());
        *inbox.conversations.lock().expect("conversations") =
            vec![conversation("acct_3", "2026-01-03T00:00:00+0000")];
        let (cache, poller) = poller(inbox);

        let report = poller.poll_once().await.expect("poll");

        assert_eq!(report.skipped, 1);
        assert!(cache.get(DEALS_CACHE_KEY, Vec::new()).is_empty());
        assert_eq!(poller.cursor().as_deref(), Some("2026-01-03T00:00:00.000Z"));
    }

    #[test]
    fn graph_times_are_canonicalized() {
        assert_eq!(canonical_time("2026-01-01T10:00:00+0000"), "2026-01-01T10:00:00.000Z");
        assert_eq!(canonical_time("2026-01-01T12:00:00+02:00"), "2026-01-01T10:00:00.000Z");
        assert_eq!(canonical_time("yesterday"), "yesterday");
    }
}
