use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat};
use log::{debug, info};

use recordsync_core::errors::{Error, Result};
use recordsync_core::sync::{
    ChangeOrigin, ChatUpdate, ChatUpdateSource, ChatUser, DEALS_CACHE_KEY,
    SETTING_ENABLE_TELEGRAM_IMPORT, SETTING_LAST_TELEGRAM_UPDATE_ID, TELEGRAM_UPDATE_BATCH_LIMIT,
};

use super::{
    append_comments, find_deal, inbound_comment, message_text, new_deal, revive_archived,
    DealDefaults, MergeOutcome, NewLead, PollReport,
};
use crate::cache::{now_iso, LocalCacheStore};
use crate::runtime::PeriodicJob;

const TELEGRAM_AUTHOR_ID: &str = "telegram_user";

pub struct TelegramPoller {
    cache: Arc<LocalCacheStore>,
    source: Arc<dyn ChatUpdateSource>,
    defaults: DealDefaults,
    timeout: Duration,
}

impl TelegramPoller {
    pub fn new(
        cache: Arc<LocalCacheStore>,
        source: Arc<dyn ChatUpdateSource>,
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

    /// Import is off until the toggle is set.
    pub fn is_enabled(&self) -> bool {
        self.cache
            .get_setting::<bool>(SETTING_ENABLE_TELEGRAM_IMPORT)
            .unwrap_or(false)
    }

    /// Last update id whose deals are stored.
    pub fn cursor(&self) -> i64 {
        self.cache
            .get_setting::<i64>(SETTING_LAST_TELEGRAM_UPDATE_ID)
            .unwrap_or(0)
    }

    pub async fn poll_once(&self) -> Result<PollReport> {
        let mut report = PollReport::default();
        if !self.is_enabled() {
            debug!("[TelegramPoll] Import disabled");
            return Ok(report);
        }

        let cursor = self.cursor();
        report.cursor = Some(cursor.to_string());
        let mut updates = tokio::time::timeout(
            self.timeout,
            self.source
                .get_updates(cursor + 1, TELEGRAM_UPDATE_BATCH_LIMIT),
        )
        .await
        .map_err(|_| Error::Timeout(self.timeout.as_secs()))??;
        updates.sort_by_key(|update| update.update_id);

        for update in updates.into_iter().filter(|u| u.update_id > cursor) {
            let outcome = self.merge_update(&update).await?;
            self.cache
                .set_setting(SETTING_LAST_TELEGRAM_UPDATE_ID, &update.update_id)
                .await?;
            report.count(outcome);
            report.cursor = Some(update.update_id.to_string());
        }

        if report.processed > 0 {
            info!(
                "[TelegramPoll] {} update(s): {} new lead(s), {} appended, cursor {}",
                report.processed,
                report.created,
                report.appended,
                report.cursor.as_deref().unwrap_or_default()
            );
        }
        Ok(report)
    }

    async fn merge_update(&self, update: &ChatUpdate) -> Result<MergeOutcome> {
        let Some(message) = update.message.as_ref().filter(|m| m.chat.is_private()) else {
            return Ok(MergeOutcome::Unchanged);
        };

        let chat_id = message.chat.id.to_string();
        let username = message
            .from
            .as_ref()
            .map(ChatUser::display_name)
            .unwrap_or_else(|| chat_id.clone());
        let text = message_text(message.text.as_deref());
        let sent_at = DateTime::from_timestamp(message.date, 0)
            .map(|at| at.to_rfc3339_opts(SecondsFormat::Millis, true))
            .unwrap_or_else(now_iso);
        let comment = inbound_comment(
            format!("cm-tg-{}", update.update_id),
            text,
            TELEGRAM_AUTHOR_ID,
            &sent_at,
        );

        let mut deals = self.cache.get(DEALS_CACHE_KEY, Vec::new()).as_ref().clone();
        let outcome = match find_deal(&deals, &chat_id) {
            Some(index) => {
                if append_comments(&mut deals[index], vec![comment]) > 0 {
                    if revive_archived(&mut deals[index]) {
                        info!("[TelegramPoll] Reopened archived deal {}", deals[index].id);
                    }
                    MergeOutcome::Appended
                } else {
                    MergeOutcome::Unchanged
                }
            }
            None => {
                deals.push(new_deal(
                    NewLead {
                        id: format!("lead-tg-{}", update.update_id),
                        title: format!("Telegram lead: {}", username),
                        contact_name: username.clone(),
                        username,
                        source: "telegram",
                        chat_id,
                        created_at: sent_at,
                        notes: text.to_string(),
                    },
                    &self.defaults,
                    vec![comment],
                ));
                MergeOutcome::Created
            }
        };

        if outcome != MergeOutcome::Unchanged {
            self.cache
                .set_from(DEALS_CACHE_KEY, deals, ChangeOrigin::External)
                .await?;
        }
        Ok(outcome)
    }
}

#[async_trait]
impl PeriodicJob for TelegramPoller {
    fn name(&self) -> &'static str {
        "TelegramPoll"
    }

    async fn run_once(&self) -> Result<()> {
        self.poll_once().await.map(|_| ())
    }
}
