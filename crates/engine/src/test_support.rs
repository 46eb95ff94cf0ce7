//! Shared fixtures for engine tests.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use recordsync_core::errors::{Error, Result};
use recordsync_core::sync::{
    ChatUpdate, ChatUpdateSource, CollectionRegistry, InboxConversation, InboxMessage,
    InboxSource, MemoryCacheBackend, Record,
};
use recordsync_remote::MemoryRemoteStore;

use crate::cache::LocalCacheStore;
use crate::push::RemotePusher;

pub fn record(id: &str, title: &str) -> Record {
    Record::new(id).with_field("title", title)
}

/// Cache wired to an in-memory remote through a pusher.
pub fn engine_with(registry: CollectionRegistry) -> (Arc<LocalCacheStore>, Arc<MemoryRemoteStore>) {
    let remote = Arc::new(MemoryRemoteStore::new());
    let cache = cache_with(registry, Arc::new(MemoryCacheBackend::new()), remote.clone());
    (cache, remote)
}

pub fn cache_with(
    registry: CollectionRegistry,
    backend: Arc<MemoryCacheBackend>,
    remote: Arc<MemoryRemoteStore>,
) -> Arc<LocalCacheStore> {
    let pusher = Arc::new(RemotePusher::new(remote, Duration::from_secs(5)));
    Arc::new(
        LocalCacheStore::open(backend, Arc::new(registry))
            .expect("open cache")
            .with_pusher(pusher),
    )
}

/// Scripted bot: each call pops the next batch; an empty script returns no updates.
#[derive(Default)]
pub struct ScriptedChatSource {
    batches: Mutex<VecDeque<Result<Vec<ChatUpdate>>>>,
    offsets: Mutex<Vec<i64>>,
    pub calls: AtomicUsize,
}

impl ScriptedChatSource {
    pub fn new(batches: Vec<Result<Vec<ChatUpdate>>>) -> Self {
        Self {
            batches: Mutex::new(batches.into()),
            ..Self::default()
        }
    }

    pub fn push_batch(&self, batch: Result<Vec<ChatUpdate>>) {
        self.batches.lock().expect("batches").push_back(batch);
    }

    pub fn offsets(&self) -> Vec<i64> {
        self.offsets.lock().expect("offsets").clone()
    }
}

#[async_trait]
impl ChatUpdateSource for ScriptedChatSource {
    async fn get_updates(&self, offset: i64, _limit: u32) -> Result<Vec<ChatUpdate>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.offsets.lock().expect("offsets").push(offset);
        self.batches
            .lock()
            .expect("batches")
            .pop_front()
            .unwrap_or_else(|| Ok(Vec::new()))
    }
}

/// Fixed inbox: the same conversations and messages on every call.
#[derive(Default)]
pub struct StaticInbox {
    pub conversations: Mutex<Vec<InboxConversation>>,
    pub messages: Mutex<Vec<(String, Vec<InboxMessage>)>>,
    pub failing_conversation: Mutex<Option<String>>,
    pub since: Mutex<Vec<Option<String>>>,
}

#[async_trait]
impl InboxSource for StaticInbox {
    async fn list_conversations(&self, since: Option<&str>) -> Result<Vec<InboxConversation>> {
        self.since
            .lock()
            .expect("since")
            .push(since.map(str::to_string));
        Ok(self.conversations.lock().expect("conversations").clone())
    }

    async fn list_messages(&self, conversation_id: &str) -> Result<Vec<InboxMessage>> {
        if self.failing_conversation.lock().expect("failing").as_deref() == Some(conversation_id) {
            return Err(Error::api(500, "messages unavailable"));
        }
        Ok(self
            .messages
            .lock()
            .expect("messages")
            .iter()
            .find(|(id, _)| id == conversation_id)
            .map(|(_, messages)| messages.clone())
            .unwrap_or_default())
    }
}
