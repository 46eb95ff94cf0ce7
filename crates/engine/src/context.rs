//! Assembles one engine instance from configuration.

use std::sync::Arc;
use std::time::Duration;

use log::info;

use recordsync_connectors::{InstagramGraphSource, TelegramBotSource};
use recordsync_core::config::SyncConfig;
use recordsync_core::errors::Result;
use recordsync_core::sync::{
    default_registry, CacheBackend, ChatUpdateSource, CollectionRegistry, InboxSource,
    MemoryCacheBackend, RemoteStore,
};
use recordsync_remote::{FirestoreClient, MemoryRemoteStore};
use recordsync_storage_sqlite::SqliteCacheBackend;

use crate::cache::LocalCacheStore;
use crate::poller::{DealDefaults, InstagramPoller, TelegramPoller};
use crate::push::RemotePusher;
use crate::reconcile::ReconciliationScheduler;

/// External sources wired into an engine. `None` disables that poller.
#[derive(Default)]
pub struct ExternalSources {
    pub telegram: Option<Arc<dyn ChatUpdateSource>>,
    pub instagram: Option<Arc<dyn InboxSource>>,
}

pub struct SyncContext {
    pub config: SyncConfig,
    pub cache: Arc<LocalCacheStore>,
    pub remote: Arc<dyn RemoteStore>,
    pub scheduler: Arc<ReconciliationScheduler>,
    pub telegram: Option<Arc<TelegramPoller>>,
    pub instagram: Option<Arc<InstagramPoller>>,
}

impl SyncContext {
    /// Build every component from `config`.
    ///
    /// Without a Firestore project the remote is an in-process store; without
    /// a SQLite path the cache lives in memory.
    pub fn from_config(config: SyncConfig) -> Result<Self> {
        let timeout = Duration::from_secs(config.remote_timeout_secs);

        let remote: Arc<dyn RemoteStore> = if config.firestore_project.is_some() {
            Arc::new(FirestoreClient::from_config(&config)?)
        } else {
            info!("[Config] No Firestore project configured; using in-memory remote");
            Arc::new(MemoryRemoteStore::new())
        };

        let backend: Arc<dyn CacheBackend> = match config.sqlite_path.as_deref() {
            Some(path) => Arc::new(SqliteCacheBackend::open(path)?),
            None => Arc::new(MemoryCacheBackend::new()),
        };

        let mut sources = ExternalSources::default();
        if let Some(token) = config.telegram_bot_token.as_deref() {
            sources.telegram = Some(Arc::new(TelegramBotSource::new(
                &config.telegram_api_url,
                token,
                timeout,
            )?));
        }
        if let (Some(account_id), Some(access_token)) = (
            config.instagram_account_id.as_deref(),
            config.instagram_access_token.as_deref(),
        ) {
            sources.instagram = Some(Arc::new(InstagramGraphSource::new(
                &config.instagram_api_url,
                account_id,
                access_token,
                timeout,
            )?));
        }

        Self::assemble(config, default_registry(), backend, remote, sources)
    }

    /// Wire already-built adapters together.
    pub fn assemble(
        config: SyncConfig,
        registry: CollectionRegistry,
        backend: Arc<dyn CacheBackend>,
        remote: Arc<dyn RemoteStore>,
        sources: ExternalSources,
    ) -> Result<Self> {
        let timeout = Duration::from_secs(config.remote_timeout_secs);
        let pusher = Arc::new(RemotePusher::new(remote.clone(), timeout));
        let cache = Arc::new(LocalCacheStore::open(backend, Arc::new(registry))?.with_pusher(pusher));
        let scheduler = Arc::new(ReconciliationScheduler::new(
            cache.clone(),
            remote.clone(),
            timeout,
        ));

        let defaults = DealDefaults::from_config(&config);
        let telegram = sources.telegram.map(|source| {
            Arc::new(TelegramPoller::new(
                cache.clone(),
                source,
                defaults.clone(),
                timeout,
            ))
        });
        let instagram = sources.instagram.map(|source| {
            Arc::new(InstagramPoller::new(
                cache.clone(),
                source,
                defaults.clone(),
                timeout,
            ))
        });

        Ok(Self {
            config,
            cache,
            remote,
            scheduler,
            telegram,
            instagram,
        })
    }
}
