//! Persistent key-value storage behind the local cache.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::Value;

use crate::errors::{Error, Result};

/// Durable storage of cache entries, one JSON value per key.
///
/// Reads are synchronous; writes go through the backend's writer and are
/// awaited so a completed `store` is durable.
#[async_trait]
pub trait CacheBackend: Send + Sync {
    fn load_all(&self) -> Result<HashMap<String, Value>>;

    fn load(&self, key: &str) -> Result<Option<Value>>;

    async fn store(&self, key: &str, value: Value) -> Result<()>;

    async fn remove(&self, key: &str) -> Result<()>;
}

/// In-process backend for tests and ephemeral sessions.
#[derive(Debug, Default)]
pub struct MemoryCacheBackend {
    entries: Mutex<HashMap<String, Value>>,
    fail_writes: AtomicBool,
}

impl MemoryCacheBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_entries(entries: HashMap<String, Value>) -> Self {
        Self {
            entries: Mutex::new(entries),
            fail_writes: AtomicBool::new(false),
        }
    }

    /// Make every subsequent write fail, simulating a full or read-only disk.
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    fn entries(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, Value>>> {
        self.entries
            .lock()
            .map_err(|_| Error::cache("memory cache lock poisoned"))
    }

    fn check_writable(&self, key: &str) -> Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(Error::cache(format!("write rejected for '{}'", key)));
        }
        Ok(())
    }
}

#[async_trait]
impl CacheBackend for MemoryCacheBackend {
    fn load_all(&self) -> Result<HashMap<String, Value>> {
        Ok(self.entries()?.clone())
    }

    fn load(&self, key: &str) -> Result<Option<Value>> {
        Ok(self.entries()?.get(key).cloned())
    }

    async fn store(&self, key: &str, value: Value) -> Result<()> {
        self.check_writable(key)?;
        self.entries()?.insert(key.to_string(), value);
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<()> {
        self.check_writable(key)?;
        self.entries()?.remove(key);
        Ok(())
    }
}
