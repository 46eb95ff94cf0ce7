//! SQLite-backed persistent store for the local cache.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};
use diesel::prelude::*;
use diesel::sqlite::SqliteConnection;
use log::warn;
use serde_json::Value;

use recordsync_core::sync::CacheBackend;
use recordsync_core::Result;

use super::model::CacheEntryDB;
use crate::db::write_actor::spawn_writer;
use crate::db::{create_pool, get_connection, init, run_migrations, DbPool, WriteHandle};
use crate::errors::StorageError;
use crate::schema::cache_entries;
use crate::schema::cache_entries::dsl::*;

pub struct SqliteCacheBackend {
    pool: Arc<DbPool>,
    writer: WriteHandle,
}

impl SqliteCacheBackend {
    pub fn new(pool: Arc<DbPool>, writer: WriteHandle) -> Self {
        SqliteCacheBackend { pool, writer }
    }

    /// Open (creating and migrating if needed) the database at `db_path`.
    pub fn open(db_path: &str) -> Result<Self> {
        run_migrations(db_path)?;
        let pool = create_pool(db_path)?;
        let writer = spawn_writer(pool.as_ref().clone());
        Ok(Self::new(pool, writer))
    }

    /// Open the cache database inside an app data directory.
    pub fn open_in_dir(app_data_dir: &str) -> Result<Self> {
        let db_path = init(app_data_dir)?;
        Self::open(&db_path)
    }

    fn decode_entry(entry: CacheEntryDB) -> Option<(String, Value)> {
        match serde_json::from_str(&entry.value) {
            Ok(parsed) => Some((entry.key, parsed)),
            Err(e) => {
                warn!("[Cache] Ignoring unreadable entry '{}': {}", entry.key, e);
                None
            }
        }
    }
}

#[async_trait]
impl CacheBackend for SqliteCacheBackend {
    fn load_all(&self) -> Result<HashMap<String, Value>> {
        let mut conn = get_connection(&self.pool)?;
        let entries = cache_entries
            .select(CacheEntryDB::as_select())
            .load::<CacheEntryDB>(&mut conn)
            .map_err(StorageError::from)?;
        Ok(entries.into_iter().filter_map(Self::decode_entry).collect())
    }

    fn load(&self, entry_key: &str) -> Result<Option<Value>> {
        let mut conn = get_connection(&self.pool)?;
        let entry = cache_entries
            .find(entry_key)
            .select(CacheEntryDB::as_select())
            .first::<CacheEntryDB>(&mut conn)
            .optional()
            .map_err(StorageError::from)?;
        Ok(entry.and_then(Self::decode_entry).map(|(_, parsed)| parsed))
    }

    async fn store(&self, entry_key: &str, entry_value: Value) -> Result<()> {
        let row = CacheEntryDB {
            key: entry_key.to_string(),
            value: serde_json::to_string(&entry_value)?,
            updated_at: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
        };

        self.writer
            .exec(move |conn: &mut SqliteConnection| -> Result<()> {
                diesel::insert_into(cache_entries::table)
                    .values(&row)
                    .on_conflict(key)
                    .do_update()
                    .set(&row)
                    .execute(conn)
                    .map_err(StorageError::from)?;
                Ok(())
            })
            .await
    }

    async fn remove(&self, entry_key: &str) -> Result<()> {
        let entry_key = entry_key.to_string();
        self.writer
            .exec(move |conn: &mut SqliteConnection| -> Result<()> {
                diesel::delete(cache_entries.find(entry_key))
                    .execute(conn)
                    .map_err(StorageError::from)?;
                Ok(())
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::tempdir;

    fn setup_backend() -> (tempfile::TempDir, SqliteCacheBackend) {
        let dir = tempdir().expect("tempdir");
        let backend = SqliteCacheBackend::open_in_dir(&dir.path().to_string_lossy())
            .expect("open backend");
        (dir, backend)
    }

    #[tokio::test]
    async fn store_then_load_round_trips_json() {
        let (_dir, backend) = setup_backend();
        let tasks = json!([{"id": "t1", "title": "Plan", "createdAt": "2026-01-01T00:00:00.000Z"}]);

        backend.store("cfo_tasks", tasks.clone()).await.expect("store");
        assert_eq!(backend.load("cfo_tasks").expect("load"), Some(tasks));
        assert_eq!(backend.load("cfo_deals").expect("load missing"), None);
    }

    #[tokio::test]
    async fn store_overwrites_existing_key() {
        let (_dir, backend) = setup_backend();
        backend.store("cfo_last_telegram_update_id", json!(10)).await.expect("store");
        backend.store("cfo_last_telegram_update_id", json!(11)).await.expect("overwrite");

        let all = backend.load_all().expect("load all");
        assert_eq!(all.len(), 1);
        assert_eq!(all.get("cfo_last_telegram_update_id"), Some(&json!(11)));
    }

    #[tokio::test]
    async fn remove_deletes_entry() {
        let (_dir, backend) = setup_backend();
        backend.store("cfo_folders", json!([])).await.expect("store");
        backend.remove("cfo_folders").await.expect("remove");
        backend.remove("cfo_folders").await.expect("remove twice");
        assert_eq!(backend.load("cfo_folders").expect("load"), None);
    }

    #[tokio::test]
    async fn entries_survive_reopen() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().to_string_lossy().to_string();
        {
            let backend = SqliteCacheBackend::open_in_dir(&path).expect("open");
            backend
                .store("cfo_finance_plan", json!({"month": "2026-01"}))
                .await
                .expect("store");
        }

        let reopened = SqliteCacheBackend::open_in_dir(&path).expect("reopen");
        assert_eq!(
            reopened.load("cfo_finance_plan").expect("load"),
            Some(json!({"month": "2026-01"}))
        );
    }

    #[tokio::test]
    async fn reopen_while_previous_handle_is_alive() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().to_string_lossy().to_string();
        let first = SqliteCacheBackend::open_in_dir(&path).expect("open");
        first.store("cfo_tasks", json!([])).await.expect("store");

        for _ in 0..5 {
            let second = SqliteCacheBackend::open_in_dir(&path).expect("reopen");
            assert_eq!(second.load("cfo_tasks").expect("load"), Some(json!([])));
            second
                .store("cfo_deals", json!([{"id": "d1"}]))
                .await
                .expect("store through second handle");
        }
        assert_eq!(
            first.load("cfo_deals").expect("load"),
            Some(json!([{"id": "d1"}]))
        );
    }

    #[tokio::test]
    async fn unreadable_rows_are_skipped_on_hydration() {
        let (_dir, backend) = setup_backend();
        backend.store("cfo_tasks", json!([])).await.expect("store");

        let mut conn = get_connection(&backend.pool).expect("conn");
        diesel::insert_into(cache_entries::table)
            .values(&CacheEntryDB {
                key: "cfo_broken".to_string(),
                value: "{not json".to_string(),
                updated_at: "2026-01-01T00:00:00.000Z".to_string(),
            })
            .execute(&mut conn)
            .expect("insert corrupt row");

        let all = backend.load_all().expect("load all");
        assert!(all.contains_key("cfo_tasks"));
        assert!(!all.contains_key("cfo_broken"));
    }
}
