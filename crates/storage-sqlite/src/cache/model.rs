//! Database model for cache entries.

use diesel::prelude::*;

#[derive(Queryable, Identifiable, Insertable, AsChangeset, Selectable, Debug, Clone)]
#[diesel(primary_key(key))]
#[diesel(table_name = crate::schema::cache_entries)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct CacheEntryDB {
    pub key: String,
    /// JSON document.
    pub value: String,
    pub updated_at: String,
}
