//! SQLite persistence for the local record cache.
//!
//! One table of JSON documents keyed by cache key, written through a single
//! writer thread and read through an r2d2 pool.

pub mod cache;
pub mod db;
pub mod errors;
pub mod schema;

pub use cache::SqliteCacheBackend;
pub use errors::StorageError;
