//! Remote document store adapters.
//!
//! [`FirestoreClient`] speaks the Firestore REST API; [`MemoryRemoteStore`]
//! keeps documents in process for tests and local development. Both implement
//! [`recordsync_core::sync::RemoteStore`].

mod client;
mod error;
mod memory;
mod payload;
pub mod value;

pub use client::{FirestoreClient, MAX_WRITES_PER_COMMIT};
pub use error::{FirestoreError, Result};
pub use memory::MemoryRemoteStore;
pub use payload::{collection_payload, StoredDocument};
