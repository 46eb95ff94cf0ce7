//! Sync domain models, contracts and pure reconciliation helpers.

mod cache_backend;
mod collection_registry;
mod external_events;
mod reconcile_model;
mod reconcile_scheduler;
mod record_model;
mod remote_store;
mod tombstone_model;

pub use cache_backend::*;
pub use collection_registry::*;
pub use external_events::*;
pub use reconcile_model::*;
pub use reconcile_scheduler::*;
pub use record_model::*;
pub use remote_store::*;
pub use tombstone_model::*;
