//! Core domain for the records sync engine.
//!
//! Holds the record envelope, the collection registry, the wire codecs and the
//! contracts (remote store, cache backend, external sources) that the storage,
//! remote and engine crates implement or consume.

pub mod config;
pub mod errors;
pub mod sync;
pub mod utils;

pub use errors::{Error, Result};
