//! Local markers for records hard-deleted remotely by an archive push.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

/// Oldest tombstones are dropped beyond this many per collection.
pub const TOMBSTONE_CAP: usize = 500;

/// Cache key holding the tombstones of `cache_key`.
pub fn tombstone_key(cache_key: &str) -> String {
    format!("{}::tombstones", cache_key)
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TombstoneSet {
    ids: VecDeque<String>,
}

impl TombstoneSet {
    pub fn contains(&self, id: &str) -> bool {
        self.ids.iter().any(|existing| existing == id)
    }

    /// Returns `true` when the set changed.
    pub fn insert(&mut self, id: &str) -> bool {
        if self.contains(id) {
            return false;
        }
        self.ids.push_back(id.to_string());
        while self.ids.len() > TOMBSTONE_CAP {
            self.ids.pop_front();
        }
        true
    }

    /// Returns `true` when the id was present.
    pub fn remove(&mut self, id: &str) -> bool {
        let before = self.ids.len();
        self.ids.retain(|existing| existing != id);
        before != self.ids.len()
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}
