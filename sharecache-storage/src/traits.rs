//! Persistent store trait.
//!
//! The cache engine only ever talks to the shared store through this trait,
//! so the backend (LMDB, in-memory, anything else) is swappable.

use std::sync::Arc;

use sharecache_core::{CacheEntry, StoreError};

use crate::key::{CacheKey, KeyPrefix};

/// Result type alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// A crash-tolerant, concurrently accessible key to blob store.
///
/// Implementations must give last-write-wins visibility per key and must
/// make a completed `put` visible to a subsequent `get` from the same
/// process. No multi-key atomicity is assumed.
pub trait PersistentStore: Send + Sync {
    /// Write an entry, superseding any previous one under the same key.
    fn put(&self, key: &CacheKey, entry: &CacheEntry) -> StoreResult<()>;

    /// Read an entry, tombstoned or not.
    fn get(&self, key: &CacheKey) -> StoreResult<Option<CacheEntry>>;

    /// Set the tombstone flag on an entry. Returns false if no entry existed.
    fn tombstone(&self, key: &CacheKey) -> StoreResult<bool>;

    /// Tombstone every live entry under a prefix. Returns how many changed.
    fn tombstone_prefix(&self, prefix: &KeyPrefix) -> StoreResult<u64>;

    /// Physically delete every entry under a prefix. Returns how many went.
    fn remove_prefix(&self, prefix: &KeyPrefix) -> StoreResult<u64>;

    /// Entry counts and sizes.
    fn stats(&self) -> StoreResult<StoreStats>;
}

/// Statistics about store contents.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoreStats {
    /// Number of records, tombstoned ones included.
    pub entries: u64,
    /// Number of tombstoned records.
    pub tombstoned: u64,
    /// Sum of blob sizes in bytes.
    pub payload_bytes: u64,
}

impl StoreStats {
    /// Records that are not tombstoned.
    pub fn live(&self) -> u64 {
        self.entries.saturating_sub(self.tombstoned)
    }
}

impl<T: PersistentStore + ?Sized> PersistentStore for Arc<T> {
    fn put(&self, key: &CacheKey, entry: &CacheEntry) -> StoreResult<()> {
        (**self).put(key, entry)
    }

    fn get(&self, key: &CacheKey) -> StoreResult<Option<CacheEntry>> {
        (**self).get(key)
    }

    fn tombstone(&self, key: &CacheKey) -> StoreResult<bool> {
        (**self).tombstone(key)
    }

    fn tombstone_prefix(&self, prefix: &KeyPrefix) -> StoreResult<u64> {
        (**self).tombstone_prefix(prefix)
    }

    fn remove_prefix(&self, prefix: &KeyPrefix) -> StoreResult<u64> {
        (**self).remove_prefix(prefix)
    }

    fn stats(&self) -> StoreResult<StoreStats> {
        (**self).stats()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_live_count() {
        let stats = StoreStats {
            entries: 10,
            tombstoned: 3,
            payload_bytes: 100,
        };
        assert_eq!(stats.live(), 7);
        assert_eq!(StoreStats::default().live(), 0);
    }
}
