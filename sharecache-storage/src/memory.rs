//! In-memory store for tests and single-process embedding.
//!
//! Records are kept in their encoded form so the record codec is exercised
//! exactly as it is against LMDB.

use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

use sharecache_core::{CacheEntry, StoreError};

use crate::key::{CacheKey, KeyPrefix};
use crate::record;
use crate::traits::{PersistentStore, StoreResult, StoreStats};

/// In-memory persistent store.
#[derive(Debug, Default, Clone)]
pub struct InMemoryStore {
    records: Arc<RwLock<BTreeMap<Vec<u8>, Vec<u8>>>>,
}

impl InMemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored records.
    pub fn len(&self) -> StoreResult<usize> {
        Ok(self
            .records
            .read()
            .map_err(|_| StoreError::LockPoisoned)?
            .len())
    }

    /// Whether the store is empty.
    pub fn is_empty(&self) -> StoreResult<bool> {
        Ok(self.len()? == 0)
    }

    /// Drop every record.
    pub fn clear(&self) -> StoreResult<()> {
        self.records
            .write()
            .map_err(|_| StoreError::LockPoisoned)?
            .clear();
        Ok(())
    }

    /// Overwrite the raw bytes under a key. Used to simulate corruption.
    pub fn put_raw(&self, key: &CacheKey, raw: Vec<u8>) -> StoreResult<()> {
        self.records
            .write()
            .map_err(|_| StoreError::LockPoisoned)?
            .insert(key.encode(), raw);
        Ok(())
    }

    fn keys_with_prefix(records: &BTreeMap<Vec<u8>, Vec<u8>>, prefix: &[u8]) -> Vec<Vec<u8>> {
        records
            .range(prefix.to_vec()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(k, _)| k.clone())
            .collect()
    }
}

impl PersistentStore for InMemoryStore {
    fn put(&self, key: &CacheKey, entry: &CacheEntry) -> StoreResult<()> {
        let raw = record::encode_entry(entry);
        self.records
            .write()
            .map_err(|_| StoreError::LockPoisoned)?
            .insert(key.encode(), raw);
        Ok(())
    }

    fn get(&self, key: &CacheKey) -> StoreResult<Option<CacheEntry>> {
        let records = self.records.read().map_err(|_| StoreError::LockPoisoned)?;
        records
            .get(&key.encode())
            .map(|raw| record::decode_entry(raw))
            .transpose()
    }

    fn tombstone(&self, key: &CacheKey) -> StoreResult<bool> {
        let mut records = self.records.write().map_err(|_| StoreError::LockPoisoned)?;
        match records.get_mut(&key.encode()) {
            Some(raw) => {
                record::set_tombstone(raw)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn tombstone_prefix(&self, prefix: &KeyPrefix) -> StoreResult<u64> {
        let prefix = prefix.encode();
        let mut records = self.records.write().map_err(|_| StoreError::LockPoisoned)?;
        let keys = Self::keys_with_prefix(&records, &prefix);

        let mut changed = 0u64;
        for key in keys {
            if let Some(raw) = records.get_mut(&key) {
                // Corrupt records are skipped; they already read as misses.
                if let Ok((false, _)) = record::peek(raw) {
                    record::set_tombstone(raw)?;
                    changed += 1;
                }
            }
        }
        Ok(changed)
    }

    fn remove_prefix(&self, prefix: &KeyPrefix) -> StoreResult<u64> {
        let prefix = prefix.encode();
        let mut records = self.records.write().map_err(|_| StoreError::LockPoisoned)?;
        let keys = Self::keys_with_prefix(&records, &prefix);
        for key in &keys {
            records.remove(key);
        }
        Ok(keys.len() as u64)
    }

    fn stats(&self) -> StoreResult<StoreStats> {
        let records = self.records.read().map_err(|_| StoreError::LockPoisoned)?;
        let mut stats = StoreStats::default();
        for raw in records.values() {
            stats.entries += 1;
            if let Ok((tombstoned, len)) = record::peek(raw) {
                if tombstoned {
                    stats.tombstoned += 1;
                }
                stats.payload_bytes += len as u64;
            }
        }
        Ok(stats)
    }
}
