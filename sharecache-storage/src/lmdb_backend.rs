//! LMDB-backed persistent store.
//!
//! Uses the heed crate (Rust bindings for LMDB) to provide a memory-mapped,
//! crash-tolerant key-value store that several processes can open at once.
//!
//! # Concurrency
//!
//! LMDB provides ACID transactions across processes:
//! - Read transactions for `get` and `stats`
//! - Write transactions for `put`, `tombstone` and the prefix operations
//!
//! A committed write is visible to every read transaction started after it,
//! in this process or another one.

use std::path::{Path, PathBuf};

use heed::types::Bytes;
use heed::{Database, Env, EnvOpenOptions};
use sharecache_core::config::mb_to_bytes;
use sharecache_core::{CacheConfig, CacheEntry, StoreError};

use crate::key::{CacheKey, KeyPrefix};
use crate::record;
use crate::traits::{PersistentStore, StoreResult, StoreStats};

/// Largest key LMDB accepts with its default build settings.
pub const LMDB_MAX_KEY_SIZE: usize = 511;

/// LMDB-backed store.
///
/// # Example
///
/// ```ignore
/// use sharecache_storage::{CacheKey, LmdbStore, PersistentStore};
/// use sharecache_core::{CacheEntry, PartitionToken};
///
/// let store = LmdbStore::new("/tmp/sharecache", 64)?;
/// let key = CacheKey::data(PartitionToken::new("P1"), "X");
/// store.put(&key, &CacheEntry::new(b"blob".to_vec(), None))?;
/// ```
#[derive(Debug)]
pub struct LmdbStore {
    /// The LMDB environment.
    env: Env,
    /// The main database (single unnamed database).
    db: Database<Bytes, Bytes>,
    /// Directory holding the environment.
    path: PathBuf,
}

impl LmdbStore {
    /// Open (or create) a store.
    ///
    /// # Arguments
    ///
    /// * `path` - Directory where LMDB files will be stored
    /// * `max_size_mb` - Maximum size of the database in megabytes
    pub fn new<P: AsRef<Path>>(path: P, max_size_mb: usize) -> StoreResult<Self> {
        let path = path.as_ref();
        let map_size = mb_to_bytes(max_size_mb).ok_or_else(|| StoreError::EnvOpen {
            path: path.display().to_string(),
            reason: format!("map size of {} MB overflows", max_size_mb),
        })?;
        std::fs::create_dir_all(path).map_err(|e| StoreError::Io {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;

        // SAFETY: the environment directory is owned by the cache and is not
        // opened twice by this process with different options.
        let env = unsafe {
            EnvOpenOptions::new()
                .map_size(map_size)
                .max_dbs(1)
                .open(path)
        }
        .map_err(|e| StoreError::EnvOpen {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;

        let mut wtxn = env.write_txn().map_err(txn_err)?;
        let db: Database<Bytes, Bytes> = env
            .create_database(&mut wtxn, None)
            .map_err(|e| StoreError::EnvOpen {
                path: path.display().to_string(),
                reason: e.to_string(),
            })?;
        wtxn.commit().map_err(txn_err)?;

        tracing::debug!(path = %path.display(), max_size_mb, "Opened LMDB store");

        Ok(Self {
            env,
            db,
            path: path.to_path_buf(),
        })
    }

    /// Open the store described by a cache configuration.
    pub fn open(config: &CacheConfig) -> StoreResult<Self> {
        Self::new(&config.cache_dir, config.map_size_mb)
    }

    /// Directory holding the environment.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn encode_key(key: &CacheKey) -> StoreResult<Vec<u8>> {
        let encoded = key.encode();
        if encoded.len() > LMDB_MAX_KEY_SIZE {
            return Err(StoreError::KeyTooLong {
                len: encoded.len(),
                limit: LMDB_MAX_KEY_SIZE,
            });
        }
        Ok(encoded)
    }

    /// Collect every record under a prefix inside a write transaction.
    fn collect_prefix(
        &self,
        wtxn: &heed::RwTxn<'_>,
        prefix: &[u8],
    ) -> StoreResult<Vec<(Vec<u8>, Vec<u8>)>> {
        let iter = self.db.prefix_iter(wtxn, prefix).map_err(txn_err)?;
        let mut records = Vec::new();
        for result in iter {
            let (key, value) = result.map_err(txn_err)?;
            records.push((key.to_vec(), value.to_vec()));
        }
        Ok(records)
    }
}

impl PersistentStore for LmdbStore {
    fn put(&self, key: &CacheKey, entry: &CacheEntry) -> StoreResult<()> {
        let encoded_key = Self::encode_key(key)?;
        let raw = record::encode_entry(entry);

        let mut wtxn = self.env.write_txn().map_err(txn_err)?;
        self.db.put(&mut wtxn, &encoded_key, &raw).map_err(txn_err)?;
        wtxn.commit().map_err(txn_err)
    }

    fn get(&self, key: &CacheKey) -> StoreResult<Option<CacheEntry>> {
        let encoded_key = Self::encode_key(key)?;
        let rtxn = self.env.read_txn().map_err(txn_err)?;
        match self.db.get(&rtxn, &encoded_key).map_err(txn_err)? {
            Some(raw) => record::decode_entry(raw).map(Some),
            None => Ok(None),
        }
    }

    fn tombstone(&self, key: &CacheKey) -> StoreResult<bool> {
        let encoded_key = Self::encode_key(key)?;
        let mut wtxn = self.env.write_txn().map_err(txn_err)?;

        let existing = self
            .db
            .get(&wtxn, &encoded_key)
            .map_err(txn_err)?
            .map(|v| v.to_vec());

        let Some(mut raw) = existing else {
            return Ok(false);
        };
        record::set_tombstone(&mut raw)?;
        self.db.put(&mut wtxn, &encoded_key, &raw).map_err(txn_err)?;
        wtxn.commit().map_err(txn_err)?;
        Ok(true)
    }

    fn tombstone_prefix(&self, prefix: &KeyPrefix) -> StoreResult<u64> {
        let prefix = prefix.encode();
        let mut wtxn = self.env.write_txn().map_err(txn_err)?;
        let records = self.collect_prefix(&wtxn, &prefix)?;

        let mut changed = 0u64;
        for (key, mut raw) in records {
            // Corrupt records are skipped; they already read as misses.
            if let Ok((false, _)) = record::peek(&raw) {
                record::set_tombstone(&mut raw)?;
                self.db.put(&mut wtxn, &key, &raw).map_err(txn_err)?;
                changed += 1;
            }
        }

        wtxn.commit().map_err(txn_err)?;
        Ok(changed)
    }

    fn remove_prefix(&self, prefix: &KeyPrefix) -> StoreResult<u64> {
        let prefix = prefix.encode();
        let mut wtxn = self.env.write_txn().map_err(txn_err)?;
        let records = self.collect_prefix(&wtxn, &prefix)?;

        let mut deleted = 0u64;
        for (key, _) in &records {
            if self.db.delete(&mut wtxn, key).map_err(txn_err)? {
                deleted += 1;
            }
        }

        wtxn.commit().map_err(txn_err)?;
        Ok(deleted)
    }

    fn stats(&self) -> StoreResult<StoreStats> {
        let rtxn = self.env.read_txn().map_err(txn_err)?;
        let mut stats = StoreStats::default();
        for result in self.db.iter(&rtxn).map_err(txn_err)? {
            let (_, raw) = result.map_err(txn_err)?;
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

fn txn_err(e: heed::Error) -> StoreError {
    StoreError::Transaction {
        reason: e.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use sharecache_core::{PartitionToken, RootRef};
    use std::sync::Arc;
    use tempfile::TempDir;

    fn create_test_store() -> (LmdbStore, TempDir) {
        let temp_dir = TempDir::new().expect("TempDir creation should succeed");
        let store = LmdbStore::new(temp_dir.path(), 10).expect("store creation should succeed");
        (store, temp_dir)
    }

    fn p(s: &str) -> PartitionToken {
        PartitionToken::new(s)
    }

    #[test]
    fn test_put_get_with_provenance() {
        let (store, _dir) = create_test_store();
        let ts = Utc.timestamp_opt(100, 0).unwrap();
        let key = CacheKey::positional(p(""), &RootRef::archive("/a.jar"), "K");

        store.put(&key, &CacheEntry::new(b"blob".to_vec(), Some(ts))).unwrap();
        let entry = store.get(&key).unwrap().expect("entry should exist");
        assert_eq!(entry.blob(), b"blob");
        assert_eq!(entry.provenance(), Some(ts));
        assert!(!entry.is_tombstoned());
    }

    #[test]
    fn test_overflowing_map_size_rejected() {
        let dir = TempDir::new().expect("TempDir creation should succeed");
        let err = LmdbStore::new(dir.path(), usize::MAX / 1024).unwrap_err();
        assert!(matches!(err, StoreError::EnvOpen { .. }));
    }

    #[test]
    fn test_get_missing() {
        let (store, _dir) = create_test_store();
        assert!(store.get(&CacheKey::data(p("P"), "nope")).unwrap().is_none());
    }

    #[test]
    fn test_tombstone_then_supersede() {
        let (store, _dir) = create_test_store();
        let key = CacheKey::data(p("P"), "X");
        assert!(!store.tombstone(&key).unwrap());

        store.put(&key, &CacheEntry::new(b"a".to_vec(), None)).unwrap();
        assert!(store.tombstone(&key).unwrap());
        assert!(store.get(&key).unwrap().unwrap().is_tombstoned());

        store.put(&key, &CacheEntry::new(b"b".to_vec(), None)).unwrap();
        let entry = store.get(&key).unwrap().unwrap();
        assert!(!entry.is_tombstoned());
        assert_eq!(entry.blob(), b"b");
    }

    #[test]
    fn test_partition_prefix_ops() {
        let (store, _dir) = create_test_store();
        let root = RootRef::archive("/a.jar");
        store
            .put(&CacheKey::positional(p("P"), &root, "X"), &CacheEntry::new(vec![1], None))
            .unwrap();
        store
            .put(&CacheKey::data(p("P"), "Y"), &CacheEntry::new(vec![2, 2], None))
            .unwrap();
        store
            .put(&CacheKey::data(p("Q"), "Y"), &CacheEntry::new(vec![3], None))
            .unwrap();

        assert_eq!(store.tombstone_prefix(&KeyPrefix::root(p("P"), &root)).unwrap(), 1);
        let stats = store.stats().unwrap();
        assert_eq!(stats.entries, 3);
        assert_eq!(stats.tombstoned, 1);
        assert_eq!(stats.payload_bytes, 4);

        assert_eq!(store.remove_prefix(&KeyPrefix::Partition(p("P"))).unwrap(), 2);
        assert_eq!(store.stats().unwrap().entries, 1);
        assert!(store.get(&CacheKey::data(p("Q"), "Y")).unwrap().is_some());
    }

    #[test]
    fn test_oversized_key_rejected() {
        let (store, _dir) = create_test_store();
        let key = CacheKey::data(p(""), "x".repeat(LMDB_MAX_KEY_SIZE));
        let err = store.put(&key, &CacheEntry::new(vec![], None)).unwrap_err();
        assert!(matches!(err, StoreError::KeyTooLong { limit: LMDB_MAX_KEY_SIZE, .. }));
        assert!(store.get(&key).is_err());
    }

    #[test]
    fn test_persists_across_reopen() {
        let temp_dir = TempDir::new().unwrap();
        let key = CacheKey::data(p("P"), "X");
        {
            let store = LmdbStore::new(temp_dir.path(), 10).unwrap();
            store.put(&key, &CacheEntry::new(b"kept".to_vec(), None)).unwrap();
        }
        let store = LmdbStore::new(temp_dir.path(), 10).unwrap();
        assert_eq!(store.get(&key).unwrap().unwrap().blob(), b"kept");
    }

    #[test]
    fn test_concurrent_writers_distinct_keys() {
        let (store, _dir) = create_test_store();
        let store = Arc::new(store);

        let handles: Vec<_> = (0..4)
            .map(|t| {
                let store = Arc::clone(&store);
                std::thread::spawn(move || {
                    for i in 0..25 {
                        let key = CacheKey::data(p("P"), format!("t{}-{}", t, i));
                        store
                            .put(&key, &CacheEntry::new(vec![t as u8, i as u8], None))
                            .unwrap();
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        assert_eq!(store.stats().unwrap().entries, 100);
        let entry = store.get(&CacheKey::data(p("P"), "t3-24")).unwrap().unwrap();
        assert_eq!(entry.blob(), &[3, 24]);
    }
}
