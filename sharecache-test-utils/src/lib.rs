//! sharecache Test Utilities
//!
//! Shared test infrastructure for the sharecache workspace:
//! - A controllable provenance source
//! - Fixtures for in-memory and LMDB-backed caches
//! - Proptest generators for names, roots, partitions and timestamps

pub use sharecache_core::{
    CacheConfig, CacheEntry, CacheError, CacheResult, Filter, NamePredicate, OwnerId,
    PartitionToken, RegistrationId, RootKind, RootRef, Timestamp,
};
pub use sharecache_engine::{
    AsyncSharedCache, Lookup, ProvenanceSource, SharedCache, StoreOutcome,
};
pub use sharecache_storage::{InMemoryStore, LmdbStore, PersistentStore};

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

// ============================================================================
// MANUAL PROVENANCE
// ============================================================================

/// Provenance source whose timestamps are set by the test.
///
/// A per-name timestamp wins over a root-wide one. Clones share state, so a
/// test can keep one handle and give another to the cache.
#[derive(Debug, Clone, Default)]
pub struct ManualProvenance {
    names: Arc<RwLock<HashMap<(String, String), Timestamp>>>,
    roots: Arc<RwLock<HashMap<String, Timestamp>>>,
}

impl ManualProvenance {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the timestamp of one resource.
    pub fn set(&self, root: &RootRef, name: &str, ts: Timestamp) {
        if let Ok(mut names) = self.names.write() {
            names.insert((root.id().to_string(), name.to_string()), ts);
        }
    }

    /// Set the timestamp of every resource under a root.
    pub fn set_root(&self, root: &RootRef, ts: Timestamp) {
        if let Ok(mut roots) = self.roots.write() {
            roots.insert(root.id().to_string(), ts);
        }
    }

    /// Forget a resource, as if its file were deleted.
    pub fn remove(&self, root: &RootRef, name: &str) {
        if let Ok(mut names) = self.names.write() {
            names.remove(&(root.id().to_string(), name.to_string()));
        }
    }

    /// Forget a root-wide timestamp.
    pub fn remove_root(&self, root: &RootRef) {
        if let Ok(mut roots) = self.roots.write() {
            roots.remove(root.id());
        }
    }
}

impl ProvenanceSource for ManualProvenance {
    fn current_timestamp(&self, root: &RootRef, name: &str) -> Option<Timestamp> {
        let by_name = self
            .names
            .read()
            .ok()?
            .get(&(root.id().to_string(), name.to_string()))
            .copied();
        by_name.or_else(|| self.roots.read().ok()?.get(root.id()).copied())
    }
}

/// Timestamp at `secs` seconds after the epoch.
pub fn ts(secs: i64) -> Timestamp {
    chrono::DateTime::from_timestamp(secs, 0).unwrap_or_default()
}

// ============================================================================
// TEST FIXTURES
// ============================================================================

pub mod fixtures {
    //! Pre-built caches and classpaths.

    use super::*;
    use tempfile::TempDir;

    /// `n` archive roots with distinct identities.
    pub fn roots(n: usize) -> Vec<RootRef> {
        (0..n)
            .map(|i| RootRef::archive(format!("/fixture/lib/u{}.jar", i)))
            .collect()
    }

    /// In-memory cache driven by a [`ManualProvenance`].
    pub fn memory_cache() -> (SharedCache<InMemoryStore>, ManualProvenance) {
        memory_cache_with(CacheConfig::default())
    }

    pub fn memory_cache_with(config: CacheConfig) -> (SharedCache<InMemoryStore>, ManualProvenance) {
        let provenance = ManualProvenance::new();
        let cache = SharedCache::new(InMemoryStore::new(), config).with_provenance(provenance.clone());
        (cache, provenance)
    }

    /// LMDB cache in a fresh temporary directory.
    ///
    /// Keep the `TempDir` alive for as long as the cache is used.
    pub fn lmdb_cache() -> (SharedCache<LmdbStore>, ManualProvenance, TempDir) {
        let dir = TempDir::new().expect("TempDir creation should succeed");
        let (cache, provenance) = lmdb_cache_at(&dir);
        (cache, provenance, dir)
    }

    /// LMDB cache opened on an existing directory, as a second process would.
    pub fn lmdb_cache_at(dir: &TempDir) -> (SharedCache<LmdbStore>, ManualProvenance) {
        let config = CacheConfig::default()
            .with_cache_dir(dir.path())
            .with_map_size_mb(16);
        let provenance = ManualProvenance::new();
        let cache = SharedCache::open(config)
            .expect("LMDB cache should open")
            .with_provenance(provenance.clone());
        (cache, provenance)
    }
}

// ============================================================================
// PROPTEST GENERATORS
// ============================================================================

pub mod generators {
    //! Proptest strategies for sharecache types.

    use super::*;
    use proptest::prelude::*;

    /// A dotted class name such as `com.a.B$C`.
    pub fn arb_class_name() -> impl Strategy<Value = String> {
        (
            proptest::collection::vec("[a-z]{1,6}", 1..4),
            "[A-Z][a-zA-Z0-9]{0,8}",
            proptest::option::of("\\$[A-Z][a-z]{0,4}"),
        )
            .prop_map(|(packages, class, inner)| {
                let mut name = packages.join(".");
                name.push('.');
                name.push_str(&class);
                if let Some(inner) = inner {
                    name.push_str(&inner);
                }
                name
            })
    }

    /// A partition token, sometimes the default one.
    pub fn arb_partition() -> impl Strategy<Value = PartitionToken> {
        prop_oneof![
            Just(PartitionToken::default_partition()),
            "[A-Za-z0-9_-]{1,12}".prop_map(PartitionToken::new),
        ]
    }

    /// A directory or archive root.
    pub fn arb_root() -> impl Strategy<Value = RootRef> {
        prop_oneof![
            "/[a-z]{1,8}/[a-z]{1,8}\\.jar".prop_map(RootRef::archive),
            "/[a-z]{1,8}/classes".prop_map(RootRef::directory),
        ]
    }

    /// A classpath with distinct root identities.
    pub fn arb_roots(max: usize) -> impl Strategy<Value = Vec<RootRef>> {
        proptest::collection::btree_set("[a-z]{1,8}", 1..=max.max(1)).prop_map(|ids| {
            ids.into_iter()
                .map(|id| RootRef::archive(format!("/cp/{}.jar", id)))
                .collect()
        })
    }

    /// A timestamp between 2020 and 2030, second precision.
    pub fn arb_timestamp() -> impl Strategy<Value = Timestamp> {
        (1577836800i64..1893456000i64).prop_map(ts)
    }

    /// A small blob.
    pub fn arb_blob() -> impl Strategy<Value = Vec<u8>> {
        proptest::collection::vec(any::<u8>(), 0..256)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manual_provenance_precedence() {
        let source = ManualProvenance::new();
        let root = RootRef::archive("/a.jar");
        assert!(source.current_timestamp(&root, "X").is_none());

        source.set_root(&root, ts(10));
        assert_eq!(source.current_timestamp(&root, "X"), Some(ts(10)));

        source.set(&root, "X", ts(20));
        assert_eq!(source.current_timestamp(&root, "X"), Some(ts(20)));
        assert_eq!(source.current_timestamp(&root, "Y"), Some(ts(10)));

        source.remove(&root, "X");
        source.remove_root(&root);
        assert!(source.current_timestamp(&root, "X").is_none());
    }

    #[test]
    fn test_clones_share_state() {
        let a = ManualProvenance::new();
        let b = a.clone();
        let root = RootRef::archive("/a.jar");
        a.set(&root, "X", ts(5));
        assert_eq!(b.current_timestamp(&root, "X"), Some(ts(5)));
    }

    #[test]
    fn test_fixture_roots_are_distinct() {
        let roots = fixtures::roots(3);
        assert_eq!(roots.len(), 3);
        assert_ne!(roots[0], roots[1]);
        assert_eq!(roots[2].kind(), RootKind::Archive);
    }
}
