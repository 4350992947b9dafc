//! Two OS processes sharing one LMDB cache directory.
//!
//! The parent test re-runs this test binary with `CHILD_DIR_VAR` set; the
//! child opens its own environment on the directory and writes through it.

use std::path::Path;
use std::process::Command;

use sharecache_engine::{Lookup, SharedCache};
use sharecache_test_utils::{CacheConfig, LmdbStore, OwnerId, RootRef};

const CHILD_DIR_VAR: &str = "SHARECACHE_TEST_CHILD_DIR";

fn classpath() -> Vec<RootRef> {
    vec![
        RootRef::archive("/shared/common.jar"),
        RootRef::archive("/shared/app.jar"),
    ]
}

fn open_at(dir: &Path) -> SharedCache<LmdbStore> {
    let config = CacheConfig::default()
        .with_cache_dir(dir)
        .with_map_size_mb(16);
    SharedCache::open(config).expect("LMDB cache should open")
}

/// Child side. Does nothing unless launched by `entries_cross_process_boundary`.
#[test]
fn child_process_writer() {
    let Some(dir) = std::env::var_os(CHILD_DIR_VAR) else {
        return;
    };
    let cache = open_at(Path::new(&dir));
    let h = cache.register(OwnerId::new(), classpath()).unwrap();

    // The parent's committed entry is visible here.
    assert_eq!(
        cache.find_positional(h, "com.parent.P").unwrap(),
        Some((b"parent".to_vec(), 1))
    );

    cache
        .store_positional(h, 0, "com.child.C", b"child".to_vec(), None)
        .unwrap();
    cache
        .store_positional(h, 0, "com.shared.S", b"from-child".to_vec(), None)
        .unwrap();
    assert!(cache.mark_stale_positional(h, 1, "com.parent.M").unwrap());
    cache
        .store_generic("tools", "R", b"child-generic".to_vec())
        .unwrap();
}

#[test]
fn entries_cross_process_boundary() {
    if std::env::var_os(CHILD_DIR_VAR).is_some() {
        return;
    }
    let dir = tempfile::TempDir::new().unwrap();
    let cache = open_at(dir.path());
    let h = cache.register(OwnerId::new(), classpath()).unwrap();

    cache
        .store_positional(h, 1, "com.parent.P", b"parent".to_vec(), None)
        .unwrap();
    cache
        .store_positional(h, 1, "com.parent.M", b"marked".to_vec(), None)
        .unwrap();
    cache
        .store_positional(h, 0, "com.shared.S", b"from-parent".to_vec(), None)
        .unwrap();

    let status = Command::new(std::env::current_exe().unwrap())
        .args(["--exact", "child_process_writer", "--test-threads=1"])
        .env(CHILD_DIR_VAR, dir.path())
        .status()
        .unwrap();
    assert!(status.success(), "child process failed: {status}");

    // The parent keeps its environment open and sees the child's commits.
    assert_eq!(
        cache.find_positional(h, "com.child.C").unwrap(),
        Some((b"child".to_vec(), 0))
    );
    assert_eq!(
        cache.find_positional(h, "com.shared.S").unwrap(),
        Some((b"from-child".to_vec(), 0))
    );
    assert_eq!(cache.lookup_positional(h, "com.parent.M").unwrap(), Lookup::Stale);
    assert_eq!(cache.find_generic("tools", "R"), Some(b"child-generic".to_vec()));
    assert_eq!(cache.stats().unwrap().store.tombstoned, 1);
}
