//! Sources of "current modification time" for staleness checks.

use std::path::PathBuf;
use std::time::SystemTime;

use sharecache_core::{normalize_timestamp, RootKind, RootRef, Timestamp};

/// Supplies the current modification time of a resource.
///
/// `None` means the resource is gone or cannot be timestamped; tracked
/// entries for it are treated as stale.
pub trait ProvenanceSource: Send + Sync {
    fn current_timestamp(&self, root: &RootRef, name: &str) -> Option<Timestamp>;
}

impl<F> ProvenanceSource for F
where
    F: Fn(&RootRef, &str) -> Option<Timestamp> + Send + Sync,
{
    fn current_timestamp(&self, root: &RootRef, name: &str) -> Option<Timestamp> {
        self(root, name)
    }
}

/// Timestamps from the local filesystem.
///
/// Directory roots are timestamped per file. Archive roots are timestamped
/// as one container, so every entry from an archive goes stale together
/// when the archive is rewritten. Other roots have no timestamp.
#[derive(Debug, Clone, Copy, Default)]
pub struct FsProvenance;

impl FsProvenance {
    pub fn new() -> Self {
        Self
    }

    /// Candidate file for `name` under a directory root.
    ///
    /// Names containing `/` are resource paths and used as-is. Anything else
    /// is a class name: `com.a.B` maps to `com/a/B.class`, falling back to the
    /// literal name for flat resources such as `app.properties`.
    pub fn resolve(root: &RootRef, name: &str) -> PathBuf {
        let base = root.path();
        if name.contains('/') {
            return base.join(name.trim_start_matches('/'));
        }
        let class_file = base.join(format!("{}.class", name.replace('.', "/")));
        if class_file.exists() {
            class_file
        } else {
            base.join(name)
        }
    }
}

impl ProvenanceSource for FsProvenance {
    fn current_timestamp(&self, root: &RootRef, name: &str) -> Option<Timestamp> {
        let path = match root.kind() {
            RootKind::Directory => Self::resolve(root, name),
            RootKind::Archive => root.path().to_path_buf(),
            RootKind::Other => return None,
        };
        modified(&path)
    }
}

fn modified(path: &std::path::Path) -> Option<Timestamp> {
    let mtime: SystemTime = std::fs::metadata(path).ok()?.modified().ok()?;
    Some(normalize_timestamp(mtime.into()))
}

/// A source that never knows a timestamp.
///
/// Suitable only for callers that store untracked entries; any tracked
/// entry read through it is stale.
#[derive(Debug, Clone, Copy, Default)]
pub struct UntrackedProvenance;

impl ProvenanceSource for UntrackedProvenance {
    fn current_timestamp(&self, _root: &RootRef, _name: &str) -> Option<Timestamp> {
        None
    }
}
