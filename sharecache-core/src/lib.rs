//! sharecache Core - Data Types
//!
//! Pure data structures shared by the storage and engine crates: identities,
//! classpath roots, partitions, cache entries, filters, errors and
//! configuration. No I/O happens in this crate.

pub mod config;
pub mod error;
pub mod filter;

pub use config::CacheConfig;
pub use error::{CacheError, CacheResult, ConfigError, StoreError};
pub use filter::{Filter, NamePredicate};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use uuid::Uuid;

// ============================================================================
// TIME
// ============================================================================

/// Timestamp type using UTC timezone.
///
/// Provenance timestamps are persisted with microsecond precision, so every
/// comparison goes through [`same_instant`].
pub type Timestamp = DateTime<Utc>;

/// Truncate a timestamp to the precision the store persists.
pub fn normalize_timestamp(ts: Timestamp) -> Timestamp {
    DateTime::from_timestamp_micros(ts.timestamp_micros()).unwrap_or(ts)
}

/// Returns true if both timestamps denote the same persisted instant.
pub fn same_instant(a: Timestamp, b: Timestamp) -> bool {
    a.timestamp_micros() == b.timestamp_micros()
}

// ============================================================================
// IDENTITY TYPES
// ============================================================================

/// Opaque handle for a cache consumer (typically one class loader).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct OwnerId(Uuid);

impl OwnerId {
    /// Generate a new, timestamp-sortable owner id.
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    /// Wrap an existing UUID.
    pub fn from_uuid(id: Uuid) -> Self {
        Self(id)
    }

    /// Get the underlying UUID.
    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for OwnerId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for OwnerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Handle to one registration held by the classpath registry.
///
/// Registrations are private to the process that created them; the handle
/// has no meaning to any other process sharing the same store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RegistrationId(Uuid);

impl RegistrationId {
    /// Generate a new registration id.
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    /// Get the underlying UUID.
    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for RegistrationId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RegistrationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// CLASSPATH ROOTS
// ============================================================================

/// What kind of container a classpath root is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RootKind {
    /// A directory of individual class/resource files.
    Directory,
    /// A jar, zip or module image, timestamped as one container.
    Archive,
    /// Anything else (remote URLs, synthetic roots). Never timestamped.
    Other,
}

/// One element of a classpath.
///
/// The `id` is the root's identity in the shared store: two processes with
/// the same root id share positional entries for it. Paths are normalised
/// lexically (`.` segments, repeated and trailing separators); `..` and
/// symlinks are left alone.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RootRef {
    id: String,
    kind: RootKind,
}

/// File extensions treated as archives by [`RootRef::from_path`].
const ARCHIVE_EXTENSIONS: &[&str] = &["jar", "zip", "jmod", "jimage"];

impl RootRef {
    /// Create a root with an explicit kind.
    pub fn new(id: impl Into<String>, kind: RootKind) -> Self {
        Self {
            id: id.into(),
            kind,
        }
    }

    /// Create a directory root.
    pub fn directory(path: impl AsRef<Path>) -> Self {
        Self::new(normalize_path(path.as_ref()), RootKind::Directory)
    }

    /// Create an archive root.
    pub fn archive(path: impl AsRef<Path>) -> Self {
        Self::new(normalize_path(path.as_ref()), RootKind::Archive)
    }

    /// Create a root from a path, classifying it by extension.
    pub fn from_path(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        let is_archive = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| ARCHIVE_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
            .unwrap_or(false);
        if is_archive {
            Self::archive(path)
        } else {
            Self::directory(path)
        }
    }

    /// The root's identity string.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// The root's container kind.
    pub fn kind(&self) -> RootKind {
        self.kind
    }

    /// The identity interpreted as a filesystem path.
    pub fn path(&self) -> &Path {
        Path::new(&self.id)
    }
}

fn normalize_path(path: &Path) -> String {
    path.components()
        .collect::<PathBuf>()
        .to_string_lossy()
        .into_owned()
}

impl fmt::Display for RootRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.id)
    }
}

// ============================================================================
// PARTITIONS
// ============================================================================

/// Name of an isolated keyspace inside the shared store.
///
/// The empty token is the default partition.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PartitionToken(String);

impl PartitionToken {
    /// Create a partition token.
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// The default (unnamed) partition.
    pub fn default_partition() -> Self {
        Self::default()
    }

    /// Get the token as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns true for the default partition.
    pub fn is_default(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<&str> for PartitionToken {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for PartitionToken {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl fmt::Display for PartitionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_default() {
            f.write_str("<default>")
        } else {
            f.write_str(&self.0)
        }
    }
}

// ============================================================================
// CACHE ENTRY
// ============================================================================

/// A stored blob plus the metadata the staleness tracker needs.
///
/// Immutable once written except for the tombstone flag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    blob: Vec<u8>,
    provenance: Option<Timestamp>,
    tombstoned: bool,
}

impl CacheEntry {
    /// Create a live entry. `provenance` is the time the originating resource
    /// was last known modified; `None` marks an untracked entry.
    pub fn new(blob: Vec<u8>, provenance: Option<Timestamp>) -> Self {
        Self {
            blob,
            provenance: provenance.map(normalize_timestamp),
            tombstoned: false,
        }
    }

    /// Rebuild an entry with every field given, as decoded from storage.
    pub fn from_parts(blob: Vec<u8>, provenance: Option<Timestamp>, tombstoned: bool) -> Self {
        Self {
            blob,
            provenance: provenance.map(normalize_timestamp),
            tombstoned,
        }
    }

    /// The stored bytes.
    pub fn blob(&self) -> &[u8] {
        &self.blob
    }

    /// Consume the entry and return the stored bytes.
    pub fn into_blob(self) -> Vec<u8> {
        self.blob
    }

    /// Recorded provenance timestamp, if the entry is tracked.
    pub fn provenance(&self) -> Option<Timestamp> {
        self.provenance
    }

    /// Whether the entry has been explicitly marked stale.
    pub fn is_tombstoned(&self) -> bool {
        self.tombstoned
    }

    /// Set the tombstone flag.
    pub fn mark_tombstoned(&mut self) {
        self.tombstoned = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_root_from_path_classifies_archives() {
        assert_eq!(RootRef::from_path("/lib/a.jar").kind(), RootKind::Archive);
        assert_eq!(RootRef::from_path("/lib/B.ZIP").kind(), RootKind::Archive);
        assert_eq!(RootRef::from_path("/classes").kind(), RootKind::Directory);
        assert_eq!(RootRef::from_path("/lib/a.jar").id(), "/lib/a.jar");
    }

    #[test]
    fn test_root_identity_is_normalised() {
        assert_eq!(RootRef::archive("/lib/./a.jar"), RootRef::archive("/lib/a.jar"));
        assert_eq!(RootRef::archive("/lib//a.jar").id(), "/lib/a.jar");
        assert_eq!(RootRef::directory("/app/classes/"), RootRef::directory("/app/classes"));
        assert_eq!(RootRef::from_path("build/./classes/").id(), "build/classes");
        // `..` may cross a symlink, so it is kept.
        assert_eq!(RootRef::directory("/a/../b").id(), "/a/../b");
    }

    #[test]
    fn test_partition_default() {
        let p = PartitionToken::default_partition();
        assert!(p.is_default());
        assert_eq!(p.to_string(), "<default>");
        assert_eq!(PartitionToken::from("P1").as_str(), "P1");
    }

    #[test]
    fn test_entry_normalizes_provenance() {
        let ts = Utc.timestamp_opt(100, 123_456_789).unwrap();
        let entry = CacheEntry::new(b"x".to_vec(), Some(ts));
        let stored = entry.provenance().unwrap();
        assert_eq!(stored.timestamp_subsec_nanos(), 123_456_000);
        assert!(same_instant(stored, ts));
    }

    #[test]
    fn test_same_instant_detects_drift() {
        let a = Utc.timestamp_opt(100, 0).unwrap();
        let b = Utc.timestamp_opt(100, 1_000).unwrap();
        assert!(!same_instant(a, b));
        assert!(same_instant(a, a));
    }

    #[test]
    fn test_entry_tombstone() {
        let mut entry = CacheEntry::new(vec![1, 2, 3], None);
        assert!(!entry.is_tombstoned());
        entry.mark_tombstoned();
        assert!(entry.is_tombstoned());
        assert_eq!(entry.into_blob(), vec![1, 2, 3]);
    }

    #[test]
    fn test_ids_are_unique() {
        assert_ne!(OwnerId::new(), OwnerId::new());
        assert_ne!(RegistrationId::new(), RegistrationId::new());
    }
}
