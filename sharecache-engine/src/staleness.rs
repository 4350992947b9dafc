//! Staleness tracking.
//!
//! Every stored entry records the modification time of the resource it was
//! produced from. A find compares that against the resource's current time:
//! any difference at all, older or newer, makes the entry stale. An entry
//! whose current time cannot be determined is stale as well.
//!
//! A failed comparison is a logical miss only. The tombstone bit is written
//! solely by [`StalenessTracker::mark_stale`]; a fresh store clears it by
//! superseding the entry.

use sharecache_core::{same_instant, CacheEntry, Timestamp};
use sharecache_storage::{KeyScope, PartitionedStore, PersistentStore, StoreResult};

/// Why an entry failed revalidation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StaleReason {
    /// Explicitly marked stale.
    Tombstoned,
    /// The resource's timestamp differs from the recorded one.
    TimestampChanged,
    /// The resource no longer exists or cannot be timestamped.
    SourceMissing,
}

/// Outcome of revalidating an entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Freshness {
    Fresh,
    Stale(StaleReason),
}

impl Freshness {
    pub fn is_stale(&self) -> bool {
        matches!(self, Self::Stale(_))
    }
}

/// Records and checks entry provenance.
#[derive(Debug, Clone, Copy, Default)]
pub struct StalenessTracker;

impl StalenessTracker {
    pub fn new() -> Self {
        Self
    }

    /// Tag a blob with the time its resource was last known modified.
    ///
    /// `None` stores an untracked entry, which only goes stale when it is
    /// explicitly marked.
    pub fn record_provenance(&self, blob: Vec<u8>, provenance: Option<Timestamp>) -> CacheEntry {
        CacheEntry::new(blob, provenance)
    }

    /// Compare an entry against the resource's current timestamp.
    pub fn check(&self, entry: &CacheEntry, current: Option<Timestamp>) -> Freshness {
        if entry.is_tombstoned() {
            return Freshness::Stale(StaleReason::Tombstoned);
        }
        match (entry.provenance(), current) {
            (None, _) => Freshness::Fresh,
            (Some(_), None) => Freshness::Stale(StaleReason::SourceMissing),
            (Some(recorded), Some(now)) if same_instant(recorded, now) => Freshness::Fresh,
            (Some(_), Some(_)) => Freshness::Stale(StaleReason::TimestampChanged),
        }
    }

    pub fn is_stale(&self, entry: &CacheEntry, current: Option<Timestamp>) -> bool {
        self.check(entry, current).is_stale()
    }

    /// Set the tombstone flag on one entry. Returns false if nothing was stored.
    pub fn mark_stale<S: PersistentStore>(
        &self,
        store: &PartitionedStore<S>,
        scope: KeyScope,
        name: &str,
    ) -> StoreResult<bool> {
        store.tombstone(scope, name)
    }
}
