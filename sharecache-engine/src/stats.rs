//! Per-process hit/miss statistics.

use std::sync::atomic::{AtomicU64, Ordering};

use sharecache_storage::StoreStats;

use crate::outcome::{Lookup, StoreOutcome};

/// Snapshot of cache statistics.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Finds that returned an entry.
    pub hits: u64,
    /// Finds with no entry (store errors included).
    pub misses: u64,
    /// Finds rejected by a filter.
    pub filtered: u64,
    /// Finds that only reached stale entries.
    pub stale: u64,
    /// Finds and stores refused by the access flags.
    pub denied: u64,
    /// Entries written.
    pub stores: u64,
    /// Stores that failed in the persistent store.
    pub store_failures: u64,
    /// Contents of the shared store.
    pub store: StoreStats,
}

impl CacheStats {
    /// Fraction of finds that hit.
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses + self.filtered + self.stale;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

#[derive(Debug, Default)]
pub(crate) struct StatsCounters {
    hits: AtomicU64,
    misses: AtomicU64,
    filtered: AtomicU64,
    stale: AtomicU64,
    denied: AtomicU64,
    stores: AtomicU64,
    store_failures: AtomicU64,
}

impl StatsCounters {
    pub(crate) fn record_lookup<T>(&self, lookup: &Lookup<T>) {
        let counter = match lookup {
            Lookup::Hit(_) => &self.hits,
            Lookup::Miss => &self.misses,
            Lookup::Filtered => &self.filtered,
            Lookup::Stale => &self.stale,
            Lookup::Denied => &self.denied,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_store(&self, outcome: StoreOutcome) {
        match outcome {
            StoreOutcome::Stored => self.stores.fetch_add(1, Ordering::Relaxed),
            StoreOutcome::Denied => self.denied.fetch_add(1, Ordering::Relaxed),
            StoreOutcome::Filtered | StoreOutcome::Unverifiable => 0,
        };
    }

    pub(crate) fn record_store_failure(&self) {
        self.store_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self, store: StoreStats) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            filtered: self.filtered.load(Ordering::Relaxed),
            stale: self.stale.load(Ordering::Relaxed),
            denied: self.denied.load(Ordering::Relaxed),
            stores: self.stores.load(Ordering::Relaxed),
            store_failures: self.store_failures.load(Ordering::Relaxed),
            store,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hit_rate() {
        let stats = CacheStats {
            hits: 6,
            misses: 2,
            filtered: 1,
            stale: 1,
            ..Default::default()
        };
        assert!((stats.hit_rate() - 0.6).abs() < 0.001);
        assert!((CacheStats::default().hit_rate() - 0.0).abs() < 0.001);
    }

    #[test]
    fn test_counters() {
        let counters = StatsCounters::default();
        counters.record_lookup(&Lookup::Hit(()));
        counters.record_lookup(&Lookup::<()>::Stale);
        counters.record_lookup(&Lookup::<()>::Denied);
        counters.record_store(StoreOutcome::Stored);
        counters.record_store(StoreOutcome::Filtered);
        counters.record_store_failure();

        let stats = counters.snapshot(StoreStats::default());
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.stale, 1);
        assert_eq!(stats.denied, 1);
        assert_eq!(stats.stores, 1);
        assert_eq!(stats.store_failures, 1);
        assert_eq!(stats.misses, 0);
    }
}
