//! Operation outcomes.
//!
//! Filtering, staleness and access denial are expected results of a cache
//! operation, not failures, so they are reported here instead of through
//! [`CacheError`](sharecache_core::CacheError).

/// Result of a store operation that reached the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreOutcome {
    /// The entry was written.
    Stored,
    /// The active filter rejected the name for store.
    Filtered,
    /// The cache is read-only or access is denied.
    Denied,
    /// The resource's current timestamp could not be read, so the entry was
    /// not written.
    Unverifiable,
}

impl StoreOutcome {
    /// Returns true if the entry was written.
    pub fn is_stored(&self) -> bool {
        matches!(self, Self::Stored)
    }
}

/// Detailed result of a find.
///
/// Every variant except `Hit` looks like "never stored" to a consumer that
/// only asks for the blob; the distinction exists for tooling and tests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Lookup<T = Vec<u8>> {
    /// A live, fresh, filter-accepted entry.
    Hit(T),
    /// No entry, or the store could not be read.
    Miss,
    /// The active filter rejected the name for find.
    Filtered,
    /// An entry exists but is tombstoned or its provenance no longer matches.
    Stale,
    /// Cache access is denied.
    Denied,
}

impl<T> Lookup<T> {
    /// Returns true for a hit.
    pub fn is_hit(&self) -> bool {
        matches!(self, Self::Hit(_))
    }

    /// Collapse to the consumer view: the value on a hit, `None` otherwise.
    pub fn into_option(self) -> Option<T> {
        match self {
            Self::Hit(value) => Some(value),
            _ => None,
        }
    }

    /// Map the hit value.
    pub fn map<U, F: FnOnce(T) -> U>(self, f: F) -> Lookup<U> {
        match self {
            Self::Hit(value) => Lookup::Hit(f(value)),
            Self::Miss => Lookup::Miss,
            Self::Filtered => Lookup::Filtered,
            Self::Stale => Lookup::Stale,
            Self::Denied => Lookup::Denied,
        }
    }
}

/// A positional hit: the blob and the classpath index it was found at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Found {
    pub blob: Vec<u8>,
    pub index: usize,
}

impl From<Found> for (Vec<u8>, usize) {
    fn from(found: Found) -> Self {
        (found.blob, found.index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_into_option() {
        assert_eq!(Lookup::Hit(vec![1]).into_option(), Some(vec![1]));
        assert_eq!(Lookup::<Vec<u8>>::Stale.into_option(), None);
        assert_eq!(Lookup::<Vec<u8>>::Filtered.into_option(), None);
        assert_eq!(Lookup::<Vec<u8>>::Denied.into_option(), None);
    }

    #[test]
    fn test_map_preserves_non_hits() {
        let found = Lookup::Hit(Found {
            blob: vec![7],
            index: 2,
        });
        assert_eq!(found.map(|f| f.index), Lookup::Hit(2));
        assert_eq!(Lookup::<Found>::Stale.map(|f| f.index), Lookup::Stale);
    }

    #[test]
    fn test_store_outcome() {
        assert!(StoreOutcome::Stored.is_stored());
        assert!(!StoreOutcome::Filtered.is_stored());
        assert!(!StoreOutcome::Denied.is_stored());
        assert!(!StoreOutcome::Unverifiable.is_stored());
    }
}
