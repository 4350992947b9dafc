//! Partition management.
//!
//! A [`PartitionedStore`] is a view of the shared store bound to one
//! [`PartitionToken`]. Every key it builds carries that token, so code
//! holding a view cannot read or write another partition's entries.

use std::sync::Arc;

use sharecache_core::{CacheEntry, PartitionToken, RootRef};

use crate::key::{CacheKey, KeyPrefix, KeyScope};
use crate::traits::{PersistentStore, StoreResult};

/// Hands out partition views over one shared store.
pub struct PartitionManager<S> {
    store: Arc<S>,
}

impl<S> Clone for PartitionManager<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
        }
    }
}

impl<S: PersistentStore> PartitionManager<S> {
    /// Wrap a store.
    pub fn new(store: S) -> Self {
        Self {
            store: Arc::new(store),
        }
    }

    /// Wrap an already shared store.
    pub fn from_arc(store: Arc<S>) -> Self {
        Self { store }
    }

    /// The underlying store.
    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// View of one partition.
    pub fn scope(&self, partition: &PartitionToken) -> PartitionedStore<S> {
        PartitionedStore {
            store: Arc::clone(&self.store),
            partition: partition.clone(),
        }
    }

    /// Physically delete every entry of a partition.
    pub fn destroy(&self, partition: &PartitionToken) -> StoreResult<u64> {
        let removed = self
            .store
            .remove_prefix(&KeyPrefix::Partition(partition.clone()))?;
        tracing::info!(partition = %partition, removed, "Destroyed partition");
        Ok(removed)
    }
}

/// A store view bound to one partition.
pub struct PartitionedStore<S> {
    store: Arc<S>,
    partition: PartitionToken,
}

impl<S> Clone for PartitionedStore<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            partition: self.partition.clone(),
        }
    }
}

impl<S: PersistentStore> PartitionedStore<S> {
    /// Partition this view is bound to.
    pub fn partition(&self) -> &PartitionToken {
        &self.partition
    }

    /// Build a key in this partition.
    pub fn key(&self, scope: KeyScope, name: &str) -> CacheKey {
        CacheKey::new(self.partition.clone(), scope, name)
    }

    pub fn put(&self, scope: KeyScope, name: &str, entry: &CacheEntry) -> StoreResult<()> {
        self.store.put(&self.key(scope, name), entry)
    }

    pub fn get(&self, scope: KeyScope, name: &str) -> StoreResult<Option<CacheEntry>> {
        self.store.get(&self.key(scope, name))
    }

    pub fn tombstone(&self, scope: KeyScope, name: &str) -> StoreResult<bool> {
        self.store.tombstone(&self.key(scope, name))
    }

    /// Tombstone everything a root produced in this partition.
    pub fn tombstone_root(&self, root: &RootRef) -> StoreResult<u64> {
        self.store
            .tombstone_prefix(&KeyPrefix::root(self.partition.clone(), root))
    }
}
