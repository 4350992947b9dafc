//! Async adapter for the cache facade.
//!
//! The persistent store is synchronous and may block on disk I/O, so each
//! call runs the facade on tokio's blocking pool.

use std::sync::Arc;

use async_trait::async_trait;
use sharecache_core::{CacheError, CacheResult, PartitionToken, RegistrationId, Timestamp};
use sharecache_storage::PersistentStore;

use crate::facade::SharedCache;
use crate::outcome::StoreOutcome;

/// Async cache operations for consumers running on tokio.
#[async_trait]
pub trait AsyncSharedCache: Send + Sync {
    /// Find `name` on a registration's classpath.
    async fn find_positional(
        &self,
        handle: RegistrationId,
        name: String,
    ) -> CacheResult<Option<(Vec<u8>, usize)>>;

    /// Store `name` as produced by the root at `index`.
    async fn store_positional(
        &self,
        handle: RegistrationId,
        index: usize,
        name: String,
        blob: Vec<u8>,
        provenance: Option<Timestamp>,
    ) -> CacheResult<StoreOutcome>;

    /// Find untracked generic data.
    async fn find_generic(&self, token: PartitionToken, name: String) -> CacheResult<Option<Vec<u8>>>;

    /// Store untracked generic data.
    async fn store_generic(
        &self,
        token: PartitionToken,
        name: String,
        blob: Vec<u8>,
    ) -> CacheResult<StoreOutcome>;
}

async fn blocking<T, F>(f: F) -> CacheResult<T>
where
    T: Send + 'static,
    F: FnOnce() -> CacheResult<T> + Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| CacheError::Task {
            reason: e.to_string(),
        })?
}

#[async_trait]
impl<S: PersistentStore + 'static> AsyncSharedCache for Arc<SharedCache<S>> {
    async fn find_positional(
        &self,
        handle: RegistrationId,
        name: String,
    ) -> CacheResult<Option<(Vec<u8>, usize)>> {
        let cache = Arc::clone(self);
        blocking(move || SharedCache::find_positional(&*cache, handle, &name)).await
    }

    async fn store_positional(
        &self,
        handle: RegistrationId,
        index: usize,
        name: String,
        blob: Vec<u8>,
        provenance: Option<Timestamp>,
    ) -> CacheResult<StoreOutcome> {
        let cache = Arc::clone(self);
        blocking(move || {
            SharedCache::store_positional(&*cache, handle, index, &name, blob, provenance)
        })
        .await
    }

    async fn find_generic(&self, token: PartitionToken, name: String) -> CacheResult<Option<Vec<u8>>> {
        let cache = Arc::clone(self);
        blocking(move || Ok(SharedCache::find_generic(&*cache, token, &name))).await
    }

    async fn store_generic(
        &self,
        token: PartitionToken,
        name: String,
        blob: Vec<u8>,
    ) -> CacheResult<StoreOutcome> {
        let cache = Arc::clone(self);
        blocking(move || SharedCache::store_generic(&*cache, token, &name, blob)).await
    }
}
