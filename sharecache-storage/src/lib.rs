//! sharecache Storage - Persistent Store Layer
//!
//! Defines the [`PersistentStore`] abstraction the cache engine writes
//! through, the partition-scoped key encoding, the on-disk record format,
//! and two backends:
//!
//! - [`LmdbStore`]: memory-mapped LMDB environment shared between processes
//! - [`InMemoryStore`]: process-local map for tests and embedding
//!
//! # Partition Isolation
//!
//! A [`CacheKey`] cannot be constructed without a
//! [`PartitionToken`](sharecache_core::PartitionToken). Entries written under
//! one partition are invisible to every other partition because the
//! partition digest leads every encoded key.

pub mod key;
pub mod lmdb_backend;
pub mod memory;
pub mod partition;
pub mod record;
pub mod traits;

pub use key::{CacheKey, KeyPrefix, KeyScope};
pub use lmdb_backend::{LmdbStore, LMDB_MAX_KEY_SIZE};
pub use memory::InMemoryStore;
pub use partition::{PartitionManager, PartitionedStore};
pub use traits::{PersistentStore, StoreResult, StoreStats};
