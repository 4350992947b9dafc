//! sharecache Engine - Shared Bytecode/Resource Cache
//!
//! A persistent cache that lets independent consumers, each with an ordered
//! classpath of directories and archives, store and retrieve class bytecode
//! and resource blobs across processes.
//!
//! # Components
//!
//! - [`ClasspathRegistry`]: registrations, confirmation, root resolution
//! - [`filter_engine`]: store and find gates
//! - [`StalenessTracker`]: provenance timestamps and tombstones
//! - [`PartitionManager`](sharecache_storage::PartitionManager): isolated keyspaces
//! - [`SharedCache`]: the operation surface composing the above
//!
//! # Example
//!
//! ```ignore
//! use sharecache_core::{CacheConfig, OwnerId, RootRef};
//! use sharecache_engine::SharedCache;
//!
//! let cache = SharedCache::open(CacheConfig::from_env())?;
//! let handle = cache.register(OwnerId::new(), vec![
//!     RootRef::from_path("/app/lib/a.jar"),
//!     RootRef::from_path("/app/classes"),
//! ])?;
//!
//! if cache.find_positional(handle, "com.example.Main")?.is_none() {
//!     let bytes = std::fs::read("/app/classes/com/example/Main.class")?;
//!     cache.store_positional_stamped(handle, 1, "com.example.Main", bytes)?;
//! }
//! ```

pub mod async_cache;
pub mod facade;
pub mod filter_engine;
pub mod outcome;
pub mod provenance;
pub mod registry;
pub mod staleness;
pub mod stats;
pub mod telemetry;

pub use async_cache::AsyncSharedCache;
pub use facade::SharedCache;
pub use outcome::{Found, Lookup, StoreOutcome};
pub use provenance::{FsProvenance, ProvenanceSource, UntrackedProvenance};
pub use registry::{ClasspathRegistry, Registration, RegistrationView};
pub use staleness::{Freshness, StaleReason, StalenessTracker};
pub use stats::CacheStats;
pub use telemetry::{init_tracing, LogFormat, TelemetryConfig};

pub use sharecache_core::{
    CacheConfig, CacheError, CacheResult, Filter, NamePredicate, OwnerId, PartitionToken,
    RegistrationId, RootKind, RootRef, Timestamp,
};
pub use sharecache_storage::{CacheKey, InMemoryStore, LmdbStore, PersistentStore};
