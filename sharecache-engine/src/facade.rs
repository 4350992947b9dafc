//! Cache facade.
//!
//! [`SharedCache`] is the operation surface consumers call. It composes the
//! classpath registry, filter engine, staleness tracker and partition manager
//! over one [`PersistentStore`].
//!
//! # Addressing
//!
//! - Positional: `(registration partition, root identity, name)`. The
//!   registry resolves an index to a root at call time; finds search roots in
//!   ascending index order and report the index of the first hit.
//! - Token: `(registration partition, token, name)`, filtered by the
//!   registration's filter.
//! - Generic: `(token as partition, name)`, filtered by the cache-wide
//!   generic filter.
//!
//! # Failure Policy
//!
//! `store` reports store-layer failures as
//! [`CacheError::StoreUnavailable`]. `find` never does: an unreadable or
//! corrupt record is logged and treated as a miss, so a consumer can always
//! fall back to loading the original resource.

use std::sync::{Arc, RwLock};

use sharecache_core::{
    CacheConfig, CacheEntry, CacheError, CacheResult, Filter, OwnerId, PartitionToken,
    RegistrationId, RootRef, Timestamp,
};
use sharecache_storage::{
    CacheKey, InMemoryStore, KeyScope, LmdbStore, PartitionManager, PartitionedStore,
    PersistentStore,
};

use crate::filter_engine;
use crate::outcome::{Found, Lookup, StoreOutcome};
use crate::provenance::{FsProvenance, ProvenanceSource};
use crate::registry::{ClasspathRegistry, RegistrationView};
use crate::staleness::{Freshness, StalenessTracker};
use crate::stats::{CacheStats, StatsCounters};

/// Per-operation event: `info!` when the cache is verbose, `debug!` otherwise.
macro_rules! op_event {
    ($verbose:expr, $($arg:tt)+) => {
        if $verbose {
            tracing::info!($($arg)+);
        } else {
            tracing::debug!($($arg)+);
        }
    };
}

/// The shared bytecode/resource cache.
pub struct SharedCache<S> {
    config: CacheConfig,
    partitions: PartitionManager<S>,
    registry: ClasspathRegistry,
    tracker: StalenessTracker,
    provenance: Arc<dyn ProvenanceSource>,
    generic_filter: RwLock<Option<Filter>>,
    stats: StatsCounters,
}

impl SharedCache<LmdbStore> {
    /// Open the LMDB-backed cache described by `config`.
    pub fn open(config: CacheConfig) -> CacheResult<Self> {
        config.validate()?;
        let store = LmdbStore::open(&config)?;
        tracing::info!(
            cache_dir = %config.cache_dir.display(),
            map_size_mb = config.map_size_mb,
            read_only = config.read_only,
            "Opened shared cache"
        );
        Ok(Self::new(store, config))
    }
}

impl SharedCache<InMemoryStore> {
    /// A process-local cache.
    pub fn in_memory(config: CacheConfig) -> CacheResult<Self> {
        config.validate()?;
        Ok(Self::new(InMemoryStore::new(), config))
    }
}

impl<S: PersistentStore> SharedCache<S> {
    /// Build a cache over an existing store.
    ///
    /// The provenance source defaults to [`FsProvenance`].
    pub fn new(store: S, config: CacheConfig) -> Self {
        Self::from_shared_store(Arc::new(store), config)
    }

    /// Build a cache over a store shared with other caches in this process.
    pub fn from_shared_store(store: Arc<S>, config: CacheConfig) -> Self {
        Self {
            registry: ClasspathRegistry::new(config.max_registrations),
            partitions: PartitionManager::from_arc(store),
            tracker: StalenessTracker::new(),
            provenance: Arc::new(FsProvenance::new()),
            generic_filter: RwLock::new(None),
            stats: StatsCounters::default(),
            config,
        }
    }

    /// Replace the provenance source used by positional finds.
    pub fn with_provenance<P: ProvenanceSource + 'static>(self, source: P) -> Self {
        self.with_shared_provenance(Arc::new(source))
    }

    pub fn with_shared_provenance(mut self, source: Arc<dyn ProvenanceSource>) -> Self {
        self.provenance = source;
        self
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// The underlying persistent store.
    pub fn store(&self) -> &Arc<S> {
        self.partitions.store()
    }

    fn writes_denied(&self) -> bool {
        self.config.read_only || self.config.deny_access
    }

    fn view(&self, handle: RegistrationId) -> CacheResult<RegistrationView> {
        self.registry.get(handle)?.view()
    }

    // ========================================================================
    // REGISTRATION
    // ========================================================================

    /// Register a classpath in the default partition.
    pub fn register(&self, owner: OwnerId, roots: Vec<RootRef>) -> CacheResult<RegistrationId> {
        let partition = self.config.default_partition.clone();
        self.register_partitioned(owner, roots, partition)
    }

    /// Register a classpath in a named partition.
    pub fn register_partitioned(
        &self,
        owner: OwnerId,
        roots: Vec<RootRef>,
        partition: impl Into<PartitionToken>,
    ) -> CacheResult<RegistrationId> {
        let partition = partition.into();
        let root_count = roots.len();
        let handle = self.registry.register(owner, partition.clone(), roots)?;
        tracing::info!(
            registration = %handle,
            owner = %owner,
            partition = %partition,
            roots = root_count,
            "Registered classpath"
        );
        Ok(handle)
    }

    /// Swap the root list of an unconfirmed registration.
    pub fn replace_roots(&self, handle: RegistrationId, roots: Vec<RootRef>) -> CacheResult<()> {
        let root_count = roots.len();
        match self.registry.get(handle)?.replace_roots(roots) {
            Ok(()) => {
                tracing::info!(registration = %handle, roots = root_count, "Replaced classpath roots");
                Ok(())
            }
            Err(e) => {
                tracing::warn!(registration = %handle, error = %e, "Classpath replacement refused");
                Err(e)
            }
        }
    }

    /// A consumer's classpath changed. Same contract as [`Self::replace_roots`].
    pub fn notify_classpath_change(
        &self,
        handle: RegistrationId,
        roots: Vec<RootRef>,
    ) -> CacheResult<()> {
        self.replace_roots(handle, roots)
    }

    /// Freeze a registration's roots. Idempotent.
    pub fn confirm(&self, handle: RegistrationId) -> CacheResult<()> {
        if self.registry.get(handle)?.confirm()? {
            tracing::info!(registration = %handle, "Confirmed classpath");
        }
        Ok(())
    }

    /// Alias of [`Self::confirm`].
    pub fn confirm_all_entries(&self, handle: RegistrationId) -> CacheResult<()> {
        self.confirm(handle)
    }

    pub fn roots(&self, handle: RegistrationId) -> CacheResult<Vec<RootRef>> {
        self.registry.get(handle)?.roots()
    }

    pub fn is_confirmed(&self, handle: RegistrationId) -> CacheResult<bool> {
        self.registry.get(handle)?.is_confirmed()
    }

    pub fn registration_count(&self) -> CacheResult<usize> {
        self.registry.len()
    }

    /// Drop a registration. Its store entries stay behind for others.
    pub fn unregister(&self, handle: RegistrationId) -> CacheResult<bool> {
        let removed = self.registry.unregister(handle)?;
        if removed {
            tracing::info!(registration = %handle, "Unregistered classpath");
        }
        Ok(removed)
    }

    /// Drop every registration held by `owner`.
    pub fn discard_owner(&self, owner: OwnerId) -> CacheResult<usize> {
        let removed = self.registry.discard_owner(owner)?;
        if removed > 0 {
            tracing::info!(owner = %owner, removed, "Discarded owner registrations");
        }
        Ok(removed)
    }

    // ========================================================================
    // FILTERS
    // ========================================================================

    /// Replace a registration's filter. Applies to later operations only.
    pub fn set_filter(&self, handle: RegistrationId, filter: Option<Filter>) -> CacheResult<()> {
        op_event!(
            self.config.verbose,
            registration = %handle,
            active = filter.is_some(),
            "Set registration filter"
        );
        self.registry.get(handle)?.set_filter(filter)
    }

    pub fn get_filter(&self, handle: RegistrationId) -> CacheResult<Option<Filter>> {
        self.registry.get(handle)?.filter()
    }

    pub fn accepts_for_store(&self, handle: RegistrationId, name: &str) -> CacheResult<bool> {
        let filter = self.get_filter(handle)?;
        Ok(filter_engine::accepts_for_store(filter.as_ref(), name))
    }

    pub fn accepts_for_find(&self, handle: RegistrationId, name: &str) -> CacheResult<bool> {
        let filter = self.get_filter(handle)?;
        Ok(filter_engine::accepts_for_find(filter.as_ref(), name))
    }

    /// Replace the filter applied to generic store/find.
    pub fn set_generic_filter(&self, filter: Option<Filter>) -> CacheResult<()> {
        *self
            .generic_filter
            .write()
            .map_err(|_| CacheError::LockPoisoned)? = filter;
        Ok(())
    }

    pub fn generic_filter(&self) -> CacheResult<Option<Filter>> {
        Ok(self
            .generic_filter
            .read()
            .map_err(|_| CacheError::LockPoisoned)?
            .clone())
    }

    // ========================================================================
    // POSITIONAL
    // ========================================================================

    /// Find `name` on a registration's classpath.
    ///
    /// Returns the blob and the index of the lowest root holding a fresh,
    /// visible entry. Only registry misuse is an error.
    pub fn find_positional(
        &self,
        handle: RegistrationId,
        name: &str,
    ) -> CacheResult<Option<(Vec<u8>, usize)>> {
        Ok(self.lookup_positional(handle, name)?.into_option().map(Into::into))
    }

    /// [`Self::find_positional`] revalidating against an explicit source.
    pub fn find_positional_with(
        &self,
        handle: RegistrationId,
        name: &str,
        source: &dyn ProvenanceSource,
    ) -> CacheResult<Option<(Vec<u8>, usize)>> {
        Ok(self
            .lookup_positional_with(handle, name, source)?
            .into_option()
            .map(Into::into))
    }

    /// Positional find reporting why it missed.
    pub fn lookup_positional(&self, handle: RegistrationId, name: &str) -> CacheResult<Lookup<Found>> {
        let source = Arc::clone(&self.provenance);
        self.lookup_positional_with(handle, name, source.as_ref())
    }

    pub fn lookup_positional_with(
        &self,
        handle: RegistrationId,
        name: &str,
        source: &dyn ProvenanceSource,
    ) -> CacheResult<Lookup<Found>> {
        let view = self.view(handle)?;
        let lookup = self.search_roots(&view, name, source);
        self.stats.record_lookup(&lookup);
        op_event!(
            self.config.verbose,
            registration = %handle,
            partition = %view.partition,
            name,
            index = ?lookup_index(&lookup),
            outcome = lookup_label(&lookup),
            "Positional find"
        );
        Ok(lookup)
    }

    fn search_roots(
        &self,
        view: &RegistrationView,
        name: &str,
        source: &dyn ProvenanceSource,
    ) -> Lookup<Found> {
        if self.config.deny_access {
            return Lookup::Denied;
        }
        if !filter_engine::accepts_for_find(view.filter.as_ref(), name) {
            return Lookup::Filtered;
        }

        let store = self.partitions.scope(&view.partition);
        let mut saw_stale = false;
        for (index, root) in view.roots.iter().enumerate() {
            let Some(entry) = self.read_entry(&store, KeyScope::root(root), name) else {
                continue;
            };
            let current = if entry.provenance().is_some() && !entry.is_tombstoned() {
                source.current_timestamp(root, name)
            } else {
                None
            };
            match self.tracker.check(&entry, current) {
                Freshness::Fresh => {
                    return Lookup::Hit(Found {
                        blob: entry.into_blob(),
                        index,
                    })
                }
                Freshness::Stale(reason) => {
                    tracing::debug!(root = %root, index, name, ?reason, "Skipping stale entry");
                    saw_stale = true;
                }
            }
        }

        if saw_stale {
            Lookup::Stale
        } else {
            Lookup::Miss
        }
    }

    /// Store `name` as produced by the root at `index`.
    ///
    /// `provenance` is the resource's modification time when it was read;
    /// `None` stores an untracked entry.
    pub fn store_positional(
        &self,
        handle: RegistrationId,
        index: usize,
        name: &str,
        blob: Vec<u8>,
        provenance: Option<Timestamp>,
    ) -> CacheResult<StoreOutcome> {
        let view = self.view(handle)?;
        let root = view.root(index)?;
        let outcome = self.write_entry(
            &view.partition,
            view.filter.as_ref(),
            KeyScope::root(root),
            name,
            blob,
            provenance,
        )?;
        op_event!(
            self.config.verbose,
            registration = %handle,
            partition = %view.partition,
            name,
            index,
            outcome = ?outcome,
            "Positional store"
        );
        Ok(outcome)
    }

    /// [`Self::store_positional`] stamped with the provenance source's
    /// current timestamp for the root.
    ///
    /// Nothing is written when the source cannot timestamp the resource;
    /// such an entry could never be revalidated.
    pub fn store_positional_stamped(
        &self,
        handle: RegistrationId,
        index: usize,
        name: &str,
        blob: Vec<u8>,
    ) -> CacheResult<StoreOutcome> {
        let root = self.view(handle)?.root(index)?.clone();
        match self.provenance.current_timestamp(&root, name) {
            Some(provenance) => self.store_positional(handle, index, name, blob, Some(provenance)),
            None => {
                let outcome = StoreOutcome::Unverifiable;
                self.stats.record_store(outcome);
                op_event!(
                    self.config.verbose,
                    registration = %handle,
                    root = %root,
                    name,
                    index,
                    outcome = ?outcome,
                    "Positional store skipped, resource has no timestamp"
                );
                Ok(outcome)
            }
        }
    }

    /// Key of a positional entry, for use with [`Self::mark_stale`].
    pub fn positional_key(
        &self,
        handle: RegistrationId,
        index: usize,
        name: &str,
    ) -> CacheResult<CacheKey> {
        let view = self.view(handle)?;
        let root = view.root(index)?;
        Ok(CacheKey::positional(view.partition.clone(), root, name))
    }

    /// Tombstone the entry `name` stored under the root at `index`.
    pub fn mark_stale_positional(
        &self,
        handle: RegistrationId,
        index: usize,
        name: &str,
    ) -> CacheResult<bool> {
        let key = self.positional_key(handle, index, name)?;
        self.mark_stale(&key)
    }

    /// Tombstone every entry produced by the root at `index`.
    ///
    /// Used when a container changes as a whole, such as a rewritten archive.
    pub fn mark_root_stale(&self, handle: RegistrationId, index: usize) -> CacheResult<u64> {
        let view = self.view(handle)?;
        let root = view.root(index)?;
        if self.writes_denied() {
            return Ok(0);
        }
        let marked = self
            .partitions
            .scope(&view.partition)
            .tombstone_root(root)?;
        op_event!(
            self.config.verbose,
            registration = %handle,
            partition = %view.partition,
            root = %root,
            index,
            marked,
            "Marked root stale"
        );
        Ok(marked)
    }

    // ========================================================================
    // TOKEN
    // ========================================================================

    /// Find an entry filed under `token` in a registration's partition.
    pub fn find_token(
        &self,
        handle: RegistrationId,
        token: &str,
        name: &str,
    ) -> CacheResult<Option<Vec<u8>>> {
        let view = self.view(handle)?;
        let lookup = self.lookup_single(
            &view.partition,
            view.filter.as_ref(),
            KeyScope::Token(token.to_string()),
            name,
            None,
        );
        op_event!(
            self.config.verbose,
            registration = %handle,
            token,
            name,
            outcome = lookup_label(&lookup),
            "Token find"
        );
        Ok(lookup.into_option())
    }

    /// Store an untracked entry under `token` in a registration's partition.
    pub fn store_token(
        &self,
        handle: RegistrationId,
        token: &str,
        name: &str,
        blob: Vec<u8>,
    ) -> CacheResult<StoreOutcome> {
        let view = self.view(handle)?;
        let outcome = self.write_entry(
            &view.partition,
            view.filter.as_ref(),
            KeyScope::Token(token.to_string()),
            name,
            blob,
            None,
        )?;
        op_event!(
            self.config.verbose,
            registration = %handle,
            token,
            name,
            outcome = ?outcome,
            "Token store"
        );
        Ok(outcome)
    }

    // ========================================================================
    // GENERIC
    // ========================================================================

    /// Find generic data with no current timestamp.
    ///
    /// Untracked entries are returned; entries stored with provenance cannot
    /// be revalidated here and read as stale. Use [`Self::find_generic_at`].
    pub fn find_generic(&self, token: impl Into<PartitionToken>, name: &str) -> Option<Vec<u8>> {
        self.lookup_generic(token, name, None).into_option()
    }

    /// Find generic data, revalidating against `current`.
    pub fn find_generic_at(
        &self,
        token: impl Into<PartitionToken>,
        name: &str,
        current: Option<Timestamp>,
    ) -> Option<Vec<u8>> {
        self.lookup_generic(token, name, current).into_option()
    }

    /// Generic find reporting why it missed.
    pub fn lookup_generic(
        &self,
        token: impl Into<PartitionToken>,
        name: &str,
        current: Option<Timestamp>,
    ) -> Lookup {
        let partition = token.into();
        let filter = match self.generic_filter() {
            Ok(filter) => filter,
            Err(e) => {
                tracing::warn!(error = %e, "Generic filter unavailable");
                return Lookup::Miss;
            }
        };
        let lookup = self.lookup_single(&partition, filter.as_ref(), KeyScope::Data, name, current);
        op_event!(
            self.config.verbose,
            partition = %partition,
            name,
            outcome = lookup_label(&lookup),
            "Generic find"
        );
        lookup
    }

    /// Store untracked generic data under `token`.
    pub fn store_generic(
        &self,
        token: impl Into<PartitionToken>,
        name: &str,
        blob: Vec<u8>,
    ) -> CacheResult<StoreOutcome> {
        self.store_generic_inner(token.into(), name, blob, None)
    }

    /// Store generic data stamped with its resource's modification time.
    pub fn store_generic_at(
        &self,
        token: impl Into<PartitionToken>,
        name: &str,
        blob: Vec<u8>,
        provenance: Timestamp,
    ) -> CacheResult<StoreOutcome> {
        self.store_generic_inner(token.into(), name, blob, Some(provenance))
    }

    fn store_generic_inner(
        &self,
        partition: PartitionToken,
        name: &str,
        blob: Vec<u8>,
        provenance: Option<Timestamp>,
    ) -> CacheResult<StoreOutcome> {
        let filter = self.generic_filter()?;
        let outcome = self.write_entry(
            &partition,
            filter.as_ref(),
            KeyScope::Data,
            name,
            blob,
            provenance,
        )?;
        op_event!(
            self.config.verbose,
            partition = %partition,
            name,
            outcome = ?outcome,
            "Generic store"
        );
        Ok(outcome)
    }

    /// Tombstone generic data.
    pub fn mark_stale_generic(&self, token: impl Into<PartitionToken>, name: &str) -> CacheResult<bool> {
        self.mark_stale(&CacheKey::data(token.into(), name))
    }

    // ========================================================================
    // STALENESS AND RECLAMATION
    // ========================================================================

    /// Set the tombstone flag on one entry.
    ///
    /// Returns false if no entry existed or writes are denied. Later finds
    /// treat the key as absent until a fresh store supersedes it.
    pub fn mark_stale(&self, key: &CacheKey) -> CacheResult<bool> {
        if self.writes_denied() {
            return Ok(false);
        }
        let store = self.partitions.scope(key.partition());
        let marked = self
            .tracker
            .mark_stale(&store, key.scope().clone(), key.name())?;
        op_event!(
            self.config.verbose,
            partition = %key.partition(),
            name = key.name(),
            marked,
            "Marked stale"
        );
        Ok(marked)
    }

    /// Physically delete every entry of a partition. Returns how many went.
    pub fn destroy_partition(&self, token: impl Into<PartitionToken>) -> CacheResult<u64> {
        if self.writes_denied() {
            return Ok(0);
        }
        Ok(self.partitions.destroy(&token.into())?)
    }

    /// Hit/miss counters of this process plus the store's contents.
    pub fn stats(&self) -> CacheResult<CacheStats> {
        let store = self.partitions.store().stats()?;
        Ok(self.stats.snapshot(store))
    }

    // ========================================================================
    // SHARED PATHS
    // ========================================================================

    fn lookup_single(
        &self,
        partition: &PartitionToken,
        filter: Option<&Filter>,
        scope: KeyScope,
        name: &str,
        current: Option<Timestamp>,
    ) -> Lookup {
        let lookup = if self.config.deny_access {
            Lookup::Denied
        } else if !filter_engine::accepts_for_find(filter, name) {
            Lookup::Filtered
        } else {
            let store = self.partitions.scope(partition);
            match self.read_entry(&store, scope, name) {
                None => Lookup::Miss,
                Some(entry) => match self.tracker.check(&entry, current) {
                    Freshness::Fresh => Lookup::Hit(entry.into_blob()),
                    Freshness::Stale(_) => Lookup::Stale,
                },
            }
        };
        self.stats.record_lookup(&lookup);
        lookup
    }

    fn read_entry(
        &self,
        store: &PartitionedStore<S>,
        scope: KeyScope,
        name: &str,
    ) -> Option<CacheEntry> {
        match store.get(scope, name) {
            Ok(entry) => entry,
            Err(e) => {
                tracing::warn!(
                    partition = %store.partition(),
                    name,
                    error = %e,
                    "Store read failed, treating as miss"
                );
                None
            }
        }
    }

    fn write_entry(
        &self,
        partition: &PartitionToken,
        filter: Option<&Filter>,
        scope: KeyScope,
        name: &str,
        blob: Vec<u8>,
        provenance: Option<Timestamp>,
    ) -> CacheResult<StoreOutcome> {
        let outcome = if self.writes_denied() {
            StoreOutcome::Denied
        } else if !filter_engine::accepts_for_store(filter, name) {
            StoreOutcome::Filtered
        } else {
            let entry = self.tracker.record_provenance(blob, provenance);
            if let Err(e) = self.partitions.scope(partition).put(scope, name, &entry) {
                self.stats.record_store_failure();
                tracing::warn!(partition = %partition, name, error = %e, "Store write failed");
                return Err(e.into());
            }
            StoreOutcome::Stored
        };
        self.stats.record_store(outcome);
        Ok(outcome)
    }
}

fn lookup_label<T>(lookup: &Lookup<T>) -> &'static str {
    match lookup {
        Lookup::Hit(_) => "hit",
        Lookup::Miss => "miss",
        Lookup::Filtered => "filtered",
        Lookup::Stale => "stale",
        Lookup::Denied => "denied",
    }
}

fn lookup_index(lookup: &Lookup<Found>) -> Option<usize> {
    match lookup {
        Lookup::Hit(found) => Some(found.index),
        _ => None,
    }
}
