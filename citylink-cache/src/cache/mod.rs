//! In-memory identity cache with drain-to-disk overflow.
//!
//! Registrations land in a concurrent map. Once `capacity` first-time
//! registrations have accumulated, one thread drains a share of the map into
//! the [`PartitionedStore`], requested entries first. Entries are written to
//! disk before they leave memory, and disk lookups wait while a drain is
//! running, so a registered id is always found in one of the two tiers.
#![forbid(unsafe_code)]

mod gate;

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use citylink_core::{CacheConfig, CacheEntry, CacheFlavor};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use log::{debug, info};
use thiserror::Error;

use crate::backing::{BackingStoreError, DrainCandidate, PartitionedStore, select_for_drain};
use gate::DrainGate;

/// Errors raised by [`IdentityCache`].
#[derive(Debug, Error)]
pub enum IdentityCacheError {
    /// The backing store failed while draining or looking up entries.
    #[error("identity cache storage failed: {0}")]
    Storage(#[from] BackingStoreError),
    /// The cache has been shut down.
    #[error("identity cache is shut down")]
    Closed,
}

#[derive(Debug)]
struct Slot {
    entry: CacheEntry,
    requested: AtomicBool,
    /// Brought back from disk; the next drain evicts it without a rewrite.
    persisted: bool,
}

impl Slot {
    const fn new(entry: CacheEntry) -> Self {
        Self {
            entry,
            requested: AtomicBool::new(false),
            persisted: false,
        }
    }

    const fn restored(entry: CacheEntry) -> Self {
        Self {
            entry,
            requested: AtomicBool::new(false),
            persisted: true,
        }
    }
}

/// Maps external ids of one flavour to their surrogate keys.
///
/// # Examples
///
/// ```
/// use citylink_cache::IdentityCache;
/// use citylink_core::{BackingLocation, CacheConfig, CacheEntry, CacheFlavor};
///
/// let config = CacheConfig {
///     location: BackingLocation::InMemory,
///     ..CacheConfig::default()
/// };
/// let cache = IdentityCache::new(CacheFlavor::Object, &config)?;
/// assert!(!cache.lookup_and_put(CacheEntry::new("bldg-1", 10, "building"))?);
/// assert!(cache.lookup_and_put(CacheEntry::new("bldg-1", 99, "building"))?);
/// assert_eq!(cache.get("bldg-1")?.map(|entry| entry.surrogate_key), Some(10));
/// # Ok::<(), citylink_cache::IdentityCacheError>(())
/// ```
#[derive(Debug)]
pub struct IdentityCache {
    flavor: CacheFlavor,
    capacity: usize,
    drain_size: usize,
    entries: DashMap<String, Slot>,
    registrations: AtomicUsize,
    backed_by_disk: AtomicBool,
    drains: AtomicUsize,
    gate: DrainGate,
    store: PartitionedStore,
    closed: AtomicBool,
}

impl IdentityCache {
    /// Create an empty cache and its (not yet materialised) backing store.
    ///
    /// # Errors
    /// Returns [`IdentityCacheError::Storage`] when the configuration is
    /// invalid or the spill directory cannot be prepared.
    pub fn new(flavor: CacheFlavor, config: &CacheConfig) -> Result<Self, IdentityCacheError> {
        let store = PartitionedStore::new(flavor, config)?;
        Ok(Self {
            flavor,
            capacity: config.capacity,
            drain_size: config.drain_size(),
            entries: DashMap::new(),
            registrations: AtomicUsize::new(0),
            backed_by_disk: AtomicBool::new(false),
            drains: AtomicUsize::new(0),
            gate: DrainGate::default(),
            store,
            closed: AtomicBool::new(false),
        })
    }

    /// Register `entry` unless its external id is already known.
    ///
    /// The first registration of an id wins; later ones are ignored.
    ///
    /// # Errors
    /// Returns [`IdentityCacheError`] when a triggered drain or a disk lookup
    /// fails, or when the cache is shut down.
    pub fn put(&self, entry: CacheEntry) -> Result<(), IdentityCacheError> {
        self.register(entry).map(|_| ())
    }

    /// Register `entry` if absent and report whether the id was known.
    ///
    /// Of any number of concurrent calls for the same id, exactly one returns
    /// `false`. A hit on disk is brought back into memory.
    ///
    /// # Errors
    /// Returns [`IdentityCacheError`] when a triggered drain or a disk lookup
    /// fails, or when the cache is shut down.
    pub fn lookup_and_put(&self, entry: CacheEntry) -> Result<bool, IdentityCacheError> {
        self.register(entry)
    }

    /// Entry registered for `external_id`, from memory or disk.
    ///
    /// A memory hit marks the entry as requested, which moves it to the front
    /// of the next drain.
    ///
    /// # Errors
    /// Returns [`IdentityCacheError`] when the disk lookup fails or the cache
    /// is shut down.
    pub fn get(&self, external_id: &str) -> Result<Option<CacheEntry>, IdentityCacheError> {
        self.ensure_open()?;
        if let Some(slot) = self.entries.get(external_id) {
            slot.requested.store(true, Ordering::Relaxed);
            return Ok(Some(slot.entry.clone()));
        }
        if self.is_backed_by_disk() {
            return self.disk_lookup(external_id);
        }
        Ok(None)
    }

    /// Flush and close the backing store and drop every in-memory entry.
    ///
    /// Every later call returns [`IdentityCacheError::Closed`].
    ///
    /// # Errors
    /// Returns [`IdentityCacheError::Closed`] when already shut down, or the
    /// backing store's close failure.
    pub fn shutdown(&self) -> Result<(), IdentityCacheError> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Err(IdentityCacheError::Closed);
        }
        self.gate.wait_idle();
        self.entries.clear();
        self.store.close()?;
        debug!("shut down {} cache", self.flavor.table_name());
        Ok(())
    }

    /// Flavour of the ids held by this cache.
    #[must_use]
    pub const fn flavor(&self) -> CacheFlavor {
        self.flavor
    }

    /// Number of entries currently held in memory.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether memory holds no entry.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Whether at least one drain has started. Never resets.
    #[must_use]
    pub fn is_backed_by_disk(&self) -> bool {
        self.backed_by_disk.load(Ordering::SeqCst)
    }

    /// Number of completed drains.
    #[must_use]
    pub fn drain_count(&self) -> usize {
        self.drains.load(Ordering::SeqCst)
    }

    /// The backing store behind this cache.
    #[must_use]
    pub const fn store(&self) -> &PartitionedStore {
        &self.store
    }

    fn ensure_open(&self) -> Result<(), IdentityCacheError> {
        if self.closed.load(Ordering::SeqCst) {
            Err(IdentityCacheError::Closed)
        } else {
            Ok(())
        }
    }

    fn register(&self, entry: CacheEntry) -> Result<bool, IdentityCacheError> {
        self.ensure_open()?;
        loop {
            if self.entries.contains_key(&entry.external_id) {
                return Ok(true);
            }
            let epoch = self.gate.epoch();
            if self.is_backed_by_disk()
                && let Some(persisted) = self.disk_lookup(&entry.external_id)?
            {
                self.entries
                    .entry(persisted.external_id.clone())
                    .or_insert_with(|| Slot::restored(persisted));
                return Ok(true);
            }
            match self.entries.entry(entry.external_id.clone()) {
                Entry::Occupied(_) => return Ok(true),
                Entry::Vacant(vacant) => {
                    // A drain overlapping the disk check may have moved this id.
                    if !self.gate.is_stable_since(epoch) {
                        drop(vacant);
                        self.gate.wait_idle();
                        continue;
                    }
                    vacant.insert(Slot::new(entry));
                    break;
                }
            }
        }
        self.note_registration()?;
        Ok(false)
    }

    fn note_registration(&self) -> Result<(), IdentityCacheError> {
        let seen = self.registrations.fetch_add(1, Ordering::SeqCst) + 1;
        if seen < self.capacity || !self.gate.try_begin() {
            return Ok(());
        }
        let result = if self.registrations.load(Ordering::SeqCst) < self.capacity {
            Ok(())
        } else {
            self.drain()
        };
        self.gate.finish();
        result
    }

    /// Move up to `drain_size` entries to disk. Runs under the drain gate.
    fn drain(&self) -> Result<(), IdentityCacheError> {
        if !self.backed_by_disk.swap(true, Ordering::SeqCst) {
            debug!("{} cache spilling to disk", self.flavor.table_name());
        }
        let candidates = self.drain_candidates();
        let written = self.store.drain_to_db(&candidates, self.drain_size)?;
        for entry in select_for_drain(&candidates, written) {
            self.entries.remove(&entry.external_id);
        }
        self.entries.retain(|_, slot| !slot.persisted);
        let remaining = self.entries.len();
        self.registrations.store(remaining, Ordering::SeqCst);
        let drains = self.drains.fetch_add(1, Ordering::SeqCst) + 1;
        info!(
            "drained {written} {} entries to disk (drain {drains}, {remaining} left in memory)",
            self.flavor.table_name()
        );
        Ok(())
    }

    fn drain_candidates(&self) -> Vec<DrainCandidate> {
        let mut candidates = Vec::with_capacity(self.drain_size);
        for wanted in [true, false] {
            for slot in self.entries.iter() {
                if candidates.len() >= self.drain_size {
                    break;
                }
                if !slot.persisted && slot.requested.load(Ordering::Relaxed) == wanted {
                    candidates.push(DrainCandidate {
                        entry: slot.entry.clone(),
                        requested: wanted,
                    });
                }
            }
        }
        candidates
    }

    fn disk_lookup(&self, external_id: &str) -> Result<Option<CacheEntry>, IdentityCacheError> {
        self.gate.wait_idle();
        Ok(self.store.lookup(external_id)?)
    }
}

/// The object and geometry caches of one import run.
#[derive(Debug)]
pub struct IdentityCaches {
    object: IdentityCache,
    geometry: IdentityCache,
}

impl IdentityCaches {
    /// Create both caches with the same configuration.
    ///
    /// # Errors
    /// Returns [`IdentityCacheError`] when either cache cannot be created.
    pub fn new(config: &CacheConfig) -> Result<Self, IdentityCacheError> {
        Ok(Self {
            object: IdentityCache::new(CacheFlavor::Object, config)?,
            geometry: IdentityCache::new(CacheFlavor::Geometry, config)?,
        })
    }

    /// Cache for `flavor`.
    #[must_use]
    pub const fn get(&self, flavor: CacheFlavor) -> &IdentityCache {
        match flavor {
            CacheFlavor::Object => &self.object,
            CacheFlavor::Geometry => &self.geometry,
        }
    }

    /// Object and feature cache.
    #[must_use]
    pub const fn object(&self) -> &IdentityCache {
        &self.object
    }

    /// Geometry cache.
    #[must_use]
    pub const fn geometry(&self) -> &IdentityCache {
        &self.geometry
    }

    /// Shut both caches down, returning the first failure.
    ///
    /// # Errors
    /// Returns the first [`IdentityCacheError`] raised by either cache.
    pub fn shutdown(&self) -> Result<(), IdentityCacheError> {
        let object = self.object.shutdown();
        let geometry = self.geometry.shutdown();
        object.and(geometry)
    }
}
