//! Partitioned, disk-backed storage for drained cache entries.
//!
//! Entries are spread over a fixed number of partitions by a deterministic
//! hash of their external id. Each partition is a private `SQLite` database
//! with its own connection, pending batch and lock, so writers to different
//! partitions never contend. Partitions are materialised lazily: partition 0
//! is the template created from the flavour DDL, every other partition
//! replays the template's recorded DDL when it is first touched.
#![forbid(unsafe_code)]

mod error;
mod partition;
mod schema;

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::path::Path;
use std::sync::OnceLock;
use std::sync::atomic::{AtomicBool, Ordering};

use camino::Utf8PathBuf;
use citylink_core::{BackingLocation, CacheConfig, CacheEntry, CacheFlavor};
use log::debug;
use parking_lot::Mutex;
use tempfile::TempDir;

pub use error::BackingStoreError;
use partition::PartitionTable;

/// An entry offered to [`PartitionedStore::drain_to_db`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DrainCandidate {
    /// Entry to persist.
    pub entry: CacheEntry,
    /// Whether the entry was hit by a lookup while in memory.
    pub requested: bool,
}

/// Order in which candidates are drained: requested entries first, each
/// group in its original order, truncated to `count`.
///
/// # Examples
///
/// ```
/// use citylink_cache::backing::{DrainCandidate, select_for_drain};
/// use citylink_core::CacheEntry;
///
/// let candidate = |id: &str, requested| DrainCandidate {
///     entry: CacheEntry::new(id, 1, "building"),
///     requested,
/// };
/// let candidates = [candidate("a", false), candidate("b", true), candidate("c", false)];
/// let order: Vec<_> = select_for_drain(&candidates, 2)
///     .map(|entry| entry.external_id.as_str())
///     .collect();
/// assert_eq!(order, ["b", "a"]);
/// ```
pub fn select_for_drain(
    candidates: &[DrainCandidate],
    count: usize,
) -> impl Iterator<Item = &CacheEntry> {
    let requested = candidates.iter().filter(|candidate| candidate.requested);
    let cold = candidates.iter().filter(|candidate| !candidate.requested);
    requested
        .chain(cold)
        .take(count)
        .map(|candidate| &candidate.entry)
}

/// `path` for error reports, with invalid UTF-8 replaced.
fn lossy_utf8(path: &Path) -> Utf8PathBuf {
    Utf8PathBuf::from(path.to_string_lossy().into_owned())
}

#[derive(Debug)]
enum StoreLocation {
    Directory {
        root: Utf8PathBuf,
        _owned: Option<TempDir>,
    },
    InMemory,
}

impl StoreLocation {
    fn prepare(location: &BackingLocation) -> Result<Self, BackingStoreError> {
        match location {
            BackingLocation::InMemory => Ok(Self::InMemory),
            BackingLocation::Directory(root) => {
                citylink_fs::ensure_dir(root).map_err(|source| BackingStoreError::CreateDir {
                    path: root.clone(),
                    source,
                })?;
                Ok(Self::Directory {
                    root: root.clone(),
                    _owned: None,
                })
            }
            BackingLocation::TempDir => {
                let temp = TempDir::with_prefix("citylink-cache-").map_err(|source| {
                    BackingStoreError::CreateDir {
                        path: lossy_utf8(&std::env::temp_dir()),
                        source,
                    }
                })?;
                let root = Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).map_err(
                    |path| BackingStoreError::CreateDir {
                        path: lossy_utf8(&path),
                        source: std::io::Error::other("temporary directory is not UTF-8"),
                    },
                )?;
                Ok(Self::Directory {
                    root,
                    _owned: Some(temp),
                })
            }
        }
    }

    fn partition_file(&self, flavor: CacheFlavor, index: usize) -> Option<Utf8PathBuf> {
        match self {
            Self::Directory { root, .. } => {
                Some(root.join(format!("{}_{index}.sqlite", flavor.table_name())))
            }
            Self::InMemory => None,
        }
    }
}

/// Disk-backed overflow storage for one identity cache flavour.
#[derive(Debug)]
pub struct PartitionedStore {
    flavor: CacheFlavor,
    batch_size: usize,
    location: Mutex<Option<StoreLocation>>,
    partitions: Vec<OnceLock<Mutex<PartitionTable>>>,
    template_ddl: OnceLock<Vec<String>>,
    materialise: Mutex<()>,
    closed: AtomicBool,
}

impl PartitionedStore {
    /// Prepare a store for `flavor`. No partition is opened until used.
    ///
    /// # Errors
    /// Returns [`BackingStoreError::Config`] for an invalid configuration and
    /// [`BackingStoreError::CreateDir`] when the storage directory cannot be
    /// prepared.
    pub fn new(flavor: CacheFlavor, config: &CacheConfig) -> Result<Self, BackingStoreError> {
        config.validate()?;
        let location = StoreLocation::prepare(&config.location)?;
        Ok(Self {
            flavor,
            batch_size: config.batch_size,
            location: Mutex::new(Some(location)),
            partitions: (0..config.partitions).map(|_| OnceLock::new()).collect(),
            template_ddl: OnceLock::new(),
            materialise: Mutex::new(()),
            closed: AtomicBool::new(false),
        })
    }

    /// Flavour of the entries held by this store.
    #[must_use]
    pub const fn flavor(&self) -> CacheFlavor {
        self.flavor
    }

    /// Number of partitions.
    #[must_use]
    pub fn partition_count(&self) -> usize {
        self.partitions.len()
    }

    /// Number of partitions that have been materialised so far.
    #[must_use]
    pub fn materialised_partitions(&self) -> usize {
        self.partitions
            .iter()
            .filter(|slot| slot.get().is_some())
            .count()
    }

    /// Partition responsible for `external_id`.
    ///
    /// The hash uses fixed keys, so the result is stable for the lifetime of
    /// the process and independent of the store instance.
    #[must_use]
    pub fn partition_for(&self, external_id: &str) -> usize {
        let mut hasher = DefaultHasher::new();
        external_id.hash(&mut hasher);
        let count = u64::try_from(self.partitions.len()).unwrap_or(u64::MAX);
        hasher
            .finish()
            .checked_rem(count)
            .and_then(|slot| usize::try_from(slot).ok())
            .unwrap_or(0)
    }

    /// Persist the first `count` candidates in drain order.
    ///
    /// Rows are appended to their partition's pending batch, which is written
    /// whenever it reaches the batch size; every remaining batch is written
    /// before returning, so all returned rows are visible to [`Self::lookup`].
    ///
    /// # Errors
    /// Returns [`BackingStoreError`] on the first storage failure or when the
    /// store is closed.
    pub fn drain_to_db(
        &self,
        candidates: &[DrainCandidate],
        count: usize,
    ) -> Result<usize, BackingStoreError> {
        self.ensure_open()?;
        let mut written = 0_usize;
        for entry in select_for_drain(candidates, count) {
            let table = self.partition(self.partition_for(&entry.external_id))?;
            table.lock().push(entry.clone(), self.batch_size)?;
            written += 1;
        }
        self.flush()?;
        Ok(written)
    }

    /// Find the persisted entry for `external_id`.
    ///
    /// # Errors
    /// Returns [`BackingStoreError`] when the partition cannot be queried or
    /// the store is closed.
    pub fn lookup(&self, external_id: &str) -> Result<Option<CacheEntry>, BackingStoreError> {
        self.ensure_open()?;
        let table = self.partition(self.partition_for(external_id))?;
        let mut guard = table.lock();
        guard.lookup(external_id)
    }

    /// Write every pending batch.
    ///
    /// # Errors
    /// Returns [`BackingStoreError`] on the first failed write.
    pub fn flush(&self) -> Result<usize, BackingStoreError> {
        let mut written = 0_usize;
        for table in self.partitions.iter().filter_map(OnceLock::get) {
            written += table.lock().flush()?;
        }
        Ok(written)
    }

    /// Flush pending rows and release every partition connection.
    ///
    /// Later calls on the store return [`BackingStoreError::Closed`]. All
    /// partitions are released even when a flush fails; the first failure is
    /// returned.
    ///
    /// # Errors
    /// Returns [`BackingStoreError::Closed`] when already closed, or the first
    /// flush failure.
    pub fn close(&self) -> Result<(), BackingStoreError> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Err(BackingStoreError::Closed);
        }
        let _guard = self.materialise.lock();
        let mut first_error = None;
        for table in self.partitions.iter().filter_map(OnceLock::get) {
            if let Err(err) = table.lock().close() {
                first_error.get_or_insert(err);
            }
        }
        drop(self.location.lock().take());
        debug!("closed {} backing store", self.flavor.table_name());
        first_error.map_or(Ok(()), Err)
    }

    fn ensure_open(&self) -> Result<(), BackingStoreError> {
        if self.closed.load(Ordering::SeqCst) {
            Err(BackingStoreError::Closed)
        } else {
            Ok(())
        }
    }

    /// Partition `index`, materialising it (and the template) on first use.
    fn partition(&self, index: usize) -> Result<&Mutex<PartitionTable>, BackingStoreError> {
        let slot = self
            .partitions
            .get(index)
            .ok_or(BackingStoreError::UnknownPartition {
                index,
                count: self.partitions.len(),
            })?;
        if let Some(table) = slot.get() {
            return Ok(table);
        }
        let _guard = self.materialise.lock();
        self.ensure_open()?;
        let ddl = self.template()?;
        if let Some(table) = slot.get() {
            return Ok(table);
        }
        let mut table = self.open_partition(index)?;
        schema::branch_from_template(table.connection_mut()?, self.flavor, ddl)?;
        debug!(
            "materialised {} partition {index} from template",
            self.flavor.table_name()
        );
        Ok(slot.get_or_init(|| Mutex::new(table)))
    }

    /// Template DDL, materialising partition 0 first if needed.
    ///
    /// Callers hold the materialisation lock.
    fn template(&self) -> Result<&[String], BackingStoreError> {
        if let Some(ddl) = self.template_ddl.get() {
            return Ok(ddl);
        }
        let master = self
            .partitions
            .first()
            .ok_or(BackingStoreError::UnknownPartition { index: 0, count: 0 })?;
        let mut table = self.open_partition(0)?;
        let ddl = schema::create_template(table.connection_mut()?, self.flavor)?;
        debug!("materialised {} template partition", self.flavor.table_name());
        master.get_or_init(|| Mutex::new(table));
        Ok(self.template_ddl.get_or_init(|| ddl))
    }

    fn open_partition(&self, index: usize) -> Result<PartitionTable, BackingStoreError> {
        let guard = self.location.lock();
        let file = guard
            .as_ref()
            .ok_or(BackingStoreError::Closed)?
            .partition_file(self.flavor, index);
        PartitionTable::open(index, self.flavor, file.as_deref())
    }
}

#[cfg(test)]
mod tests;
