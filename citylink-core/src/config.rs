//! Tunables for the identity caches, the resolver and the worker pools.
//!
//! Every struct has a `Default` matching the values used for large city
//! model imports and a `validate` method that rejects settings the runtime
//! cannot honour. Layered loading from files and the environment belongs to
//! the binaries; these types only describe the settled values.

use camino::Utf8PathBuf;
use thiserror::Error;

const DEFAULT_CAPACITY: usize = 200_000;
const DEFAULT_DRAIN_FACTOR: f64 = 0.85;
const DEFAULT_PARTITIONS: usize = 10;
const DEFAULT_BATCH_SIZE: usize = 1000;
const DEFAULT_WORKERS: usize = 4;
const DEFAULT_QUEUE_SIZE: usize = 1000;

/// Errors raised when a configuration value is unusable.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    /// The in-memory capacity was zero.
    #[error("cache capacity must be greater than zero")]
    ZeroCapacity,
    /// The drain factor was outside `(0, 1]` or not finite.
    #[error("drain factor {value} must lie in (0, 1]")]
    DrainFactorOutOfRange {
        /// Rejected drain factor.
        value: f64,
    },
    /// A count that must be positive was zero.
    #[error("{field} must be greater than zero")]
    ZeroCount {
        /// Name of the offending setting.
        field: &'static str,
    },
}

/// Where partition tables spill to once the in-memory cache drains.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum BackingLocation {
    /// A private temporary directory owned by the store for the run.
    #[default]
    TempDir,
    /// One SQLite file per partition inside the given directory.
    Directory(Utf8PathBuf),
    /// One private in-memory database per partition.
    InMemory,
}

/// Settings for one identity cache and its partitioned backing store.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct CacheConfig {
    /// Number of first-time registrations that triggers a drain.
    pub capacity: usize,
    /// Share of `capacity` moved to disk by each drain.
    pub drain_factor: f64,
    /// Number of disk partitions.
    pub partitions: usize,
    /// Rows buffered per partition before a write.
    pub batch_size: usize,
    /// Storage used for spilled entries.
    pub location: BackingLocation,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_CAPACITY,
            drain_factor: DEFAULT_DRAIN_FACTOR,
            partitions: DEFAULT_PARTITIONS,
            batch_size: DEFAULT_BATCH_SIZE,
            location: BackingLocation::default(),
        }
    }
}

impl CacheConfig {
    /// Check that the configuration can drive a cache.
    ///
    /// # Errors
    /// Returns [`ConfigError`] for a zero capacity, partition count or batch
    /// size, or a drain factor outside `(0, 1]`.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.capacity == 0 {
            return Err(ConfigError::ZeroCapacity);
        }
        if !(self.drain_factor.is_finite() && self.drain_factor > 0.0 && self.drain_factor <= 1.0)
        {
            return Err(ConfigError::DrainFactorOutOfRange {
                value: self.drain_factor,
            });
        }
        require_positive(self.partitions, "partitions")?;
        require_positive(self.batch_size, "batch_size")
    }

    /// Number of entries a single drain moves to disk.
    ///
    /// Always at least one so that a drain makes progress.
    #[must_use]
    #[expect(
        clippy::float_arithmetic,
        clippy::cast_precision_loss,
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        reason = "drain size is a rounded share of a bounded capacity"
    )]
    pub fn drain_size(&self) -> usize {
        let share = (self.capacity as f64 * self.drain_factor).round();
        (share as usize).clamp(1, self.capacity.max(1))
    }
}

/// Settings for the cross-reference resolver.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct ResolverConfig {
    /// Patch statements buffered per reference kind before a write.
    pub batch_size: usize,
    /// Directory that relative texture and library URIs resolve against.
    pub base_dir: Utf8PathBuf,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            base_dir: Utf8PathBuf::from("."),
        }
    }
}

impl ResolverConfig {
    /// Check that the configuration can drive a resolver.
    ///
    /// # Errors
    /// Returns [`ConfigError::ZeroCount`] when the batch size is zero.
    pub fn validate(&self) -> Result<(), ConfigError> {
        require_positive(self.batch_size, "batch_size")
    }
}

/// Settings for a fixed-size worker pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct PoolConfig {
    /// Number of worker threads.
    pub workers: usize,
    /// Capacity of the bounded submission queue.
    pub queue_size: usize,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            workers: DEFAULT_WORKERS,
            queue_size: DEFAULT_QUEUE_SIZE,
        }
    }
}

impl PoolConfig {
    /// Check that the pool can start.
    ///
    /// # Errors
    /// Returns [`ConfigError::ZeroCount`] when either value is zero.
    pub fn validate(&self) -> Result<(), ConfigError> {
        require_positive(self.workers, "workers")?;
        require_positive(self.queue_size, "queue_size")
    }
}

const fn require_positive(value: usize, field: &'static str) -> Result<(), ConfigError> {
    if value == 0 {
        Err(ConfigError::ZeroCount { field })
    } else {
        Ok(())
    }
}
