use camino::Utf8PathBuf;
use citylink_core::ConfigError;
use rusqlite::Error as SqliteError;
use thiserror::Error;

/// Errors raised by [`super::PartitionedStore`].
#[derive(Debug, Error)]
pub enum BackingStoreError {
    /// The store configuration was rejected.
    #[error("invalid backing store configuration: {0}")]
    Config(#[from] ConfigError),
    /// A partition database could not be opened.
    #[error("failed to open partition {partition} database: {source}")]
    Open {
        /// Partition index.
        partition: usize,
        /// Error reported by `SQLite`.
        #[source]
        source: SqliteError,
    },
    /// A statement against a partition failed.
    #[error("sqlite error while attempting to {operation}: {source}")]
    Sqlite {
        /// Operation being performed when the error occurred.
        operation: &'static str,
        /// Error reported by `SQLite`.
        #[source]
        source: SqliteError,
    },
    /// The directory holding partition files could not be prepared.
    #[error("failed to prepare backing directory {path:?}: {source}")]
    CreateDir {
        /// Directory that could not be created.
        path: Utf8PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
    /// A partition index outside the configured range was requested.
    #[error("partition {index} is outside the configured {count} partitions")]
    UnknownPartition {
        /// Requested index.
        index: usize,
        /// Number of configured partitions.
        count: usize,
    },
    /// The store has been closed.
    #[error("backing store is closed")]
    Closed,
}
