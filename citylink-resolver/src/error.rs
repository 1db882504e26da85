//! Error types raised while resolving deferred references.
#![forbid(unsafe_code)]

use camino::Utf8PathBuf;
use citylink_cache::IdentityCacheError;
use citylink_core::ConfigError;
use thiserror::Error;

/// Errors raised by the resolver and the target database.
///
/// An unresolved reference is not an error; these variants all abort the run.
#[derive(Debug, Error)]
pub enum ResolveError {
    /// The resolver configuration was rejected.
    #[error("invalid resolver configuration: {0}")]
    Config(#[from] ConfigError),
    /// An identity cache lookup failed.
    #[error("identity cache lookup failed: {0}")]
    Cache(#[from] IdentityCacheError),
    /// Opening the target database failed.
    #[error("failed to open city database at {path}")]
    OpenDatabase {
        /// Requested database path.
        path: Utf8PathBuf,
        /// Source error from `rusqlite`.
        #[source]
        source: rusqlite::Error,
    },
    /// Creating the parent directory of the target database failed.
    #[error("failed to create parent directory for {path}")]
    CreateParent {
        /// Database path whose parent could not be created.
        path: Utf8PathBuf,
        /// Source error from std I/O.
        #[source]
        source: std::io::Error,
    },
    /// A statement against the target database failed.
    #[error("sqlite error while attempting to {operation}: {source}")]
    Sqlite {
        /// Description of the failed operation.
        operation: &'static str,
        /// Source error from `rusqlite`.
        #[source]
        source: rusqlite::Error,
    },
    /// A referenced texture or library file exists but could not be read.
    #[error("failed to read referenced file {path}")]
    ReadFile {
        /// Resolved file path.
        path: Utf8PathBuf,
        /// Source error from std I/O.
        #[source]
        source: std::io::Error,
    },
    /// The resolver has been closed.
    #[error("resolver is closed")]
    Closed,
}
