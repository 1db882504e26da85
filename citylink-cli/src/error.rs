//! Error types emitted by the citylink CLI.
//!
//! Keep this error type reasonably small; every helper in the crate returns
//! `Result<_, CliError>`.

use std::sync::Arc;

use camino::Utf8PathBuf;
use citylink_cache::IdentityCacheError;
use citylink_core::{ConfigError, WorkItemError};
use citylink_resolver::ResolveError;
use citylink_worker::PoolError;
use thiserror::Error;

/// Errors emitted by the citylink CLI.
#[derive(Debug, Error)]
pub enum CliError {
    /// Provided arguments failed Clap validation.
    #[error(transparent)]
    ArgumentParsing(#[from] clap::Error),
    /// Configuration layering failed (files, env, CLI).
    #[error("failed to load configuration: {0}")]
    Configuration(#[from] Arc<ortho_config::OrthoError>),
    /// A required option is missing after configuration merging.
    #[error("missing {field} (set --{field} or {env})")]
    MissingArgument {
        /// Name of the missing option.
        field: &'static str,
        /// Environment variable that can supply it.
        env: &'static str,
    },
    /// The merged tunables cannot drive a run.
    #[error("invalid configuration: {0}")]
    InvalidConfig(#[from] ConfigError),
    /// A referenced input path does not exist on disk or is not a file.
    #[error("{field} path {path:?} does not exist or is not a file")]
    MissingSourceFile {
        /// Option naming the path.
        field: &'static str,
        /// Offending path.
        path: Utf8PathBuf,
    },
    /// Opening the events file failed.
    #[error("failed to open events file at {path:?}: {source}")]
    OpenEvents {
        /// Events file path.
        path: Utf8PathBuf,
        /// Underlying IO error.
        #[source]
        source: std::io::Error,
    },
    /// Reading a line from the events file failed.
    #[error("failed to read line {line} of {path:?}: {source}")]
    ReadEvents {
        /// Events file path.
        path: Utf8PathBuf,
        /// One-based line number.
        line: usize,
        /// Underlying IO error.
        #[source]
        source: std::io::Error,
    },
    /// A line did not decode as a replay event.
    #[error("failed to parse event on line {line} of {path:?}: {source}")]
    ParseEvent {
        /// Events file path.
        path: Utf8PathBuf,
        /// One-based line number.
        line: usize,
        /// Decoder error.
        #[source]
        source: serde_json::Error,
    },
    /// A reference event could not be turned into a work item.
    #[error("invalid reference on line {line} of {path:?}: {source}")]
    InvalidReference {
        /// Events file path.
        path: Utf8PathBuf,
        /// One-based line number.
        line: usize,
        /// Validation failure.
        #[source]
        source: WorkItemError,
    },
    /// Creating, filling or shutting down the identity caches failed.
    #[error(transparent)]
    Cache(#[from] IdentityCacheError),
    /// Opening the city database failed.
    #[error(transparent)]
    OpenDatabase(#[from] ResolveError),
    /// The resolver pool failed.
    #[error("resolution failed: {0}")]
    Resolve(#[from] PoolError<ResolveError>),
    /// Writing the run summary failed.
    #[error("failed to write replay summary: {0}")]
    WriteSummary(#[source] std::io::Error),
    /// References stayed unresolved and the run was asked to fail on them.
    #[error("{count} references were left unresolved")]
    Unresolved {
        /// Number of unresolved references.
        count: usize,
    },
}
