//! Command-line interface for replaying identity registrations and deferred
//! references through the citylink resolver.
#![forbid(unsafe_code)]

use clap::{Parser, Subcommand};

mod error;
mod events;
mod replay;

pub use error::CliError;

pub(crate) const ARG_REPLAY_EVENTS: &str = "events";
pub(crate) const ARG_REPLAY_DATABASE: &str = "database";
pub(crate) const ARG_REPLAY_BASE_DIR: &str = "base-dir";
pub(crate) const ARG_REPLAY_CACHE_DIR: &str = "cache-dir";
pub(crate) const ARG_REPLAY_CAPACITY: &str = "capacity";
pub(crate) const ARG_REPLAY_DRAIN_FACTOR: &str = "drain-factor";
pub(crate) const ARG_REPLAY_PARTITIONS: &str = "partitions";
pub(crate) const ARG_REPLAY_BATCH_SIZE: &str = "batch-size";
pub(crate) const ARG_REPLAY_WORKERS: &str = "workers";
pub(crate) const ARG_REPLAY_QUEUE_SIZE: &str = "queue-size";
pub(crate) const ARG_REPLAY_FAIL_ON_UNRESOLVED: &str = "fail-on-unresolved";
pub(crate) const ENV_REPLAY_EVENTS: &str = "CITYLINK_CMDS_REPLAY_EVENTS";
pub(crate) const ENV_REPLAY_DATABASE: &str = "CITYLINK_CMDS_REPLAY_DATABASE";

/// Run the citylink CLI with the current process arguments and environment.
pub fn run() -> Result<(), CliError> {
    let cli = Cli::try_parse().map_err(CliError::ArgumentParsing)?;
    match cli.command {
        Command::Replay(args) => replay::run_replay(args),
    }
}

#[derive(Debug, Parser)]
#[command(
    name = "citylink",
    about = "Identity caching and cross-reference resolution for city model imports",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Replay registrations and references from a JSON lines file.
    Replay(replay::ReplayArgs),
}

#[cfg(test)]
mod tests;
