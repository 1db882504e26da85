//! Replay command implementation for the citylink CLI.

use std::io::Write;
use std::sync::Arc;

use camino::{Utf8Path, Utf8PathBuf};
use citylink_cache::IdentityCaches;
use citylink_core::{BackingLocation, CacheConfig, PoolConfig, ResolverConfig, StaticSchemaMapping};
use citylink_resolver::{CityDatabase, ResolutionReport, ResolverPool, RunContext};
use clap::Parser;
use log::info;
use ortho_config::{OrthoConfig, SubcmdConfigMerge};
use serde::{Deserialize, Serialize};

use crate::events::{ReplayPlan, load_events};
use crate::{
    ARG_REPLAY_BASE_DIR, ARG_REPLAY_BATCH_SIZE, ARG_REPLAY_CACHE_DIR, ARG_REPLAY_CAPACITY,
    ARG_REPLAY_DATABASE, ARG_REPLAY_DRAIN_FACTOR, ARG_REPLAY_EVENTS,
    ARG_REPLAY_FAIL_ON_UNRESOLVED, ARG_REPLAY_PARTITIONS, ARG_REPLAY_QUEUE_SIZE,
    ARG_REPLAY_WORKERS, CliError, ENV_REPLAY_DATABASE, ENV_REPLAY_EVENTS,
};

/// CLI arguments for the `replay` subcommand.
#[derive(Debug, Clone, Parser, Deserialize, Serialize, OrthoConfig, Default)]
#[command(
    long_about = "Register identities and resolve deferred references read \
                 from a JSON lines file, patching the city database. Tunables \
                 can come from CLI flags, configuration files, or environment \
                 variables.",
    about = "Replay registrations and references against a city database"
)]
#[ortho_config(prefix = "CITYLINK")]
pub(crate) struct ReplayArgs {
    /// Path to the JSON lines events file.
    #[arg(value_name = "path")]
    #[serde(default)]
    pub(crate) events: Option<Utf8PathBuf>,
    /// Path to the SQLite city database to patch.
    #[arg(long = ARG_REPLAY_DATABASE, value_name = "path")]
    #[serde(default)]
    pub(crate) database: Option<Utf8PathBuf>,
    /// Directory relative texture and library URIs resolve against.
    /// Defaults to the directory holding the events file.
    #[arg(long = ARG_REPLAY_BASE_DIR, value_name = "dir")]
    #[serde(default)]
    pub(crate) base_dir: Option<Utf8PathBuf>,
    /// Directory for spilled cache partitions. Defaults to a private
    /// temporary directory removed after the run.
    #[arg(long = ARG_REPLAY_CACHE_DIR, value_name = "dir")]
    #[serde(default)]
    pub(crate) cache_dir: Option<Utf8PathBuf>,
    /// Registrations held in memory before a drain.
    #[arg(long = ARG_REPLAY_CAPACITY, value_name = "count")]
    #[serde(default)]
    pub(crate) capacity: Option<usize>,
    /// Share of the capacity moved to disk by each drain.
    #[arg(long = ARG_REPLAY_DRAIN_FACTOR, value_name = "factor")]
    #[serde(default)]
    pub(crate) drain_factor: Option<f64>,
    /// Number of cache partitions on disk.
    #[arg(long = ARG_REPLAY_PARTITIONS, value_name = "count")]
    #[serde(default)]
    pub(crate) partitions: Option<usize>,
    /// Rows buffered per cache partition and statements per patch batch.
    #[arg(long = ARG_REPLAY_BATCH_SIZE, value_name = "count")]
    #[serde(default)]
    pub(crate) batch_size: Option<usize>,
    /// Resolver threads.
    #[arg(long = ARG_REPLAY_WORKERS, value_name = "count")]
    #[serde(default)]
    pub(crate) workers: Option<usize>,
    /// Capacity of the resolver queue.
    #[arg(long = ARG_REPLAY_QUEUE_SIZE, value_name = "count")]
    #[serde(default)]
    pub(crate) queue_size: Option<usize>,
    /// Exit with an error when any reference stays unresolved.
    #[arg(
        long = ARG_REPLAY_FAIL_ON_UNRESOLVED,
        num_args = 0..=1,
        default_missing_value = "true",
        value_name = "bool"
    )]
    #[serde(default)]
    pub(crate) fail_on_unresolved: Option<bool>,
}

impl ReplayArgs {
    pub(crate) fn into_config(self) -> Result<ReplayConfig, CliError> {
        let merged = self.load_and_merge().map_err(CliError::Configuration)?;
        ReplayConfig::try_from(merged)
    }
}

/// Resolved `replay` command configuration.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct ReplayConfig {
    /// Path to the events file.
    pub(crate) events: Utf8PathBuf,
    /// Path to the city database.
    pub(crate) database: Utf8PathBuf,
    /// Settings shared by both identity caches.
    pub(crate) cache: CacheConfig,
    /// Resolver batching and file lookup.
    pub(crate) resolver: ResolverConfig,
    /// Resolver pool sizing.
    pub(crate) pool: PoolConfig,
    /// Whether unresolved references fail the run.
    pub(crate) fail_on_unresolved: bool,
}

impl ReplayConfig {
    pub(crate) fn validate(&self) -> Result<(), CliError> {
        if !self.events.is_file() {
            return Err(CliError::MissingSourceFile {
                field: ARG_REPLAY_EVENTS,
                path: self.events.clone(),
            });
        }
        self.cache.validate()?;
        self.resolver.validate()?;
        self.pool.validate()?;
        Ok(())
    }
}

impl TryFrom<ReplayArgs> for ReplayConfig {
    type Error = CliError;

    fn try_from(args: ReplayArgs) -> Result<Self, Self::Error> {
        let events = args.events.ok_or(CliError::MissingArgument {
            field: ARG_REPLAY_EVENTS,
            env: ENV_REPLAY_EVENTS,
        })?;
        let database = args.database.ok_or(CliError::MissingArgument {
            field: ARG_REPLAY_DATABASE,
            env: ENV_REPLAY_DATABASE,
        })?;

        let cache_defaults = CacheConfig::default();
        let resolver_defaults = ResolverConfig::default();
        let pool_defaults = PoolConfig::default();
        let base_dir = args.base_dir.unwrap_or_else(|| events_dir(&events));
        let location = args
            .cache_dir
            .map_or(BackingLocation::TempDir, BackingLocation::Directory);

        Ok(Self {
            cache: CacheConfig {
                capacity: args.capacity.unwrap_or(cache_defaults.capacity),
                drain_factor: args.drain_factor.unwrap_or(cache_defaults.drain_factor),
                partitions: args.partitions.unwrap_or(cache_defaults.partitions),
                batch_size: args.batch_size.unwrap_or(cache_defaults.batch_size),
                location,
            },
            resolver: ResolverConfig {
                batch_size: args.batch_size.unwrap_or(resolver_defaults.batch_size),
                base_dir,
            },
            pool: PoolConfig {
                workers: args.workers.unwrap_or(pool_defaults.workers),
                queue_size: args.queue_size.unwrap_or(pool_defaults.queue_size),
            },
            fail_on_unresolved: args.fail_on_unresolved.unwrap_or(false),
            events,
            database,
        })
    }
}

fn events_dir(events: &Utf8Path) -> Utf8PathBuf {
    events
        .parent()
        .filter(|parent| !parent.as_str().is_empty())
        .map_or_else(|| Utf8PathBuf::from("."), Utf8Path::to_path_buf)
}

pub(crate) fn run_replay(args: ReplayArgs) -> Result<(), CliError> {
    let mut stdout = std::io::stdout().lock();
    run_replay_with(args, &mut stdout)
}

pub(crate) fn run_replay_with(args: ReplayArgs, writer: &mut dyn Write) -> Result<(), CliError> {
    let config = args.into_config()?;
    config.validate()?;
    let report = execute_replay(&config)?;
    write_summary(writer, &report)?;
    let unresolved = report.total_unresolved();
    if config.fail_on_unresolved && unresolved > 0 {
        return Err(CliError::Unresolved { count: unresolved });
    }
    Ok(())
}

/// Register every identity, then resolve every reference on a pool.
pub(crate) fn execute_replay(config: &ReplayConfig) -> Result<ResolutionReport, CliError> {
    let plan = load_events(&config.events)?;
    let caches = Arc::new(IdentityCaches::new(&config.cache)?);
    let database = Arc::new(CityDatabase::open(&config.database)?);
    let context = RunContext::new(
        Arc::clone(&caches),
        database,
        Arc::new(schema_from(&plan)),
        config.resolver.clone(),
    );

    let ReplayPlan {
        registrations,
        references,
        ..
    } = plan;
    let registered = registrations.len();
    for register in registrations {
        caches.get(register.flavor).put(register.entry)?;
    }
    info!(
        "registered {registered} identities ({} object drains, {} geometry drains)",
        caches.object().drain_count(),
        caches.geometry().drain_count()
    );

    let pool = ResolverPool::start(context, config.pool)?;
    let mut rejected = None;
    for item in references {
        if let Err(err) = pool.submit(item) {
            rejected = Some(err);
            break;
        }
    }
    // `finish` still flushes batched patches and returns the error that
    // stopped the pool.
    let finished = pool.finish();
    let shutdown = caches.shutdown();
    let report = match (finished, rejected) {
        (Err(err), _) | (Ok(_), Some(err)) => return Err(err.into()),
        (Ok(report), None) => report,
    };
    shutdown?;
    Ok(report)
}

fn schema_from(plan: &ReplayPlan) -> StaticSchemaMapping {
    StaticSchemaMapping::from_pairs(
        plan.object_classes
            .iter()
            .map(|(class_id, table)| (*class_id, table.clone())),
    )
}

fn write_summary(writer: &mut dyn Write, report: &ResolutionReport) -> Result<(), CliError> {
    writeln!(writer, "resolved: {}", report.total_resolved()).map_err(CliError::WriteSummary)?;
    for (kind, count) in report.unresolved_by_kind() {
        writeln!(writer, "unresolved {}: {count}", kind.label())
            .map_err(CliError::WriteSummary)?;
    }
    writeln!(writer, "outcome: {}", report.outcome()).map_err(CliError::WriteSummary)
}

#[cfg(test)]
pub(crate) fn config_from_layers_for_test(
    layers: Vec<ortho_config::MergeLayer<'static>>,
) -> Result<ReplayConfig, CliError> {
    let merged = ReplayArgs::merge_from_layers(layers).map_err(CliError::from)?;
    ReplayConfig::try_from(merged)
}
