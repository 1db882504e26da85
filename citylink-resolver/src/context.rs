//! Explicit per-run context handed to resolver constructors.
#![forbid(unsafe_code)]

use std::fmt;
use std::sync::Arc;

use citylink_cache::IdentityCaches;
use citylink_core::{ResolverConfig, SchemaMapping};
use citylink_worker::StopSignal;

use crate::CityDatabase;

/// Everything a resolver needs for one import run.
///
/// Cloning is cheap; all shared state sits behind `Arc`s.
#[derive(Clone)]
pub struct RunContext {
    caches: Arc<IdentityCaches>,
    database: Arc<CityDatabase>,
    schema: Arc<dyn SchemaMapping>,
    stop: StopSignal,
    config: ResolverConfig,
}

impl RunContext {
    /// Bundle the run's shared state with a fresh stop signal.
    #[must_use]
    pub fn new(
        caches: Arc<IdentityCaches>,
        database: Arc<CityDatabase>,
        schema: Arc<dyn SchemaMapping>,
        config: ResolverConfig,
    ) -> Self {
        Self {
            caches,
            database,
            schema,
            stop: StopSignal::default(),
            config,
        }
    }

    /// Share `stop` with the other pools of the run.
    #[must_use]
    pub fn with_stop_signal(mut self, stop: StopSignal) -> Self {
        self.stop = stop;
        self
    }

    /// Identity caches of the run.
    #[must_use]
    pub fn caches(&self) -> &IdentityCaches {
        &self.caches
    }

    /// Target city database.
    #[must_use]
    pub fn database(&self) -> &CityDatabase {
        &self.database
    }

    /// Object class to table lookup.
    #[must_use]
    pub fn schema(&self) -> &dyn SchemaMapping {
        self.schema.as_ref()
    }

    /// Cancellation flag shared by the run's pools.
    #[must_use]
    pub const fn stop_signal(&self) -> &StopSignal {
        &self.stop
    }

    /// Resolver settings.
    #[must_use]
    pub const fn config(&self) -> &ResolverConfig {
        &self.config
    }
}

impl fmt::Debug for RunContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RunContext")
            .field("caches", &self.caches)
            .field("database", &self.database)
            .field("stop", &self.stop)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
