//! Facade crate for the citylink identity cache and cross-reference resolver.
//!
//! This crate re-exports the core domain types and exposes the cache,
//! resolver and worker pool crates behind feature flags.

#![forbid(unsafe_code)]

pub use citylink_core::{
    BackingLocation, BasicDirection, CacheConfig, CacheEntry, CacheFlavor, ConfigError,
    DeferredReference, ObjectClassId, PoolConfig, ReferenceKind, ResolverConfig, SchemaMapping,
    StaticSchemaMapping, WorkItemError,
};

#[cfg(feature = "cache")]
pub use citylink_cache::{IdentityCache, IdentityCacheError, IdentityCaches};

#[cfg(feature = "resolver")]
pub use citylink_resolver::{
    CityDatabase, CrossReferenceResolver, ResolutionReport, ResolveError, ResolverPool,
    RunContext, RunOutcome,
};

#[cfg(feature = "resolver")]
pub use citylink_worker::{PoolError, StopSignal};
