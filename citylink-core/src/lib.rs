//! Core domain types for citylink.
//!
//! The identity caches, the backing store and the cross-reference resolver
//! all speak in terms of the types defined here: [`CacheEntry`] values
//! registered during an import, [`DeferredReference`] work items produced
//! when a target is not yet known, and the configuration structs that tune
//! the runtime. Constructors return `Result` so that malformed input is
//! rejected where it is produced.

#![forbid(unsafe_code)]

pub mod config;
mod entry;
mod reference;
mod schema;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;

pub use config::{BackingLocation, CacheConfig, ConfigError, PoolConfig, ResolverConfig};
pub use entry::{CacheEntry, CacheFlavor, ObjectClassId};
pub use reference::{
    BasicDirection, BasicRef, DeferredReference, DeprecatedMaterialRef, GroupMemberRef,
    LibraryObjectRef, ReferenceKind, ReferenceTarget, SolidGeometryRef, SurfaceGeometryRef,
    TextureAssociationRef, TextureCoordListRef, TextureFileRef, WorkItemError,
};
pub use schema::{SchemaMapping, StaticSchemaMapping};
