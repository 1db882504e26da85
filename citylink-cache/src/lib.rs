//! Identity caches for citylink imports.
//!
//! [`IdentityCache`] maps external ids to surrogate keys for one flavour
//! (objects or geometries). When the in-memory map fills up, a share of it
//! is drained into a [`PartitionedStore`] of private `SQLite` tables, so a
//! run can register more ids than fit in memory while lookups still see
//! every registration.
#![forbid(unsafe_code)]

pub mod backing;
mod cache;

pub use backing::{BackingStoreError, DrainCandidate, PartitionedStore, select_for_drain};
pub use cache::{IdentityCache, IdentityCacheError, IdentityCaches};
