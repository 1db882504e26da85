//! Cross-reference resolution for citylink imports.
//!
//! References whose targets were unknown when the referencing row was
//! written are queued as [`DeferredReference`](citylink_core::DeferredReference)
//! work items. The [`CrossReferenceResolver`] looks each target up in the
//! identity caches (or on disk for texture and library files), turns the hit
//! into a [`PatchStatement`] and writes the statements to the
//! [`CityDatabase`] in per-kind batches. Misses are counted and reported
//! when the resolver closes.
#![forbid(unsafe_code)]

mod context;
mod database;
mod error;
pub mod patch;
mod pool;
mod report;
mod resolver;
mod schema;

pub use context::RunContext;
pub use database::CityDatabase;
pub use error::ResolveError;
pub use patch::{FileContents, PatchStatement};
pub use pool::ResolverPool;
pub use report::{ResolutionReport, RunOutcome};
pub use resolver::CrossReferenceResolver;
pub use schema::initialise_city_schema;

#[cfg(test)]
mod tests;
