//! Fixture helpers shared by unit and behaviour tests across the workspace.

use crate::{CacheEntry, CacheFlavor, StaticSchemaMapping};

/// Object class id used for buildings in fixtures.
pub const BUILDING_CLASS: i32 = 26;

/// Object class id used for city furniture in fixtures.
pub const FURNITURE_CLASS: i32 = 21;

/// Schema mapping covering the fixture classes.
#[must_use]
pub fn fixture_schema() -> StaticSchemaMapping {
    StaticSchemaMapping::from_pairs([(BUILDING_CLASS, "building"), (FURNITURE_CLASS, "city_furniture")])
}

/// Entry for the given flavour with a key derived from `seed`.
///
/// Object entries are tagged as buildings, geometry entries as surface
/// geometries rooted at themselves.
#[must_use]
pub fn sample_entry(flavor: CacheFlavor, seed: i64) -> CacheEntry {
    let external_id = format!("{}-{seed}", flavor.table_name());
    match flavor {
        CacheFlavor::Object => {
            CacheEntry::new(external_id, seed, "building").with_object_class(BUILDING_CLASS)
        }
        CacheFlavor::Geometry => CacheEntry::new(external_id, seed, "surface_geometry"),
    }
}

/// `count` distinct entries with keys `1..=count`.
#[must_use]
pub fn sample_entries(flavor: CacheFlavor, count: i64) -> Vec<CacheEntry> {
    (1..=count).map(|seed| sample_entry(flavor, seed)).collect()
}
