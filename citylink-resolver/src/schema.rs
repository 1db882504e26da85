//! Target city database tables patched by the resolver.
#![forbid(unsafe_code)]

use rusqlite::{Connection, Transaction};

use crate::ResolveError;

/// Create the city tables the patch statements write to.
///
/// Every statement uses `IF NOT EXISTS`, so the call is safe against a
/// database populated by an earlier import stage.
///
/// # Examples
/// ```
/// use rusqlite::Connection;
/// use citylink_resolver::initialise_city_schema;
///
/// let mut conn = Connection::open_in_memory().expect("create in-memory database");
/// initialise_city_schema(&mut conn).expect("create city schema");
/// initialise_city_schema(&mut conn).expect("schema creation is idempotent");
///
/// let tables: i64 = conn
///     .query_row(
///         "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table'",
///         [],
///         |row| row.get(0),
///     )
///     .expect("count tables");
/// assert_eq!(tables, 8);
/// ```
pub fn initialise_city_schema(connection: &mut Connection) -> Result<(), ResolveError> {
    let transaction = connection
        .transaction()
        .map_err(|source| ResolveError::Sqlite {
            operation: "begin schema transaction",
            source,
        })?;

    create_feature_tables(&transaction)?;
    create_appearance_tables(&transaction)?;
    create_group_tables(&transaction)?;

    transaction
        .commit()
        .map_err(|source| ResolveError::Sqlite {
            operation: "commit schema transaction",
            source,
        })
}

fn create_feature_tables(transaction: &Transaction<'_>) -> Result<(), ResolveError> {
    run_migration_step(
        transaction,
        "create cityobject",
        "CREATE TABLE IF NOT EXISTS cityobject (
            id INTEGER PRIMARY KEY,
            objectclass_id INTEGER NOT NULL,
            gmlid TEXT
        )",
    )?;
    run_migration_step(
        transaction,
        "create surface_geometry",
        "CREATE TABLE IF NOT EXISTS surface_geometry (
            id INTEGER PRIMARY KEY,
            gmlid TEXT,
            parent_id INTEGER,
            root_id INTEGER,
            is_xlink INTEGER NOT NULL DEFAULT 0,
            is_reverse INTEGER NOT NULL DEFAULT 0,
            geometry BLOB,
            solid_geometry BLOB,
            cityobject_id INTEGER
        )",
    )?;
    run_migration_step(
        transaction,
        "create implicit_geometry",
        "CREATE TABLE IF NOT EXISTS implicit_geometry (
            id INTEGER PRIMARY KEY,
            reference_to_library TEXT,
            library_object BLOB
        )",
    )
}

fn create_appearance_tables(transaction: &Transaction<'_>) -> Result<(), ResolveError> {
    run_migration_step(
        transaction,
        "create tex_image",
        "CREATE TABLE IF NOT EXISTS tex_image (
            id INTEGER PRIMARY KEY,
            tex_image_uri TEXT,
            tex_image_data BLOB,
            tex_mime_type TEXT
        )",
    )?;
    run_migration_step(
        transaction,
        "create surface_data",
        "CREATE TABLE IF NOT EXISTS surface_data (
            id INTEGER PRIMARY KEY,
            gmlid TEXT,
            tex_image_id INTEGER
        )",
    )?;
    run_migration_step(
        transaction,
        "create textureparam",
        "CREATE TABLE IF NOT EXISTS textureparam (
            surface_geometry_id INTEGER NOT NULL,
            is_texture_parametrization INTEGER NOT NULL DEFAULT 0,
            world_to_texture TEXT,
            texture_coordinates TEXT,
            surface_data_id INTEGER NOT NULL
        )",
    )
}

fn create_group_tables(transaction: &Transaction<'_>) -> Result<(), ResolveError> {
    run_migration_step(
        transaction,
        "create cityobjectgroup",
        "CREATE TABLE IF NOT EXISTS cityobjectgroup (
            id INTEGER PRIMARY KEY,
            parent_cityobject_id INTEGER
        )",
    )?;
    run_migration_step(
        transaction,
        "create group_to_cityobject",
        "CREATE TABLE IF NOT EXISTS group_to_cityobject (
            cityobject_id INTEGER NOT NULL,
            cityobjectgroup_id INTEGER NOT NULL,
            role TEXT
        )",
    )
}

fn run_migration_step(
    transaction: &Transaction<'_>,
    operation: &'static str,
    sql: &str,
) -> Result<(), ResolveError> {
    transaction
        .execute(sql, [])
        .map(|_| ())
        .map_err(|source| ResolveError::Sqlite { operation, source })
}
