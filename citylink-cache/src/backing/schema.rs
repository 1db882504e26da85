//! Partition table layouts for the two cache flavours.
//!
//! Partition 0 is created from the flavour DDL below. Every other partition
//! replays the DDL recorded in partition 0's `sqlite_master`, so the tables
//! are identical even if the template changes.

use citylink_core::{CacheEntry, CacheFlavor};
use rusqlite::{Connection, Row, Statement, Transaction, params};

use super::BackingStoreError;

const OBJECT_TABLE: &str = "CREATE TABLE object_id_cache (
    external_id TEXT NOT NULL,
    surrogate_key INTEGER NOT NULL,
    root_key INTEGER,
    is_reverse INTEGER NOT NULL DEFAULT 0,
    mapping TEXT NOT NULL,
    object_class_id INTEGER
)";

const GEOMETRY_TABLE: &str = "CREATE TABLE geometry_id_cache (
    external_id TEXT NOT NULL,
    surrogate_key INTEGER NOT NULL,
    root_key INTEGER,
    is_reverse INTEGER NOT NULL DEFAULT 0,
    mapping TEXT NOT NULL
)";

pub(crate) const fn create_table_sql(flavor: CacheFlavor) -> &'static str {
    match flavor {
        CacheFlavor::Object => OBJECT_TABLE,
        CacheFlavor::Geometry => GEOMETRY_TABLE,
    }
}

const fn drop_table_sql(flavor: CacheFlavor) -> &'static str {
    match flavor {
        CacheFlavor::Object => "DROP TABLE IF EXISTS object_id_cache",
        CacheFlavor::Geometry => "DROP TABLE IF EXISTS geometry_id_cache",
    }
}

pub(crate) const fn create_index_sql(flavor: CacheFlavor) -> &'static str {
    match flavor {
        CacheFlavor::Object => {
            "CREATE INDEX IF NOT EXISTS idx_object_id_cache_external_id
                ON object_id_cache(external_id)"
        }
        CacheFlavor::Geometry => {
            "CREATE INDEX IF NOT EXISTS idx_geometry_id_cache_external_id
                ON geometry_id_cache(external_id)"
        }
    }
}

const fn insert_sql(flavor: CacheFlavor) -> &'static str {
    match flavor {
        CacheFlavor::Object => {
            "INSERT INTO object_id_cache (
                external_id, surrogate_key, root_key, is_reverse, mapping, object_class_id
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)"
        }
        CacheFlavor::Geometry => {
            "INSERT INTO geometry_id_cache (
                external_id, surrogate_key, root_key, is_reverse, mapping
            ) VALUES (?1, ?2, ?3, ?4, ?5)"
        }
    }
}

pub(crate) const fn lookup_sql(flavor: CacheFlavor) -> &'static str {
    match flavor {
        CacheFlavor::Object => {
            "SELECT surrogate_key, root_key, is_reverse, mapping, object_class_id
                FROM object_id_cache WHERE external_id = ?1 ORDER BY rowid LIMIT 1"
        }
        CacheFlavor::Geometry => {
            "SELECT surrogate_key, root_key, is_reverse, mapping, NULL
                FROM geometry_id_cache WHERE external_id = ?1 ORDER BY rowid LIMIT 1"
        }
    }
}

/// Create the flavour table in the template partition, replacing any table
/// left behind by an earlier run.
pub(crate) fn create_template(
    connection: &mut Connection,
    flavor: CacheFlavor,
) -> Result<Vec<String>, BackingStoreError> {
    let transaction = connection
        .transaction()
        .map_err(|source| BackingStoreError::Sqlite {
            operation: "begin template transaction",
            source,
        })?;
    run_migration_step(&transaction, "drop stale template table", drop_table_sql(flavor))?;
    run_migration_step(&transaction, "create template table", create_table_sql(flavor))?;
    let ddl = read_table_ddl(&transaction, flavor)?;
    transaction
        .commit()
        .map_err(|source| BackingStoreError::Sqlite {
            operation: "commit template transaction",
            source,
        })?;
    Ok(ddl)
}

/// Replay the template DDL inside a fresh partition.
pub(crate) fn branch_from_template(
    connection: &mut Connection,
    flavor: CacheFlavor,
    ddl: &[String],
) -> Result<(), BackingStoreError> {
    let transaction = connection
        .transaction()
        .map_err(|source| BackingStoreError::Sqlite {
            operation: "begin branch transaction",
            source,
        })?;
    run_migration_step(&transaction, "drop stale branch table", drop_table_sql(flavor))?;
    for statement in ddl {
        run_migration_step(&transaction, "replay template table", statement)?;
    }
    transaction
        .commit()
        .map_err(|source| BackingStoreError::Sqlite {
            operation: "commit branch transaction",
            source,
        })
}

fn read_table_ddl(
    transaction: &Transaction<'_>,
    flavor: CacheFlavor,
) -> Result<Vec<String>, BackingStoreError> {
    let mut statement = transaction
        .prepare("SELECT sql FROM sqlite_master WHERE type = 'table' AND name = ?1")
        .map_err(|source| BackingStoreError::Sqlite {
            operation: "prepare template ddl query",
            source,
        })?;
    let rows = statement
        .query_map([flavor.table_name()], |row| row.get::<_, String>(0))
        .map_err(|source| BackingStoreError::Sqlite {
            operation: "query template ddl",
            source,
        })?;
    rows.collect::<Result<Vec<_>, _>>()
        .map_err(|source| BackingStoreError::Sqlite {
            operation: "read template ddl",
            source,
        })
}

fn run_migration_step(
    transaction: &Transaction<'_>,
    operation: &'static str,
    sql: &str,
) -> Result<(), BackingStoreError> {
    transaction
        .execute(sql, [])
        .map(|_| ())
        .map_err(|source| BackingStoreError::Sqlite { operation, source })
}

/// Write the pending entries of one partition in a single transaction.
pub(crate) fn insert_batch(
    connection: &mut Connection,
    flavor: CacheFlavor,
    entries: &[CacheEntry],
) -> Result<(), BackingStoreError> {
    let transaction = connection
        .transaction()
        .map_err(|source| BackingStoreError::Sqlite {
            operation: "begin batch transaction",
            source,
        })?;
    {
        let mut insert = transaction
            .prepare_cached(insert_sql(flavor))
            .map_err(|source| BackingStoreError::Sqlite {
                operation: "prepare cache insert",
                source,
            })?;
        for entry in entries {
            execute_insert(&mut insert, flavor, entry).map_err(|source| {
                BackingStoreError::Sqlite {
                    operation: "insert cache entry",
                    source,
                }
            })?;
        }
    }
    transaction
        .commit()
        .map_err(|source| BackingStoreError::Sqlite {
            operation: "commit batch transaction",
            source,
        })
}

fn execute_insert(
    insert: &mut Statement<'_>,
    flavor: CacheFlavor,
    entry: &CacheEntry,
) -> rusqlite::Result<usize> {
    match flavor {
        CacheFlavor::Object => insert.execute(params![
            entry.external_id,
            entry.surrogate_key,
            entry.root_key,
            entry.is_reverse,
            entry.mapping,
            entry.object_class_id,
        ]),
        CacheFlavor::Geometry => insert.execute(params![
            entry.external_id,
            entry.surrogate_key,
            entry.root_key,
            entry.is_reverse,
            entry.mapping,
        ]),
    }
}

/// Rebuild an entry from a row selected by [`lookup_sql`].
pub(crate) fn entry_from_row(row: &Row<'_>, external_id: &str) -> rusqlite::Result<CacheEntry> {
    Ok(CacheEntry {
        external_id: external_id.to_owned(),
        surrogate_key: row.get(0)?,
        root_key: row.get(1)?,
        is_reverse: row.get(2)?,
        mapping: row.get(3)?,
        object_class_id: row.get(4)?,
    })
}
