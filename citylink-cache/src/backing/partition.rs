use camino::Utf8Path;
use citylink_core::{CacheEntry, CacheFlavor};
use log::debug;
use rusqlite::{Connection, OptionalExtension};

use super::{BackingStoreError, schema};

/// One partition table: a private connection plus its pending batch.
#[derive(Debug)]
pub(crate) struct PartitionTable {
    index: usize,
    flavor: CacheFlavor,
    connection: Option<Connection>,
    pending: Vec<CacheEntry>,
    indexed: bool,
}

impl PartitionTable {
    /// Open the connection backing partition `index`.
    pub(crate) fn open(
        index: usize,
        flavor: CacheFlavor,
        file: Option<&Utf8Path>,
    ) -> Result<Self, BackingStoreError> {
        let connection = match file {
            Some(path) => Connection::open(path.as_std_path()),
            None => Connection::open_in_memory(),
        }
        .map_err(|source| BackingStoreError::Open {
            partition: index,
            source,
        })?;
        connection
            .pragma_update(None, "synchronous", "OFF")
            .map_err(|source| BackingStoreError::Sqlite {
                operation: "disable partition sync",
                source,
            })?;
        Ok(Self {
            index,
            flavor,
            connection: Some(connection),
            pending: Vec::new(),
            indexed: false,
        })
    }

    pub(crate) fn connection_mut(&mut self) -> Result<&mut Connection, BackingStoreError> {
        self.connection.as_mut().ok_or(BackingStoreError::Closed)
    }

    /// Queue an entry, writing the batch once it holds `batch_size` rows.
    pub(crate) fn push(
        &mut self,
        entry: CacheEntry,
        batch_size: usize,
    ) -> Result<(), BackingStoreError> {
        if self.connection.is_none() {
            return Err(BackingStoreError::Closed);
        }
        self.pending.push(entry);
        if self.pending.len() >= batch_size {
            self.flush()?;
        }
        Ok(())
    }

    /// Write every pending row. Returns the number written.
    pub(crate) fn flush(&mut self) -> Result<usize, BackingStoreError> {
        if self.pending.is_empty() {
            return Ok(0);
        }
        let connection = self.connection.as_mut().ok_or(BackingStoreError::Closed)?;
        schema::insert_batch(connection, self.flavor, &self.pending)?;
        let written = self.pending.len();
        self.pending.clear();
        debug!(
            "flushed {written} {} rows into partition {}",
            self.flavor.table_name(),
            self.index
        );
        Ok(written)
    }

    pub(crate) fn lookup(
        &mut self,
        external_id: &str,
    ) -> Result<Option<CacheEntry>, BackingStoreError> {
        self.flush()?;
        let flavor = self.flavor;
        let index = self.index;
        let create_index = !self.indexed;
        let connection = self.connection.as_mut().ok_or(BackingStoreError::Closed)?;
        if create_index {
            connection
                .execute(schema::create_index_sql(flavor), [])
                .map_err(|source| BackingStoreError::Sqlite {
                    operation: "index partition table",
                    source,
                })?;
            debug!("indexed {} partition {index}", flavor.table_name());
        }
        let mut statement = connection
            .prepare_cached(schema::lookup_sql(flavor))
            .map_err(|source| BackingStoreError::Sqlite {
                operation: "prepare cache lookup",
                source,
            })?;
        let entry = statement
            .query_row([external_id], |row| schema::entry_from_row(row, external_id))
            .optional()
            .map_err(|source| BackingStoreError::Sqlite {
                operation: "look up cache entry",
                source,
            })?;
        self.indexed = true;
        Ok(entry)
    }

    /// Flush and release the connection. Idempotent.
    pub(crate) fn close(&mut self) -> Result<(), BackingStoreError> {
        if self.connection.is_none() {
            return Ok(());
        }
        let flushed = self.flush();
        self.connection = None;
        self.pending.clear();
        flushed.map(|_| ())
    }
}
