//! The target city database shared by every patch flush.
#![forbid(unsafe_code)]

use camino::{Utf8Path, Utf8PathBuf};
use log::debug;
use parking_lot::{Mutex, MutexGuard};
use rusqlite::{Connection, params_from_iter};

use crate::{PatchStatement, ResolveError, initialise_city_schema};

/// A single `SQLite` connection guarded by a mutex.
#[derive(Debug)]
pub struct CityDatabase {
    path: Option<Utf8PathBuf>,
    connection: Mutex<Connection>,
}

impl CityDatabase {
    /// Open (or create) the database at `path` and ensure the city tables
    /// exist.
    ///
    /// # Errors
    /// Returns [`ResolveError`] when the parent directory, the connection or
    /// the schema cannot be created.
    pub fn open(path: &Utf8Path) -> Result<Self, ResolveError> {
        citylink_fs::ensure_parent_dir(path).map_err(|source| ResolveError::CreateParent {
            path: path.to_path_buf(),
            source,
        })?;
        let mut connection =
            Connection::open(path.as_std_path()).map_err(|source| ResolveError::OpenDatabase {
                path: path.to_path_buf(),
                source,
            })?;
        initialise_city_schema(&mut connection)?;
        Ok(Self {
            path: Some(path.to_path_buf()),
            connection: Mutex::new(connection),
        })
    }

    /// Private in-memory database with the city tables.
    ///
    /// # Errors
    /// Returns [`ResolveError`] when the connection or schema cannot be
    /// created.
    pub fn open_in_memory() -> Result<Self, ResolveError> {
        let mut connection =
            Connection::open_in_memory().map_err(|source| ResolveError::OpenDatabase {
                path: Utf8PathBuf::from(":memory:"),
                source,
            })?;
        initialise_city_schema(&mut connection)?;
        Ok(Self::from_connection(connection))
    }

    /// Wrap an existing connection without touching its schema.
    #[must_use]
    pub fn from_connection(connection: Connection) -> Self {
        Self {
            path: None,
            connection: Mutex::new(connection),
        }
    }

    /// Location on disk, when the database is file backed.
    #[must_use]
    pub fn path(&self) -> Option<&Utf8Path> {
        self.path.as_deref()
    }

    /// Exclusive access to the connection.
    pub fn lock(&self) -> MutexGuard<'_, Connection> {
        self.connection.lock()
    }

    /// Execute `statements` in one transaction. Returns the rows changed.
    ///
    /// # Errors
    /// Returns [`ResolveError::Sqlite`] on the first failing statement; the
    /// transaction is rolled back.
    pub fn apply(&self, statements: &[PatchStatement]) -> Result<usize, ResolveError> {
        if statements.is_empty() {
            return Ok(0);
        }
        let mut connection = self.connection.lock();
        let transaction = connection
            .transaction()
            .map_err(|source| ResolveError::Sqlite {
                operation: "begin patch transaction",
                source,
            })?;
        let mut changed = 0_usize;
        for statement in statements {
            let mut prepared = transaction
                .prepare_cached(&statement.sql)
                .map_err(|source| ResolveError::Sqlite {
                    operation: "prepare patch statement",
                    source,
                })?;
            changed += prepared
                .execute(params_from_iter(statement.params.iter()))
                .map_err(|source| ResolveError::Sqlite {
                    operation: "execute patch statement",
                    source,
                })?;
        }
        transaction
            .commit()
            .map_err(|source| ResolveError::Sqlite {
                operation: "commit patch transaction",
                source,
            })?;
        debug!("applied {} patch statements", statements.len());
        Ok(changed)
    }
}
