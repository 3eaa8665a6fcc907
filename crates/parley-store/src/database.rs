//! Database connection management.
//!
//! The [`Database`] struct owns an r2d2 pool of SQLite connections and
//! guarantees that migrations are run before any other operation. Each call
//! stack checks out its own connection, so a transaction is never shared
//! between concurrent operations; competing writers are serialized by SQLite
//! itself (WAL + busy timeout).

use std::ops::{Deref, DerefMut};
use std::path::{Path, PathBuf};

use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{Connection, Transaction, TransactionBehavior};

use crate::config::StoreConfig;
use crate::error::Result;
use crate::migrations;

/// Pool of connections to one SQLite database file.
pub struct Database {
    path: PathBuf,
    pool: Pool<SqliteConnectionManager>,
}

impl Database {
    /// Open (or create) the database described by `config`.
    ///
    /// At most `config.max_connections` connections are ever open; a caller
    /// that finds them all checked out waits up to `config.connection_timeout`.
    pub fn new(config: &StoreConfig) -> Result<Self> {
        if let Some(parent) = config.db_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        tracing::info!(
            path = %config.db_path.display(),
            max_connections = config.max_connections,
            "opening database"
        );

        let busy_timeout = config.busy_timeout;
        let manager = SqliteConnectionManager::file(&config.db_path).with_init(move |conn| {
            let _mode: String =
                conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
            conn.pragma_update(None, "foreign_keys", "ON")?;
            conn.busy_timeout(busy_timeout)
        });

        let max_size = u32::try_from(config.max_connections.max(1)).unwrap_or(u32::MAX);
        let pool = Pool::builder()
            .max_size(max_size)
            .min_idle(Some(1))
            .connection_timeout(config.connection_timeout)
            .build(manager)?;

        {
            let conn = pool.get()?;
            migrations::run_migrations(&conn)?;
        }

        Ok(Self {
            path: config.db_path.clone(),
            pool,
        })
    }

    /// Open (or create) a database at an explicit path with default settings.
    ///
    /// This is useful for tests and for embedding the store inside custom
    /// directory layouts.
    pub fn open_at(path: &Path) -> Result<Self> {
        Self::new(&StoreConfig::at_path(path))
    }

    /// Check out a connection, waiting for one to free up if the pool is
    /// exhausted.
    pub fn conn(&self) -> Result<PooledConnection> {
        let conn = self.pool.get()?;
        Ok(PooledConnection(conn))
    }

    /// Return the filesystem path of the database.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// A connection checked out of a [`Database`]; returned to the pool on drop.
pub struct PooledConnection(r2d2::PooledConnection<SqliteConnectionManager>);

impl PooledConnection {
    /// Begin a write transaction that takes the database write lock up front.
    pub fn begin(&mut self) -> rusqlite::Result<Transaction<'_>> {
        self.0
            .transaction_with_behavior(TransactionBehavior::Immediate)
    }
}

impl Deref for PooledConnection {
    type Target = Connection;

    fn deref(&self) -> &Connection {
        &self.0
    }
}

impl DerefMut for PooledConnection {
    fn deref_mut(&mut self) -> &mut Connection {
        &mut self.0
    }
}
