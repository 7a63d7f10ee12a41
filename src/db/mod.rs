mod batch;
mod executor;
mod sql_builder;
mod transaction;
mod triggers;
mod values;


use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use rusqlite::Connection;
use thiserror::Error;

use crate::bus::TriggerBus;
use crate::config::StoreConfig;

pub use batch::{Batch, BatchOptions, BatchResult};
pub(crate) use executor::Executor;
pub use sql_builder::QueryOptions;
pub use transaction::Transaction;
pub use values::{Row, SqlValue, Values};

/// Row id returned by an insert that did not insert a row.
///
/// A row inserted with an explicit rowid of `-1` reports the same value, so
/// the notifying insert forms treat it as a failed insert and stay silent.
/// Use `execute_and_trigger` when such rowids are expected.
pub const INSERT_FAILED: i64 = -1;

#[derive(Debug, Error)]
pub enum DbError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("transaction commit failed: {0}")]
    Commit(#[source] rusqlite::Error),
    #[error("batch commit failed after {applied} of {total} operations: {source}")]
    BatchCommit {
        applied: usize,
        total: usize,
        source: Box<DbError>,
    },
    #[error("invalid query: {0}")]
    InvalidQuery(String),
    #[error("expected at most one row, got {0}")]
    TooManyRows(usize),
    #[error("row decode failed: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("background query failed: {0}")]
    Background(String),
    #[error("invalid configuration: {0}")]
    Config(String),
}

/// How an insert or update resolves a constraint conflict.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictAlgorithm {
    Rollback,
    Abort,
    Fail,
    Ignore,
    Replace,
}

impl ConflictAlgorithm {
    pub(crate) fn keyword(self) -> &'static str {
        match self {
            Self::Rollback => "ROLLBACK",
            Self::Abort => "ABORT",
            Self::Fail => "FAIL",
            Self::Ignore => "IGNORE",
            Self::Replace => "REPLACE",
        }
    }
}

/// The connection plus the settings every executor over it needs.
pub(crate) struct SharedConnection {
    conn: Mutex<Connection>,
    log_statements: bool,
}

impl SharedConnection {
    /// Acquire exclusive use of the connection.
    ///
    /// Not re-entrant: locking again on the same thread while a guard (or a
    /// [`Transaction`]) is alive deadlocks.
    pub(crate) fn lock(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|poisoned| {
            tracing::warn!("database mutex poisoned, recovering connection");
            poisoned.into_inner()
        })
    }

    pub(crate) fn log_statements(&self) -> bool {
        self.log_statements
    }
}

/// A SQLite connection whose writes notify table observers.
///
/// Plain write methods (`insert`, `update`, ...) never notify. The
/// `*_and_trigger` forms publish the touched tables on the shared
/// [`TriggerBus`] once the write has taken effect.
pub struct Database {
    shared: Arc<SharedConnection>,
    bus: Arc<TriggerBus>,
}

impl Database {
    /// Open (or create) a database file at `path` with default settings.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, DbError> {
        Self::open_with(&StoreConfig::file(path.as_ref()))
    }

    pub fn open_in_memory() -> Result<Self, DbError> {
        Self::open_with(&StoreConfig::in_memory())
    }

    pub fn open_with(config: &StoreConfig) -> Result<Self, DbError> {
        let conn = match &config.path {
            Some(path) => Connection::open(path)?,
            None => Connection::open_in_memory()?,
        };
        let bus = Arc::new(TriggerBus::with_tap_capacity(config.tap_capacity));
        Self::init(conn, bus, config)
    }

    /// Wrap an already-open connection, publishing on an existing bus.
    pub fn from_connection(
        conn: Connection,
        bus: Arc<TriggerBus>,
        config: &StoreConfig,
    ) -> Result<Self, DbError> {
        Self::init(conn, bus, config)
    }

    fn init(conn: Connection, bus: Arc<TriggerBus>, config: &StoreConfig) -> Result<Self, DbError> {
        if config.path.is_some() {
            conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        }
        conn.pragma_update(None, "foreign_keys", config.foreign_keys)?;
        conn.busy_timeout(config.busy_timeout)?;
        tracing::debug!(
            path = ?config.path,
            foreign_keys = config.foreign_keys,
            "database opened"
        );
        Ok(Self {
            shared: Arc::new(SharedConnection {
                conn: Mutex::new(conn),
                log_statements: config.log_statements,
            }),
            bus,
        })
    }

    pub fn bus(&self) -> &Arc<TriggerBus> {
        &self.bus
    }

    pub(crate) fn shared(&self) -> &Arc<SharedConnection> {
        &self.shared
    }
}
