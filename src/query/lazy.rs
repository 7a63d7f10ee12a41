use std::fmt;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;

use crate::db::{DbError, Executor, QueryOptions, Row, SharedConnection, SqlValue};

/// The parameters a lazy query was bound with. Frozen at observe time.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryBinding {
    Table { table: String, options: QueryOptions },
    Raw { sql: String, args: Vec<SqlValue> },
}

/// A bound read that only touches the store when run.
///
/// Cloning is cheap and every clone runs the same statement against the
/// data current at the time of the call.
#[derive(Clone)]
pub struct LazyQuery {
    binding: Arc<QueryBinding>,
    shared: Arc<SharedConnection>,
}

impl fmt::Debug for LazyQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LazyQuery").field("binding", &self.binding).finish()
    }
}

impl LazyQuery {
    pub(crate) fn new(binding: QueryBinding, shared: Arc<SharedConnection>) -> Self {
        Self {
            binding: Arc::new(binding),
            shared,
        }
    }

    pub fn binding(&self) -> &QueryBinding {
        &self.binding
    }

    /// Execute the query and return its rows.
    ///
    /// Blocks on the connection lock; never call it inside a transaction
    /// action on the same database.
    pub fn run(&self) -> Result<Vec<Row>, DbError> {
        let conn = self.shared.lock();
        let exec = Executor::new(&conn, self.shared.log_statements());
        match self.binding.as_ref() {
            QueryBinding::Table { table, options } => exec.query(table, options),
            QueryBinding::Raw { sql, args } => exec.raw_query(sql, args),
        }
    }

    /// Run on tokio's blocking pool.
    pub async fn run_async(&self) -> Result<Vec<Row>, DbError> {
        let query = self.clone();
        tokio::task::spawn_blocking(move || query.run())
            .await
            .map_err(|e| DbError::Background(e.to_string()))?
    }

    pub fn map_to_list<T, F>(&self, mapper: F) -> Result<Vec<T>, DbError>
    where
        F: FnMut(&Row) -> Result<T, DbError>,
    {
        map_rows(&self.run()?, mapper)
    }

    /// `None` for an empty result, an error for more than one row.
    pub fn map_to_one<T, F>(&self, mapper: F) -> Result<Option<T>, DbError>
    where
        F: FnMut(&Row) -> Result<T, DbError>,
    {
        single_row(&self.run()?, mapper)
    }

    pub fn map_to_one_or_default<T, F>(&self, mapper: F, default: T) -> Result<T, DbError>
    where
        F: FnMut(&Row) -> Result<T, DbError>,
    {
        Ok(self.map_to_one(mapper)?.unwrap_or(default))
    }

    /// Decode every row through serde.
    pub fn deserialize<T: DeserializeOwned>(&self) -> Result<Vec<T>, DbError> {
        self.map_to_list(|row| Ok(serde_json::from_value(JsonValue::Object(row.clone()))?))
    }
}

pub(crate) fn map_rows<T, F>(rows: &[Row], mapper: F) -> Result<Vec<T>, DbError>
where
    F: FnMut(&Row) -> Result<T, DbError>,
{
    rows.iter().map(mapper).collect()
}

pub(crate) fn single_row<T, F>(rows: &[Row], mut mapper: F) -> Result<Option<T>, DbError>
where
    F: FnMut(&Row) -> Result<T, DbError>,
{
    match rows {
        [] => Ok(None),
        [row] => mapper(row).map(Some),
        _ => Err(DbError::TooManyRows(rows.len())),
    }
}
