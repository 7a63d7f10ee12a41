//! Write primitives on [`Database`], plain and notifying.
//!
//! Every method locks the connection for the duration of the statement. The
//! `*_and_trigger` forms publish while still holding that lock, so trigger
//! order on the bus matches write completion order on the connection.

use std::sync::MutexGuard;

use rusqlite::{Connection, TransactionBehavior};

use super::sql_builder::QueryOptions;
use super::values::{Row, SqlValue, Values};
use super::{
    transaction, Batch, ConflictAlgorithm, Database, DbError, Executor, Transaction, INSERT_FAILED,
};
use crate::bus::TableSet;
use crate::query::{LazyQuery, QueryBinding, QueryObservable};

impl Database {
    fn with_executor<T>(
        &self,
        op: impl FnOnce(Executor<'_>) -> Result<T, DbError>,
        publish: impl FnOnce(&T) -> Option<TableSet>,
    ) -> Result<T, DbError> {
        let conn: MutexGuard<'_, Connection> = self.shared.lock();
        let result = op(Executor::new(&conn, self.shared.log_statements()))?;
        if let Some(tables) = publish(&result) {
            self.bus.publish(tables);
        }
        Ok(result)
    }

    // ---------------------------------------------------------------------
    // Plain primitives
    // ---------------------------------------------------------------------

    pub fn execute(&self, sql: &str, args: &[SqlValue]) -> Result<(), DbError> {
        self.with_executor(|exec| exec.execute(sql, args), |_| None)
    }

    pub fn insert(
        &self,
        table: &str,
        values: &Values,
        conflict: Option<ConflictAlgorithm>,
    ) -> Result<i64, DbError> {
        self.with_executor(|exec| exec.insert(table, values, conflict), |_| None)
    }

    pub fn raw_insert(&self, sql: &str, args: &[SqlValue]) -> Result<i64, DbError> {
        self.with_executor(|exec| exec.raw_insert(sql, args), |_| None)
    }

    pub fn update(
        &self,
        table: &str,
        values: &Values,
        where_clause: Option<&str>,
        where_args: &[SqlValue],
        conflict: Option<ConflictAlgorithm>,
    ) -> Result<usize, DbError> {
        self.with_executor(
            |exec| exec.update(table, values, where_clause, where_args, conflict),
            |_| None,
        )
    }

    pub fn raw_update(&self, sql: &str, args: &[SqlValue]) -> Result<usize, DbError> {
        self.with_executor(|exec| exec.raw_update(sql, args), |_| None)
    }

    pub fn delete(
        &self,
        table: &str,
        where_clause: Option<&str>,
        where_args: &[SqlValue],
    ) -> Result<usize, DbError> {
        self.with_executor(|exec| exec.delete(table, where_clause, where_args), |_| None)
    }

    pub fn raw_delete(&self, sql: &str, args: &[SqlValue]) -> Result<usize, DbError> {
        self.with_executor(|exec| exec.raw_delete(sql, args), |_| None)
    }

    pub fn raw_query(&self, sql: &str, args: &[SqlValue]) -> Result<Vec<Row>, DbError> {
        self.with_executor(|exec| exec.raw_query(sql, args), |_| None)
    }

    pub fn query(&self, table: &str, options: &QueryOptions) -> Result<Vec<Row>, DbError> {
        self.with_executor(|exec| exec.query(table, options), |_| None)
    }

    // ---------------------------------------------------------------------
    // Notifying primitives
    // ---------------------------------------------------------------------

    /// Execute `sql` and always notify `tables` once it succeeds.
    pub fn execute_and_trigger(
        &self,
        tables: impl Into<TableSet>,
        sql: &str,
        args: &[SqlValue],
    ) -> Result<(), DbError> {
        let tables: TableSet = tables.into();
        self.with_executor(|exec| exec.execute(sql, args), |_| Some(tables))
    }

    /// Insert and notify `{table}` unless the insert returned [`INSERT_FAILED`].
    pub fn insert_and_trigger(
        &self,
        table: &str,
        values: &Values,
        conflict: Option<ConflictAlgorithm>,
    ) -> Result<i64, DbError> {
        self.with_executor(
            |exec| exec.insert(table, values, conflict),
            |id| inserted(*id).then(|| TableSet::single(table)),
        )
    }

    pub fn raw_insert_and_trigger(
        &self,
        tables: impl Into<TableSet>,
        sql: &str,
        args: &[SqlValue],
    ) -> Result<i64, DbError> {
        let tables: TableSet = tables.into();
        self.with_executor(|exec| exec.raw_insert(sql, args), |id| inserted(*id).then_some(tables))
    }

    /// Update and notify `{table}` when at least one row changed.
    pub fn update_and_trigger(
        &self,
        table: &str,
        values: &Values,
        where_clause: Option<&str>,
        where_args: &[SqlValue],
        conflict: Option<ConflictAlgorithm>,
    ) -> Result<usize, DbError> {
        self.with_executor(
            |exec| exec.update(table, values, where_clause, where_args, conflict),
            |changed| (*changed > 0).then(|| TableSet::single(table)),
        )
    }

    pub fn raw_update_and_trigger(
        &self,
        tables: impl Into<TableSet>,
        sql: &str,
        args: &[SqlValue],
    ) -> Result<usize, DbError> {
        let tables: TableSet = tables.into();
        self.with_executor(
            |exec| exec.raw_update(sql, args),
            |changed| (*changed > 0).then_some(tables),
        )
    }

    /// Delete and notify `{table}` when at least one row was removed.
    pub fn delete_and_trigger(
        &self,
        table: &str,
        where_clause: Option<&str>,
        where_args: &[SqlValue],
    ) -> Result<usize, DbError> {
        self.with_executor(
            |exec| exec.delete(table, where_clause, where_args),
            |changed| (*changed > 0).then(|| TableSet::single(table)),
        )
    }

    pub fn raw_delete_and_trigger(
        &self,
        tables: impl Into<TableSet>,
        sql: &str,
        args: &[SqlValue],
    ) -> Result<usize, DbError> {
        let tables: TableSet = tables.into();
        self.with_executor(
            |exec| exec.raw_delete(sql, args),
            |changed| (*changed > 0).then_some(tables),
        )
    }

    // ---------------------------------------------------------------------
    // Coordinators and observation
    // ---------------------------------------------------------------------

    /// Run `action` inside one deferred transaction; see [`Database::run_transactional`].
    pub fn transaction<T, E, F>(&self, action: F) -> Result<T, E>
    where
        F: FnOnce(&mut Transaction<'_>) -> Result<T, E>,
        E: From<DbError>,
    {
        self.run_transactional(action, false)
    }

    /// Run `action` inside one transaction and publish a single trigger for
    /// every table it touched, after the commit succeeds.
    ///
    /// If `action` fails the transaction rolls back, nothing is published and
    /// the action's own error is returned.
    ///
    /// # Deadlock
    ///
    /// The connection stays locked until this returns. Inside `action`, do all
    /// reads and writes through the [`Transaction`] handle. Calling back into
    /// this `Database` (any write, `transaction`, `batch().commit()`, or running
    /// a [`LazyQuery`]) on the same thread blocks forever.
    pub fn run_transactional<T, E, F>(&self, action: F, exclusive: bool) -> Result<T, E>
    where
        F: FnOnce(&mut Transaction<'_>) -> Result<T, E>,
        E: From<DbError>,
    {
        let behavior = if exclusive {
            TransactionBehavior::Exclusive
        } else {
            TransactionBehavior::Deferred
        };
        transaction::run(&self.shared, &self.bus, behavior, action)
    }

    /// Start queueing a non-atomic batch of writes.
    pub fn batch(&self) -> Batch<'_> {
        Batch::new(self)
    }

    /// Observe a table query. The stream re-delivers the same query every
    /// time `table` changes.
    pub fn observe(&self, table: &str, options: QueryOptions) -> QueryObservable {
        self.observe_binding(
            TableSet::single(table),
            QueryBinding::Table {
                table: table.to_string(),
                options,
            },
        )
    }

    /// Observe a raw query that reads from `tables`.
    pub fn observe_raw(
        &self,
        tables: impl Into<TableSet>,
        sql: &str,
        args: Vec<SqlValue>,
    ) -> QueryObservable {
        self.observe_binding(
            tables.into(),
            QueryBinding::Raw {
                sql: sql.to_string(),
                args,
            },
        )
    }

    fn observe_binding(&self, tables: TableSet, binding: QueryBinding) -> QueryObservable {
        let query = LazyQuery::new(binding, self.shared.clone());
        QueryObservable::new(tables, query, self.bus.clone())
    }
}

fn inserted(id: i64) -> bool {
    id != INSERT_FAILED
}
