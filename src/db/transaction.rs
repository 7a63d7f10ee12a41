use std::collections::BTreeSet;

use rusqlite::TransactionBehavior;

use super::sql_builder::QueryOptions;
use super::values::{Row, SqlValue, Values};
use super::{ConflictAlgorithm, DbError, Executor, SharedConnection, INSERT_FAILED};
use crate::bus::{TableSet, TriggerBus};

/// Scoped handle given to a transaction action.
///
/// It exposes the statement primitives but no way to open another
/// transaction. The `*_and_trigger` forms do not publish; they record the
/// touched tables, and the coordinator publishes their union once after
/// commit.
pub struct Transaction<'c> {
    exec: Executor<'c>,
    touched: BTreeSet<String>,
}

pub(crate) fn run<T, E, F>(
    shared: &SharedConnection,
    bus: &TriggerBus,
    behavior: TransactionBehavior,
    action: F,
) -> Result<T, E>
where
    F: FnOnce(&mut Transaction<'_>) -> Result<T, E>,
    E: From<DbError>,
{
    let mut conn = shared.lock();
    let txn = conn
        .transaction_with_behavior(behavior)
        .map_err(DbError::from)?;

    let mut handle = Transaction {
        exec: Executor::new(&txn, shared.log_statements()),
        touched: BTreeSet::new(),
    };
    let outcome = action(&mut handle);
    let touched: TableSet = std::mem::take(&mut handle.touched).into_iter().collect();
    drop(handle);

    match outcome {
        Ok(value) => {
            txn.commit().map_err(DbError::Commit)?;
            if touched.is_empty() {
                tracing::debug!("transaction committed without touched tables");
            } else {
                bus.publish(touched);
            }
            Ok(value)
        }
        Err(err) => {
            tracing::warn!(tables = %touched, "transaction action failed, rolling back");
            if let Err(rollback) = txn.rollback() {
                tracing::warn!("transaction rollback failed: {rollback}");
            }
            Err(err)
        }
    }
}

impl Transaction<'_> {
    /// Record tables written through the plain primitives.
    pub fn mark_touched(&mut self, tables: impl Into<TableSet>) {
        let tables: TableSet = tables.into();
        self.touched.extend(tables.iter().cloned());
    }

    /// Tables recorded so far.
    pub fn touched(&self) -> TableSet {
        self.touched.iter().cloned().collect()
    }

    pub fn execute(&self, sql: &str, args: &[SqlValue]) -> Result<(), DbError> {
        self.exec.execute(sql, args)
    }

    pub fn insert(
        &self,
        table: &str,
        values: &Values,
        conflict: Option<ConflictAlgorithm>,
    ) -> Result<i64, DbError> {
        self.exec.insert(table, values, conflict)
    }

    pub fn raw_insert(&self, sql: &str, args: &[SqlValue]) -> Result<i64, DbError> {
        self.exec.raw_insert(sql, args)
    }

    pub fn update(
        &self,
        table: &str,
        values: &Values,
        where_clause: Option<&str>,
        where_args: &[SqlValue],
        conflict: Option<ConflictAlgorithm>,
    ) -> Result<usize, DbError> {
        self.exec.update(table, values, where_clause, where_args, conflict)
    }

    pub fn raw_update(&self, sql: &str, args: &[SqlValue]) -> Result<usize, DbError> {
        self.exec.raw_update(sql, args)
    }

    pub fn delete(
        &self,
        table: &str,
        where_clause: Option<&str>,
        where_args: &[SqlValue],
    ) -> Result<usize, DbError> {
        self.exec.delete(table, where_clause, where_args)
    }

    pub fn raw_delete(&self, sql: &str, args: &[SqlValue]) -> Result<usize, DbError> {
        self.exec.raw_delete(sql, args)
    }

    pub fn raw_query(&self, sql: &str, args: &[SqlValue]) -> Result<Vec<Row>, DbError> {
        self.exec.raw_query(sql, args)
    }

    pub fn query(&self, table: &str, options: &QueryOptions) -> Result<Vec<Row>, DbError> {
        self.exec.query(table, options)
    }

    pub fn execute_and_trigger(
        &mut self,
        tables: impl Into<TableSet>,
        sql: &str,
        args: &[SqlValue],
    ) -> Result<(), DbError> {
        self.exec.execute(sql, args)?;
        self.mark_touched(tables);
        Ok(())
    }

    pub fn insert_and_trigger(
        &mut self,
        table: &str,
        values: &Values,
        conflict: Option<ConflictAlgorithm>,
    ) -> Result<i64, DbError> {
        let id = self.exec.insert(table, values, conflict)?;
        if id != INSERT_FAILED {
            self.touched.insert(table.to_string());
        }
        Ok(id)
    }

    pub fn raw_insert_and_trigger(
        &mut self,
        tables: impl Into<TableSet>,
        sql: &str,
        args: &[SqlValue],
    ) -> Result<i64, DbError> {
        let id = self.exec.raw_insert(sql, args)?;
        if id != INSERT_FAILED {
            self.mark_touched(tables);
        }
        Ok(id)
    }

    pub fn update_and_trigger(
        &mut self,
        table: &str,
        values: &Values,
        where_clause: Option<&str>,
        where_args: &[SqlValue],
        conflict: Option<ConflictAlgorithm>,
    ) -> Result<usize, DbError> {
        let changed = self.exec.update(table, values, where_clause, where_args, conflict)?;
        if changed > 0 {
            self.touched.insert(table.to_string());
        }
        Ok(changed)
    }

    pub fn raw_update_and_trigger(
        &mut self,
        tables: impl Into<TableSet>,
        sql: &str,
        args: &[SqlValue],
    ) -> Result<usize, DbError> {
        let changed = self.exec.raw_update(sql, args)?;
        if changed > 0 {
            self.mark_touched(tables);
        }
        Ok(changed)
    }

    pub fn delete_and_trigger(
        &mut self,
        table: &str,
        where_clause: Option<&str>,
        where_args: &[SqlValue],
    ) -> Result<usize, DbError> {
        let changed = self.exec.delete(table, where_clause, where_args)?;
        if changed > 0 {
            self.touched.insert(table.to_string());
        }
        Ok(changed)
    }

    pub fn raw_delete_and_trigger(
        &mut self,
        tables: impl Into<TableSet>,
        sql: &str,
        args: &[SqlValue],
    ) -> Result<usize, DbError> {
        let changed = self.exec.raw_delete(sql, args)?;
        if changed > 0 {
            self.mark_touched(tables);
        }
        Ok(changed)
    }
}
