//! Plain (non-notifying) statement primitives over one SQLite connection.

use rusqlite::{params_from_iter, Connection};

use super::sql_builder::{build_delete, build_insert, build_query, build_update, QueryOptions};
use super::values::{read_row, Row, SqlValue, Values};
use super::{ConflictAlgorithm, DbError, INSERT_FAILED};

/// Borrowed view of a connection (or an open transaction on it).
///
/// Nothing here publishes triggers; the database, transaction and batch
/// layers decide when a write becomes a trigger event.
#[derive(Clone, Copy)]
pub(crate) struct Executor<'c> {
    conn: &'c Connection,
    log_statements: bool,
}

impl<'c> Executor<'c> {
    pub(crate) fn new(conn: &'c Connection, log_statements: bool) -> Self {
        Self {
            conn,
            log_statements,
        }
    }

    fn log(&self, sql: &str, args: &[SqlValue]) {
        if self.log_statements {
            tracing::trace!(sql, args = ?args, "executing statement");
        }
    }

    fn run(&self, sql: &str, args: &[SqlValue]) -> Result<usize, DbError> {
        self.log(sql, args);
        let mut stmt = self.conn.prepare_cached(sql)?;
        Ok(stmt.execute(params_from_iter(args.iter()))?)
    }

    pub(crate) fn execute(&self, sql: &str, args: &[SqlValue]) -> Result<(), DbError> {
        if args.is_empty() {
            // Allows multi-statement scripts such as schema setup.
            self.log(sql, args);
            self.conn.execute_batch(sql)?;
            return Ok(());
        }
        self.run(sql, args)?;
        Ok(())
    }

    /// Returns the new row id, or [`INSERT_FAILED`] when no row was inserted.
    pub(crate) fn raw_insert(&self, sql: &str, args: &[SqlValue]) -> Result<i64, DbError> {
        let changed = self.run(sql, args)?;
        if changed == 0 {
            return Ok(INSERT_FAILED);
        }
        Ok(self.conn.last_insert_rowid())
    }

    pub(crate) fn insert(
        &self,
        table: &str,
        values: &Values,
        conflict: Option<ConflictAlgorithm>,
    ) -> Result<i64, DbError> {
        let (sql, args) = build_insert(table, values, conflict);
        self.raw_insert(&sql, &args)
    }

    pub(crate) fn raw_update(&self, sql: &str, args: &[SqlValue]) -> Result<usize, DbError> {
        self.run(sql, args)
    }

    pub(crate) fn update(
        &self,
        table: &str,
        values: &Values,
        where_clause: Option<&str>,
        where_args: &[SqlValue],
        conflict: Option<ConflictAlgorithm>,
    ) -> Result<usize, DbError> {
        let (sql, args) = build_update(table, values, where_clause, where_args, conflict)?;
        self.run(&sql, &args)
    }

    pub(crate) fn raw_delete(&self, sql: &str, args: &[SqlValue]) -> Result<usize, DbError> {
        self.run(sql, args)
    }

    pub(crate) fn delete(
        &self,
        table: &str,
        where_clause: Option<&str>,
        where_args: &[SqlValue],
    ) -> Result<usize, DbError> {
        let sql = build_delete(table, where_clause);
        self.run(&sql, where_args)
    }

    pub(crate) fn raw_query(&self, sql: &str, args: &[SqlValue]) -> Result<Vec<Row>, DbError> {
        self.log(sql, args);
        let mut stmt = self.conn.prepare_cached(sql)?;
        let columns: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();
        let rows = stmt
            .query_map(params_from_iter(args.iter()), |row| read_row(row, &columns))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub(crate) fn query(&self, table: &str, options: &QueryOptions) -> Result<Vec<Row>, DbError> {
        let sql = build_query(table, options)?;
        self.raw_query(&sql, &options.where_args)
    }
}
