use super::sql_builder::QueryOptions;
use super::values::{Row, SqlValue, Values};
use super::{ConflictAlgorithm, Database, DbError, Executor};
use crate::bus::TableSet;

#[derive(Debug, Clone)]
enum Operation {
    Execute { sql: String, args: Vec<SqlValue> },
    Insert {
        table: String,
        values: Values,
        conflict: Option<ConflictAlgorithm>,
    },
    RawInsert { sql: String, args: Vec<SqlValue> },
    Update {
        table: String,
        values: Values,
        where_clause: Option<String>,
        where_args: Vec<SqlValue>,
        conflict: Option<ConflictAlgorithm>,
    },
    RawUpdate { sql: String, args: Vec<SqlValue> },
    Delete {
        table: String,
        where_clause: Option<String>,
        where_args: Vec<SqlValue>,
    },
    RawDelete { sql: String, args: Vec<SqlValue> },
    Query { table: String, options: QueryOptions },
    RawQuery { sql: String, args: Vec<SqlValue> },
}

impl Operation {
    fn apply(&self, exec: &Executor<'_>) -> Result<BatchResult, DbError> {
        Ok(match self {
            Self::Execute { sql, args } => {
                exec.execute(sql, args)?;
                BatchResult::Executed
            }
            Self::Insert {
                table,
                values,
                conflict,
            } => BatchResult::Inserted(exec.insert(table, values, *conflict)?),
            Self::RawInsert { sql, args } => BatchResult::Inserted(exec.raw_insert(sql, args)?),
            Self::Update {
                table,
                values,
                where_clause,
                where_args,
                conflict,
            } => {
                let clause = where_clause.as_deref();
                BatchResult::Changed(exec.update(table, values, clause, where_args, *conflict)?)
            }
            Self::RawUpdate { sql, args } => BatchResult::Changed(exec.raw_update(sql, args)?),
            Self::Delete {
                table,
                where_clause,
                where_args,
            } => BatchResult::Changed(exec.delete(table, where_clause.as_deref(), where_args)?),
            Self::RawDelete { sql, args } => BatchResult::Changed(exec.raw_delete(sql, args)?),
            Self::Query { table, options } => BatchResult::Rows(exec.query(table, options)?),
            Self::RawQuery { sql, args } => BatchResult::Rows(exec.raw_query(sql, args)?),
        })
    }
}

/// Outcome of one queued operation, in queue order.
#[derive(Debug, Clone, PartialEq)]
pub enum BatchResult {
    Executed,
    /// Row id, or [`super::INSERT_FAILED`].
    Inserted(i64),
    /// Rows changed by an update or delete.
    Changed(usize),
    Rows(Vec<Row>),
    /// The operation failed and `continue_on_error` was set.
    Failed(String),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchOptions {
    /// Keep going after a failing operation, recording [`BatchResult::Failed`].
    pub continue_on_error: bool,
    /// Return an empty result list.
    pub no_result: bool,
}

/// Queue of writes sent to the store together on [`Batch::commit`].
///
/// A batch is not atomic: operations applied before a failure stay applied.
/// On a successful commit one trigger is published for the union of all
/// tables tagged by the `*_and_trigger` forms, whatever each operation's
/// row count was.
pub struct Batch<'db> {
    db: &'db Database,
    ops: Vec<(Operation, TableSet)>,
}

impl<'db> Batch<'db> {
    pub(crate) fn new(db: &'db Database) -> Self {
        Self { db, ops: Vec::new() }
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// Union of the tables tagged so far.
    pub fn tables(&self) -> TableSet {
        self.ops
            .iter()
            .fold(TableSet::empty(), |acc, (_, tables)| acc.union(tables))
    }

    fn push(&mut self, op: Operation, tables: TableSet) -> &mut Self {
        self.ops.push((op, tables));
        self
    }

    pub fn execute(&mut self, sql: &str, args: Vec<SqlValue>) -> &mut Self {
        self.execute_and_trigger(TableSet::empty(), sql, args)
    }

    pub fn execute_and_trigger(
        &mut self,
        tables: impl Into<TableSet>,
        sql: &str,
        args: Vec<SqlValue>,
    ) -> &mut Self {
        let op = Operation::Execute {
            sql: sql.to_string(),
            args,
        };
        self.push(op, tables.into())
    }

    pub fn insert(
        &mut self,
        table: &str,
        values: Values,
        conflict: Option<ConflictAlgorithm>,
    ) -> &mut Self {
        self.queue_insert(table, values, conflict, TableSet::empty())
    }

    pub fn insert_and_trigger(
        &mut self,
        table: &str,
        values: Values,
        conflict: Option<ConflictAlgorithm>,
    ) -> &mut Self {
        self.queue_insert(table, values, conflict, TableSet::single(table))
    }

    fn queue_insert(
        &mut self,
        table: &str,
        values: Values,
        conflict: Option<ConflictAlgorithm>,
        tables: TableSet,
    ) -> &mut Self {
        let op = Operation::Insert {
            table: table.to_string(),
            values,
            conflict,
        };
        self.push(op, tables)
    }

    pub fn raw_insert(&mut self, sql: &str, args: Vec<SqlValue>) -> &mut Self {
        self.raw_insert_and_trigger(TableSet::empty(), sql, args)
    }

    pub fn raw_insert_and_trigger(
        &mut self,
        tables: impl Into<TableSet>,
        sql: &str,
        args: Vec<SqlValue>,
    ) -> &mut Self {
        let op = Operation::RawInsert {
            sql: sql.to_string(),
            args,
        };
        self.push(op, tables.into())
    }

    pub fn update(
        &mut self,
        table: &str,
        values: Values,
        where_clause: Option<&str>,
        where_args: Vec<SqlValue>,
        conflict: Option<ConflictAlgorithm>,
    ) -> &mut Self {
        self.queue_update(table, values, where_clause, where_args, conflict, TableSet::empty())
    }

    pub fn update_and_trigger(
        &mut self,
        table: &str,
        values: Values,
        where_clause: Option<&str>,
        where_args: Vec<SqlValue>,
        conflict: Option<ConflictAlgorithm>,
    ) -> &mut Self {
        let tables = TableSet::single(table);
        self.queue_update(table, values, where_clause, where_args, conflict, tables)
    }

    fn queue_update(
        &mut self,
        table: &str,
        values: Values,
        where_clause: Option<&str>,
        where_args: Vec<SqlValue>,
        conflict: Option<ConflictAlgorithm>,
        tables: TableSet,
    ) -> &mut Self {
        let op = Operation::Update {
            table: table.to_string(),
            values,
            where_clause: where_clause.map(str::to_string),
            where_args,
            conflict,
        };
        self.push(op, tables)
    }

    pub fn raw_update(&mut self, sql: &str, args: Vec<SqlValue>) -> &mut Self {
        self.raw_update_and_trigger(TableSet::empty(), sql, args)
    }

    pub fn raw_update_and_trigger(
        &mut self,
        tables: impl Into<TableSet>,
        sql: &str,
        args: Vec<SqlValue>,
    ) -> &mut Self {
        let op = Operation::RawUpdate {
            sql: sql.to_string(),
            args,
        };
        self.push(op, tables.into())
    }

    pub fn delete(
        &mut self,
        table: &str,
        where_clause: Option<&str>,
        where_args: Vec<SqlValue>,
    ) -> &mut Self {
        self.queue_delete(table, where_clause, where_args, TableSet::empty())
    }

    pub fn delete_and_trigger(
        &mut self,
        table: &str,
        where_clause: Option<&str>,
        where_args: Vec<SqlValue>,
    ) -> &mut Self {
        self.queue_delete(table, where_clause, where_args, TableSet::single(table))
    }

    fn queue_delete(
        &mut self,
        table: &str,
        where_clause: Option<&str>,
        where_args: Vec<SqlValue>,
        tables: TableSet,
    ) -> &mut Self {
        let op = Operation::Delete {
            table: table.to_string(),
            where_clause: where_clause.map(str::to_string),
            where_args,
        };
        self.push(op, tables)
    }

    pub fn raw_delete(&mut self, sql: &str, args: Vec<SqlValue>) -> &mut Self {
        self.raw_delete_and_trigger(TableSet::empty(), sql, args)
    }

    pub fn raw_delete_and_trigger(
        &mut self,
        tables: impl Into<TableSet>,
        sql: &str,
        args: Vec<SqlValue>,
    ) -> &mut Self {
        let op = Operation::RawDelete {
            sql: sql.to_string(),
            args,
        };
        self.push(op, tables.into())
    }

    pub fn query(&mut self, table: &str, options: QueryOptions) -> &mut Self {
        let op = Operation::Query {
            table: table.to_string(),
            options,
        };
        self.push(op, TableSet::empty())
    }

    pub fn raw_query(&mut self, sql: &str, args: Vec<SqlValue>) -> &mut Self {
        let op = Operation::RawQuery {
            sql: sql.to_string(),
            args,
        };
        self.push(op, TableSet::empty())
    }

    pub fn commit(self) -> Result<Vec<BatchResult>, DbError> {
        self.commit_with(BatchOptions::default())
    }

    /// Apply every queued operation in order, then publish one trigger.
    ///
    /// Without `continue_on_error` the first failure stops the batch and is
    /// returned as [`DbError::BatchCommit`]; nothing is published.
    pub fn commit_with(self, options: BatchOptions) -> Result<Vec<BatchResult>, DbError> {
        if self.ops.is_empty() {
            return Ok(Vec::new());
        }

        let total = self.ops.len();
        let shared = self.db.shared();
        let conn = shared.lock();
        let exec = Executor::new(&conn, shared.log_statements());

        let mut results = Vec::with_capacity(if options.no_result { 0 } else { total });
        let mut tables = TableSet::empty();
        for (applied, (op, op_tables)) in self.ops.iter().enumerate() {
            match op.apply(&exec) {
                Ok(result) => {
                    if !options.no_result {
                        results.push(result);
                    }
                }
                Err(err) if options.continue_on_error => {
                    tracing::debug!(index = applied, "batch operation failed, continuing: {err}");
                    if !options.no_result {
                        results.push(BatchResult::Failed(err.to_string()));
                    }
                }
                Err(err) => {
                    tracing::warn!(applied, total, "batch commit failed: {err}");
                    return Err(DbError::BatchCommit {
                        applied,
                        total,
                        source: Box::new(err),
                    });
                }
            }
            tables = tables.union(op_tables);
        }

        self.db.bus().publish(tables);
        drop(conn);
        Ok(results)
    }
}
