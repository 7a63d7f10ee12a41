//! SQL text for the structured insert/update/delete/query primitives.

use std::borrow::Cow;

use super::values::{SqlValue, Values};
use super::{ConflictAlgorithm, DbError};

/// Words that must be quoted when used as a table or column name.
const KEYWORDS: &[&str] = &[
    "add", "all", "alter", "and", "as", "autoincrement", "between", "case", "check", "collate",
    "commit", "constraint", "create", "default", "deferrable", "delete", "distinct", "drop",
    "else", "escape", "except", "exists", "foreign", "from", "group", "having", "if", "in",
    "index", "insert", "intersect", "into", "is", "isnull", "join", "limit", "not", "notnull",
    "null", "on", "or", "order", "primary", "references", "select", "set", "table", "then", "to",
    "transaction", "union", "unique", "update", "using", "values", "when", "where",
];

pub(crate) fn escape_name(name: &str) -> Cow<'_, str> {
    if KEYWORDS.contains(&name.to_ascii_lowercase().as_str()) {
        Cow::Owned(format!("\"{name}\""))
    } else {
        Cow::Borrowed(name)
    }
}

/// Filter, projection, sort and paging options for a table query.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryOptions {
    pub distinct: bool,
    pub columns: Option<Vec<String>>,
    pub where_clause: Option<String>,
    pub where_args: Vec<SqlValue>,
    pub group_by: Option<String>,
    pub having: Option<String>,
    pub order_by: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

impl QueryOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn distinct(mut self, distinct: bool) -> Self {
        self.distinct = distinct;
        self
    }

    pub fn columns<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.columns = Some(columns.into_iter().map(Into::into).collect());
        self
    }

    pub fn filter(mut self, where_clause: impl Into<String>, where_args: Vec<SqlValue>) -> Self {
        self.where_clause = Some(where_clause.into());
        self.where_args = where_args;
        self
    }

    pub fn group_by(mut self, group_by: impl Into<String>) -> Self {
        self.group_by = Some(group_by.into());
        self
    }

    pub fn having(mut self, having: impl Into<String>) -> Self {
        self.having = Some(having.into());
        self
    }

    pub fn order_by(mut self, order_by: impl Into<String>) -> Self {
        self.order_by = Some(order_by.into());
        self
    }

    pub fn limit(mut self, limit: i64) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: i64) -> Self {
        self.offset = Some(offset);
        self
    }
}

fn non_empty(clause: &Option<String>) -> Option<&str> {
    clause.as_deref().map(str::trim).filter(|c| !c.is_empty())
}

pub(crate) fn build_query(table: &str, options: &QueryOptions) -> Result<String, DbError> {
    let group_by = non_empty(&options.group_by);
    let having = non_empty(&options.having);
    if group_by.is_none() && having.is_some() {
        return Err(DbError::InvalidQuery(
            "HAVING clauses are only permitted when using a GROUP BY clause".into(),
        ));
    }

    let mut sql = String::from("SELECT ");
    if options.distinct {
        sql.push_str("DISTINCT ");
    }
    match &options.columns {
        Some(columns) if !columns.is_empty() => {
            let names: Vec<Cow<'_, str>> = columns.iter().map(|c| escape_name(c)).collect();
            sql.push_str(&names.join(", "));
        }
        _ => sql.push('*'),
    }
    sql.push_str(" FROM ");
    sql.push_str(&escape_name(table));

    if let Some(clause) = non_empty(&options.where_clause) {
        sql.push_str(" WHERE ");
        sql.push_str(clause);
    }
    if let Some(clause) = group_by {
        sql.push_str(" GROUP BY ");
        sql.push_str(clause);
    }
    if let Some(clause) = having {
        sql.push_str(" HAVING ");
        sql.push_str(clause);
    }
    if let Some(clause) = non_empty(&options.order_by) {
        sql.push_str(" ORDER BY ");
        sql.push_str(clause);
    }
    match (options.limit, options.offset) {
        (Some(limit), Some(offset)) => sql.push_str(&format!(" LIMIT {limit} OFFSET {offset}")),
        (Some(limit), None) => sql.push_str(&format!(" LIMIT {limit}")),
        // SQLite only accepts OFFSET after a LIMIT; -1 means unbounded.
        (None, Some(offset)) => sql.push_str(&format!(" LIMIT -1 OFFSET {offset}")),
        (None, None) => {}
    }
    Ok(sql)
}

pub(crate) fn build_insert(
    table: &str,
    values: &Values,
    conflict: Option<ConflictAlgorithm>,
) -> (String, Vec<SqlValue>) {
    let mut sql = String::from("INSERT");
    if let Some(conflict) = conflict {
        sql.push_str(" OR ");
        sql.push_str(conflict.keyword());
    }
    sql.push_str(" INTO ");
    sql.push_str(&escape_name(table));

    if values.is_empty() {
        sql.push_str(" DEFAULT VALUES");
        return (sql, Vec::new());
    }

    let columns: Vec<Cow<'_, str>> = values.columns().map(escape_name).collect();
    let placeholders = vec!["?"; values.len()].join(", ");
    sql.push_str(&format!(" ({}) VALUES ({placeholders})", columns.join(", ")));
    (sql, values.values().cloned().collect())
}

pub(crate) fn build_update(
    table: &str,
    values: &Values,
    where_clause: Option<&str>,
    where_args: &[SqlValue],
    conflict: Option<ConflictAlgorithm>,
) -> Result<(String, Vec<SqlValue>), DbError> {
    if values.is_empty() {
        return Err(DbError::InvalidQuery(format!(
            "update of {table} requires at least one column value"
        )));
    }

    let mut sql = String::from("UPDATE");
    if let Some(conflict) = conflict {
        sql.push_str(" OR ");
        sql.push_str(conflict.keyword());
    }
    sql.push(' ');
    sql.push_str(&escape_name(table));
    sql.push_str(" SET ");
    let assignments: Vec<String> = values
        .columns()
        .map(|column| format!("{} = ?", escape_name(column)))
        .collect();
    sql.push_str(&assignments.join(", "));

    if let Some(clause) = where_clause.map(str::trim).filter(|c| !c.is_empty()) {
        sql.push_str(" WHERE ");
        sql.push_str(clause);
    }

    let mut args: Vec<SqlValue> = values.values().cloned().collect();
    args.extend_from_slice(where_args);
    Ok((sql, args))
}

pub(crate) fn build_delete(table: &str, where_clause: Option<&str>) -> String {
    let mut sql = format!("DELETE FROM {}", escape_name(table));
    if let Some(clause) = where_clause.map(str::trim).filter(|c| !c.is_empty()) {
        sql.push_str(" WHERE ");
        sql.push_str(clause);
    }
    sql
}
