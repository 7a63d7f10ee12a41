//! Table sets and the trigger events carried by the bus.
//!
//! A [`TableSet`] names the tables a write touched or a query depends on.
//! Routing is intersection based: a listener is woken when its set shares at
//! least one table with the published set.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Immutable set of table names. Cloning is cheap.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TableSet(Arc<BTreeSet<String>>);

impl TableSet {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn single(table: impl Into<String>) -> Self {
        let mut set = BTreeSet::new();
        set.insert(table.into());
        Self(Arc::new(set))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn contains(&self, table: &str) -> bool {
        self.0.contains(table)
    }

    /// True when the two sets share at least one table.
    pub fn intersects(&self, other: &TableSet) -> bool {
        // Walk the smaller set and probe the larger one.
        let (small, large) = if self.len() <= other.len() {
            (self, other)
        } else {
            (other, self)
        };
        small.iter().any(|table| large.contains(table))
    }

    pub fn union(&self, other: &TableSet) -> TableSet {
        if other.is_empty() {
            return self.clone();
        }
        if self.is_empty() {
            return other.clone();
        }
        self.iter().chain(other.iter()).cloned().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &String> {
        self.0.iter()
    }
}

impl<S: Into<String>> FromIterator<S> for TableSet {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self(Arc::new(iter.into_iter().map(Into::into).collect()))
    }
}

impl From<&str> for TableSet {
    fn from(table: &str) -> Self {
        Self::single(table)
    }
}

impl From<String> for TableSet {
    fn from(table: String) -> Self {
        Self::single(table)
    }
}

impl<const N: usize> From<[&str; N]> for TableSet {
    fn from(tables: [&str; N]) -> Self {
        tables.into_iter().collect()
    }
}

impl From<Vec<String>> for TableSet {
    fn from(tables: Vec<String>) -> Self {
        tables.into_iter().collect()
    }
}

impl fmt::Display for TableSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{")?;
        for (idx, table) in self.iter().enumerate() {
            if idx > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{table}")?;
        }
        write!(f, "}}")
    }
}

/// A notice that the tables in `tables` were mutated by one write unit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TriggerEvent {
    pub id: String,
    pub seq: u64,
    pub tables: TableSet,
    pub created_at: DateTime<Utc>,
}
