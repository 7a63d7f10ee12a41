use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use rusqlite::types::ValueRef;
use serde_json::{Map, Number, Value as JsonValue};

/// A bound SQL argument or column value.
pub type SqlValue = rusqlite::types::Value;

/// One result row: column name → value, in the order SQLite returned them.
pub type Row = Map<String, JsonValue>;

/// Column values for an insert or update, kept in insertion order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Values(Vec<(String, SqlValue)>);

impl Values {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set `column`, replacing any earlier value for it.
    pub fn set(mut self, column: impl Into<String>, value: impl Into<SqlValue>) -> Self {
        self.insert(column, value);
        self
    }

    pub fn insert(&mut self, column: impl Into<String>, value: impl Into<SqlValue>) {
        let column = column.into();
        let value = value.into();
        match self.0.iter_mut().find(|(name, _)| *name == column) {
            Some(slot) => slot.1 = value,
            None => self.0.push((column, value)),
        }
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(|(name, _)| name.as_str())
    }

    pub fn values(&self) -> impl Iterator<Item = &SqlValue> {
        self.0.iter().map(|(_, value)| value)
    }
}

impl<K: Into<String>, V: Into<SqlValue>> FromIterator<(K, V)> for Values {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut values = Values::new();
        for (column, value) in iter {
            values.insert(column, value);
        }
        values
    }
}

/// Build a `Vec<SqlValue>` of statement arguments.
///
/// ```ignore
/// let args = sql_args![1, "alice".to_string()];
/// ```
#[macro_export]
macro_rules! sql_args {
    () => {
        ::std::vec::Vec::<$crate::SqlValue>::new()
    };
    ($($value:expr),+ $(,)?) => {
        ::std::vec![$($crate::SqlValue::from($value)),+]
    };
}

pub(crate) fn read_row(row: &rusqlite::Row<'_>, columns: &[String]) -> rusqlite::Result<Row> {
    let mut out = Map::with_capacity(columns.len());
    for (idx, name) in columns.iter().enumerate() {
        out.insert(name.clone(), to_json(row.get_ref(idx)?));
    }
    Ok(out)
}

fn to_json(value: ValueRef<'_>) -> JsonValue {
    match value {
        ValueRef::Null => JsonValue::Null,
        ValueRef::Integer(i) => JsonValue::from(i),
        ValueRef::Real(f) => Number::from_f64(f).map(JsonValue::Number).unwrap_or(JsonValue::Null),
        ValueRef::Text(bytes) => JsonValue::String(String::from_utf8_lossy(bytes).into_owned()),
        ValueRef::Blob(bytes) => JsonValue::String(STANDARD.encode(bytes)),
    }
}
