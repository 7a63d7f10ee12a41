// tests/common/mod.rs
//! Common test utilities for the observation integration tests.

#![allow(dead_code)]

use std::path::Path;

use sqlwatch_lib::{Database, SqlValue, StoreConfig, Values};

pub const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS users (
    id    INTEGER PRIMARY KEY,
    name  TEXT NOT NULL UNIQUE
);

CREATE TABLE IF NOT EXISTS orders (
    id       INTEGER PRIMARY KEY,
    user_id  INTEGER NOT NULL REFERENCES users(id),
    total    REAL NOT NULL
);
"#;

pub fn memory_db() -> Database {
    let db = Database::open_in_memory().expect("in-memory DB");
    db.execute(SCHEMA, &[]).expect("schema");
    db
}

pub fn file_db(path: &Path) -> Database {
    let db = Database::open_with(&StoreConfig::file(path)).expect("file DB");
    db.execute(SCHEMA, &[]).expect("schema");
    db
}

pub fn named(name: &str) -> Values {
    Values::new().set("name", name.to_string())
}

pub fn order(user_id: i64, total: f64) -> Values {
    Values::new().set("user_id", user_id).set("total", total)
}

pub fn int(value: i64) -> Vec<SqlValue> {
    vec![SqlValue::Integer(value)]
}
