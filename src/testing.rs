//! Shared fixtures for unit tests.

use crate::db::{Database, SqlValue, Values};

pub const SCHEMA: &str = r#"
CREATE TABLE users (
    id      INTEGER PRIMARY KEY,
    name    TEXT NOT NULL UNIQUE,
    email   TEXT
);

CREATE TABLE posts (
    id       INTEGER PRIMARY KEY,
    user_id  INTEGER NOT NULL REFERENCES users(id),
    title    TEXT NOT NULL
);
"#;

/// An in-memory database with the `users` / `posts` schema.
pub fn test_db() -> Database {
    let db = Database::open_in_memory().expect("in-memory DB");
    db.execute(SCHEMA, &[]).expect("schema");
    db
}

pub fn user(name: &str) -> Values {
    Values::new()
        .set("name", name.to_string())
        .set("email", format!("{name}@example.com"))
}

pub fn post(user_id: i64, title: &str) -> Values {
    Values::new().set("user_id", user_id).set("title", title.to_string())
}

pub fn id_arg(id: i64) -> Vec<SqlValue> {
    vec![SqlValue::Integer(id)]
}
