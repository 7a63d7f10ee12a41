//! Reactive change notification over SQLite.
//!
//! Writes made through a [`Database`] report the tables they touched to a
//! [`TriggerBus`]. Observers subscribe to a table, or to a raw query over a
//! set of tables, and receive a fresh [`LazyQuery`] immediately and again
//! after every write that may have changed their data.
//!
//! # Architecture
//!
//! - `bus`: trigger bus, table sets, trigger events, monitor task
//! - `db`: connection wrapper, write primitives and their notifying forms,
//!   transaction and batch coordinators
//! - `query`: lazy queries, observables and subscription streams
//! - `config`: store configuration from defaults and the environment
//!
//! # Example
//!
//! ```ignore
//! use futures::StreamExt;
//! use sqlwatch_lib::{Database, QueryOptions, QueryStreamExt, Values};
//!
//! let db = Database::open_in_memory()?;
//! db.execute("CREATE TABLE users (id INTEGER PRIMARY KEY, name TEXT)", &[])?;
//!
//! let mut names = db
//!     .observe("users", QueryOptions::new().order_by("name"))
//!     .subscribe()
//!     .map_to_list(|row| Ok(row["name"].to_string()));
//!
//! db.insert_and_trigger("users", &Values::new().set("name", "alice".to_string()), None)?;
//! ```

pub mod bus;
pub mod config;
pub mod db;
pub mod query;

#[cfg(test)]
mod testing;

pub use bus::{TableSet, TriggerBus, TriggerEvent, TriggerMonitor};
pub use config::StoreConfig;
pub use db::{
    Batch, BatchOptions, BatchResult, ConflictAlgorithm, Database, DbError, QueryOptions, Row,
    SqlValue, Transaction, Values, INSERT_FAILED,
};
pub use query::{LazyQuery, QueryBinding, QueryObservable, QueryStreamExt, QuerySubscription};
