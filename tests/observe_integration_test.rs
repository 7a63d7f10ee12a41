// tests/observe_integration_test.rs
//! End-to-end observation tests over the public API.

mod common;

use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use pretty_assertions::assert_eq;
use serde::Deserialize;
use sqlwatch_lib::{DbError, QueryOptions, QueryStreamExt, TableSet};
use tokio::time::timeout;

use common::{file_db, int, memory_db, named, order};

#[derive(Debug, Deserialize, PartialEq)]
struct Total {
    name: String,
    spent: f64,
}

const TOTALS: &str = "SELECT u.name AS name, coalesce(sum(o.total), 0.0) AS spent \
                      FROM users u LEFT JOIN orders o ON o.user_id = u.id \
                      GROUP BY u.id ORDER BY u.name";

#[tokio::test]
async fn joined_view_follows_writes_to_either_table() {
    let db = memory_db();
    let mut totals = db
        .observe_raw(["users", "orders"], TOTALS, vec![])
        .subscribe()
        .map(|query| query.deserialize::<Total>())
        .boxed();

    assert_eq!(totals.next().await.unwrap().unwrap(), vec![]);

    let alice = db.insert_and_trigger("users", &named("alice"), None).unwrap();
    assert_eq!(
        totals.next().await.unwrap().unwrap(),
        vec![Total {
            name: "alice".into(),
            spent: 0.0
        }]
    );

    db.transaction(|txn| {
        txn.insert_and_trigger("orders", &order(alice, 10.0), None)?;
        txn.insert_and_trigger("orders", &order(alice, 2.5), None)?;
        Ok::<_, DbError>(())
    })
    .unwrap();

    assert_eq!(
        totals.next().await.unwrap().unwrap(),
        vec![Total {
            name: "alice".into(),
            spent: 12.5
        }]
    );

    // One coalesced trigger for the transaction, so nothing else is queued.
    assert!(timeout(Duration::from_millis(50), totals.next()).await.is_err());
}

#[tokio::test]
async fn each_listener_progresses_independently() {
    let db = memory_db();
    let observable = db.observe("users", QueryOptions::new());
    let mut fast = observable.subscribe();
    let mut slow = observable.subscribe();

    fast.next().await.unwrap();
    for name in ["a", "b", "c"] {
        db.insert_and_trigger("users", &named(name), None).unwrap();
        fast.next().await.unwrap();
    }

    // The slow listener still has its own initial delivery plus all three.
    let mut delivered = 0;
    while let Some(query) = slow.try_next_now() {
        assert_eq!(query.run().unwrap().len(), 3);
        delivered += 1;
    }
    assert_eq!(delivered, 4);
}

#[tokio::test]
async fn subscriber_task_does_not_block_writer() {
    let db = Arc::new(memory_db());
    let observable = db.observe("users", QueryOptions::new());
    let mut sub = observable.subscribe();
    sub.next().await.unwrap();

    let writer = {
        let db = Arc::clone(&db);
        tokio::task::spawn_blocking(move || {
            for i in 0..100 {
                db.insert_and_trigger("users", &named(&format!("u{i}")), None).unwrap();
            }
        })
    };
    timeout(Duration::from_secs(5), writer).await.unwrap().unwrap();

    let mut seen = 0;
    while let Ok(Some(_)) = timeout(Duration::from_millis(50), sub.next()).await {
        seen += 1;
    }
    assert_eq!(seen, 100);
}

#[tokio::test]
async fn batch_commit_wakes_once_for_tagged_tables() {
    let db = memory_db();
    let mut users = db.observe("users", QueryOptions::new()).subscribe();
    let mut orders = db.observe("orders", QueryOptions::new()).subscribe();
    users.next().await.unwrap();
    orders.next().await.unwrap();

    let mut batch = db.batch();
    batch
        .insert_and_trigger("users", named("alice"), None)
        .insert_and_trigger("users", named("bob"), None)
        .delete_and_trigger("orders", Some("id = ?"), int(1));
    assert_eq!(batch.tables(), TableSet::from(["users", "orders"]));
    batch.commit().unwrap();

    assert_eq!(users.next().await.unwrap().run().unwrap().len(), 2);
    assert!(users.try_next_now().is_none());
    assert!(orders.try_next_now().is_some());
    assert!(orders.try_next_now().is_none());
}

#[tokio::test]
async fn map_to_one_follows_a_single_row() {
    let db = memory_db();
    let id = db.insert("users", &named("alice"), None).unwrap();
    let mut name = db
        .observe("users", QueryOptions::new().filter("id = ?", int(id)))
        .subscribe()
        .map_to_one(|row| Ok(row["name"].as_str().unwrap_or_default().to_string()))
        .boxed_local();

    assert_eq!(name.next().await.unwrap().unwrap(), "alice");

    db.update_and_trigger("users", &named("alicia"), Some("id = ?"), &int(id), None)
        .unwrap();
    assert_eq!(name.next().await.unwrap().unwrap(), "alicia");
}

#[tokio::test]
async fn file_database_reopens_without_replaying_triggers() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("watch.db");
    {
        let db = file_db(&path);
        db.insert_and_trigger("users", &named("alice"), None).unwrap();
    }

    let db = file_db(&path);
    let mut sub = db.observe("users", QueryOptions::new()).subscribe();
    let first = sub.next().await.unwrap();
    assert_eq!(first.run().unwrap().len(), 1);
    assert!(sub.try_next_now().is_none());
}
