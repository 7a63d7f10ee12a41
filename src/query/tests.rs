use futures::StreamExt;
use pretty_assertions::assert_eq;
use serde::Deserialize;
use tokio_test::{assert_pending, assert_ready, task};

use super::{QueryBinding, QueryStreamExt};
use crate::db::{DbError, QueryOptions, SqlValue, Values};
use crate::testing::{id_arg, test_db, user};

#[derive(Debug, Deserialize, PartialEq)]
struct User {
    id: i64,
    name: String,
}

fn name_of(row: &crate::db::Row) -> Result<String, DbError> {
    Ok(row["name"].as_str().unwrap_or_default().to_string())
}

#[test]
fn first_delivery_is_immediate_and_lazy() {
    let db = test_db();
    let observable = db.observe("users", QueryOptions::new());
    let mut sub = observable.subscribe();

    let first = sub.try_next_now().expect("initial query");
    assert!(sub.try_next_now().is_none());

    // Creating the query did not read; running it sees later writes.
    db.insert("users", &user("alice"), None).unwrap();
    assert_eq!(first.run().unwrap().len(), 1);
}

#[test]
fn binding_is_frozen_at_observe_time() {
    let db = test_db();
    let options = QueryOptions::new().filter("name = ?", vec![SqlValue::Text("bob".into())]);
    let observable = db.observe("users", options.clone());
    let query = observable.subscribe().try_next_now().unwrap();

    assert_eq!(
        query.binding(),
        &QueryBinding::Table {
            table: "users".into(),
            options,
        }
    );
}

#[test]
fn scenario_insert_update_unmatched_delete() {
    let db = test_db();
    let mut sub = db.observe("users", QueryOptions::new()).subscribe();
    assert!(sub.try_next_now().is_some());

    let id = db.insert_and_trigger("users", &user("alice"), None).unwrap();
    assert_eq!(id, 1);
    assert!(sub.try_next_now().is_some());

    let email = Values::new().set("email", "a@b.c".to_string());
    assert_eq!(
        db.update_and_trigger("users", &email, Some("id = ?"), &id_arg(1), None)
            .unwrap(),
        1
    );
    assert!(sub.try_next_now().is_some());

    assert_eq!(db.delete_and_trigger("users", Some("id = ?"), &id_arg(999)).unwrap(), 0);
    assert!(sub.try_next_now().is_none());
}

#[test]
fn unrelated_tables_do_not_wake_subscription() {
    let db = test_db();
    let mut sub = db.observe("users", QueryOptions::new()).subscribe();
    sub.try_next_now();

    db.execute_and_trigger("posts", "DELETE FROM posts", &[]).unwrap();
    assert!(sub.try_next_now().is_none());
}

#[test]
fn raw_observation_routes_on_any_declared_table() {
    let db = test_db();
    let observable = db.observe_raw(
        ["users", "posts"],
        "SELECT u.name, count(p.id) AS posts FROM users u \
         LEFT JOIN posts p ON p.user_id = u.id GROUP BY u.id",
        vec![],
    );
    let mut sub = observable.subscribe();
    sub.try_next_now();

    let uid = db.insert_and_trigger("users", &user("alice"), None).unwrap();
    let query = sub.try_next_now().expect("users trigger");

    db.insert_and_trigger("posts", &crate::testing::post(uid, "hi"), None).unwrap();
    assert!(sub.try_next_now().is_some());

    let rows = query.run().unwrap();
    assert_eq!(rows[0]["posts"], 1);
}

#[test]
fn independent_listeners_each_get_their_own_sequence() {
    let db = test_db();
    let observable = db.observe("users", QueryOptions::new());
    let mut subs: Vec<_> = (0..3).map(|_| observable.subscribe()).collect();

    for sub in subs.iter_mut() {
        assert!(sub.try_next_now().is_some());
    }

    db.insert_and_trigger("users", &user("alice"), None).unwrap();

    for sub in subs.iter_mut() {
        assert!(sub.try_next_now().is_some());
        assert!(sub.try_next_now().is_none());
    }

    // A late listener gets its own first delivery but no replay.
    let mut late = observable.subscribe();
    assert!(late.try_next_now().is_some());
    assert!(late.try_next_now().is_none());
}

#[test]
fn unsubscribe_is_idempotent_and_drops_queued_deliveries() {
    let db = test_db();
    let mut sub = db.observe("users", QueryOptions::new()).subscribe();
    db.insert_and_trigger("users", &user("alice"), None).unwrap();
    assert_eq!(db.bus().listener_count(), 1);

    sub.unsubscribe();
    sub.unsubscribe();

    assert!(sub.is_unsubscribed());
    assert_eq!(db.bus().listener_count(), 0);
    assert!(sub.try_next_now().is_none());

    db.insert_and_trigger("users", &user("bob"), None).unwrap();
    assert!(sub.try_next_now().is_none());
}

#[test]
fn dropped_subscription_unregisters() {
    let db = test_db();
    let observable = db.observe("users", QueryOptions::new());
    drop(observable.subscribe());
    assert_eq!(db.bus().listener_count(), 0);
}

#[tokio::test]
async fn stream_yields_initial_then_one_per_trigger() {
    let db = test_db();
    let mut sub = db.observe("users", QueryOptions::new()).subscribe();

    let first = sub.next().await.unwrap();
    assert!(first.run().unwrap().is_empty());

    db.insert_and_trigger("users", &user("alice"), None).unwrap();
    let second = sub.next().await.unwrap();
    assert_eq!(second.run_async().await.unwrap().len(), 1);

    sub.unsubscribe();
    assert!(sub.next().await.is_none());
}

#[test]
fn stream_is_pending_until_a_trigger_arrives() {
    let db = test_db();
    let mut sub = task::spawn(db.observe("users", QueryOptions::new()).subscribe());

    assert_ready!(sub.poll_next());
    assert_pending!(sub.poll_next());

    db.insert_and_trigger("users", &user("alice"), None).unwrap();
    assert!(sub.is_woken());
    assert!(assert_ready!(sub.poll_next()).is_some());
}

#[tokio::test]
async fn map_to_list_tracks_current_rows() {
    let db = test_db();
    let mut names = db
        .observe("users", QueryOptions::new().order_by("name"))
        .subscribe()
        .map_to_list(name_of)
        .boxed_local();

    assert_eq!(names.next().await.unwrap().unwrap(), Vec::<String>::new());

    db.transaction(|txn| {
        txn.insert_and_trigger("users", &user("bob"), None)?;
        txn.insert_and_trigger("users", &user("alice"), None)?;
        Ok::<_, DbError>(())
    })
    .unwrap();

    assert_eq!(names.next().await.unwrap().unwrap(), vec!["alice", "bob"]);
}

#[tokio::test]
async fn map_to_one_skips_empty_results() {
    let db = test_db();
    let mut one = db
        .observe("users", QueryOptions::new().filter("id = ?", id_arg(1)))
        .subscribe()
        .map_to_one(name_of)
        .boxed_local();

    db.insert_and_trigger("users", &user("alice"), None).unwrap();

    // The empty initial result was skipped.
    assert_eq!(one.next().await.unwrap().unwrap(), "alice");
}

#[tokio::test]
async fn map_to_one_or_default_and_too_many_rows() {
    let db = test_db();
    let observable = db.observe("users", QueryOptions::new());

    let mut defaulted = observable
        .subscribe()
        .map_to_one_or_default(name_of, "nobody".to_string())
        .boxed_local();
    assert_eq!(defaulted.next().await.unwrap().unwrap(), "nobody");

    db.insert("users", &user("alice"), None).unwrap();
    db.insert("users", &user("bob"), None).unwrap();
    let query = observable.subscribe().next().await.unwrap();
    assert!(matches!(query.map_to_one(name_of), Err(DbError::TooManyRows(2))));
}

#[test]
fn deserialize_decodes_rows() {
    let db = test_db();
    db.insert("users", &user("alice"), None).unwrap();
    let query = db
        .observe_raw("users", "SELECT id, name FROM users", vec![])
        .subscribe()
        .try_next_now()
        .unwrap();

    let users: Vec<User> = query.deserialize().unwrap();
    assert_eq!(
        users,
        vec![User {
            id: 1,
            name: "alice".into()
        }]
    );
}

#[test]
fn failing_pull_surfaces_to_the_caller() {
    let db = test_db();
    let query = db
        .observe("users", QueryOptions::new())
        .subscribe()
        .try_next_now()
        .unwrap();

    db.execute("DROP TABLE posts; DROP TABLE users;", &[]).unwrap();
    assert!(matches!(query.run(), Err(DbError::Sqlite(_))));
}

#[test]
fn blocking_consumer_receives_from_writer_thread() {
    let db = std::sync::Arc::new(test_db());
    let mut sub = db.observe("users", QueryOptions::new()).subscribe();
    assert!(sub.blocking_next().is_some());

    let writer = {
        let db = std::sync::Arc::clone(&db);
        std::thread::spawn(move || {
            for name in ["a", "b", "c"] {
                db.insert_and_trigger("users", &user(name), None).unwrap();
            }
        })
    };

    for _ in 0..3 {
        assert!(sub.blocking_next().is_some());
    }
    writer.join().unwrap();
    assert!(sub.try_next_now().is_none());
}

#[tokio::test]
async fn mapped_stream_leaves_runtime_free_while_writer_holds_connection() {
    let db = std::sync::Arc::new(test_db());
    let mut names = db
        .observe("users", QueryOptions::new())
        .subscribe()
        .map_to_list(name_of)
        .boxed_local();

    let (locked_tx, locked_rx) = std::sync::mpsc::channel();
    let (release_tx, release_rx) = std::sync::mpsc::channel::<()>();
    let writer = {
        let db = std::sync::Arc::clone(&db);
        std::thread::spawn(move || {
            db.transaction(|txn| {
                txn.insert_and_trigger("users", &user("alice"), None)?;
                locked_tx.send(()).unwrap();
                release_rx.recv().unwrap();
                Ok::<_, DbError>(())
            })
        })
    };
    locked_rx.recv().unwrap();

    // Only a task on this single-threaded runtime can let the writer finish.
    let release = tokio::spawn(async move { release_tx.send(()).unwrap() });

    assert_eq!(names.next().await.unwrap().unwrap(), vec!["alice"]);
    release.await.unwrap();
    writer.join().unwrap().unwrap();
    assert_eq!(names.next().await.unwrap().unwrap(), vec!["alice"]);
}
