use std::time::Duration;

use futures::StreamExt;
use sqlwatch_lib::{
    Database, DbError, QueryOptions, QueryStreamExt, SqlValue, StoreConfig, TriggerMonitor, Values,
};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS users (
    id    INTEGER PRIMARY KEY,
    name  TEXT NOT NULL UNIQUE
);
"#;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        tracing_subscriber::EnvFilter::new("sqlwatch=debug,sqlwatch_lib=debug,info")
    });
    tracing_subscriber::fmt().with_env_filter(filter).init();

    if let Err(error) = run().await {
        eprintln!("sqlwatch failed: {error}");
        std::process::exit(1);
    }
}

fn parse_writes() -> Result<usize, String> {
    let mut writes = 3usize;
    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--writes" => {
                let value = args.next().ok_or("--writes requires a value")?;
                writes = value
                    .parse()
                    .map_err(|e| format!("invalid --writes value '{value}': {e}"))?;
            }
            other => return Err(format!("unsupported argument '{other}'. Use --writes <n>")),
        }
    }
    Ok(writes)
}

async fn run() -> Result<(), String> {
    let writes = parse_writes()?;
    let config = StoreConfig::from_env().map_err(|e| e.to_string())?;
    let db = Database::open_with(&config).map_err(|e| e.to_string())?;
    db.execute(SCHEMA, &[]).map_err(|e| e.to_string())?;

    let monitor = TriggerMonitor::start(db.bus().tap());

    let mut names = db
        .observe("users", QueryOptions::new().columns(["name"]).order_by("id"))
        .subscribe()
        .map_to_list(|row| Ok(row["name"].as_str().unwrap_or_default().to_string()))
        .boxed_local();

    let initial = names.next().await.ok_or("subscription closed")?.map_err(|e| e.to_string())?;
    println!("initial users: {initial:?}");

    let start = db
        .raw_query("SELECT count(*) AS n FROM users", &[])
        .map_err(|e| e.to_string())?
        .first()
        .and_then(|row| row["n"].as_i64())
        .unwrap_or(0);

    for i in 0..writes {
        let name = format!("user-{}", start as usize + i);
        db.insert_and_trigger("users", &Values::new().set("name", name), None)
            .map_err(|e| e.to_string())?;
        let current = names.next().await.ok_or("subscription closed")?.map_err(|e| e.to_string())?;
        println!("after insert {}: {} users", i + 1, current.len());
    }

    let renamed = db
        .transaction(|txn| {
            let changed = txn.raw_update_and_trigger(
                "users",
                "UPDATE users SET name = name || ? WHERE id > ?",
                &[SqlValue::Text("*".into()), SqlValue::Integer(start)],
            )?;
            Ok::<_, DbError>(changed)
        })
        .map_err(|e| e.to_string())?;
    let current = names.next().await.ok_or("subscription closed")?.map_err(|e| e.to_string())?;
    println!("renamed {renamed} users in one transaction: {current:?}");

    drop(names);
    tokio::time::sleep(Duration::from_millis(150)).await;
    drop(db);
    monitor.await.map_err(|e| e.to_string())?;
    Ok(())
}
