//! SQLite connection and schema management.
//!
//! The database backs the two durable resources of the pipeline: the index
//! queue and the credential store. Schema creation is idempotent.

use anyhow::Result;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::str::FromStr;

use crate::config::Config;

pub async fn connect(config: &Config) -> Result<SqlitePool> {
    let db_path = &config.db.path;

    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", db_path.display()))?
        .create_if_missing(true)
        .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal);

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await?;

    Ok(pool)
}

pub async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    // Index queue. `claimed_at` doubles as the claim lease timestamp:
    // NULL means unclaimed, a stale value means the claim expired and the
    // item is eligible for redelivery.
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS queue_items (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            queue TEXT NOT NULL,
            record_id TEXT NOT NULL,
            operation TEXT NOT NULL DEFAULT 'index',
            enqueued_at INTEGER NOT NULL,
            claimed_at INTEGER
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_queue_items_claim ON queue_items(queue, claimed_at, id)",
    )
    .execute(pool)
    .await?;

    // Single-row credential store. Writers replace the whole row in one
    // statement so readers always observe a complete credential.
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS credentials (
            id INTEGER PRIMARY KEY CHECK (id = 1),
            bearer_token TEXT NOT NULL,
            site_id TEXT NOT NULL DEFAULT '',
            site_name TEXT NOT NULL DEFAULT '',
            base_url TEXT NOT NULL DEFAULT '',
            org_id TEXT NOT NULL DEFAULT '',
            org_name TEXT NOT NULL DEFAULT '',
            available_sites TEXT NOT NULL DEFAULT '[]',
            updated_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}
