use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;

use crate::error::CoreError;

pub type DbPool = SqlitePool;

/// Opens (creating if missing) the SQLite database at `path` and ensures the
/// schema exists. Foreign keys are enabled so that deleting an event removes
/// its persisted occurrence overrides.
pub async fn establish_connection(path: &str) -> Result<DbPool, CoreError> {
    let options = SqliteConnectOptions::new()
        .filename(path)
        .create_if_missing(true)
        .foreign_keys(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await?;

    run_migrations(&pool).await?;
    Ok(pool)
}

async fn run_migrations(pool: &DbPool) -> Result<(), CoreError> {
    sqlx::query(
        r#"CREATE TABLE IF NOT EXISTS recurrence_rules (
            id BLOB PRIMARY KEY,
            name TEXT NOT NULL,
            description TEXT,
            frequency TEXT NOT NULL,
            params TEXT NOT NULL DEFAULT '',
            created_at TEXT NOT NULL
        )"#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"CREATE TABLE IF NOT EXISTS events (
            id BLOB PRIMARY KEY,
            title TEXT NOT NULL,
            description TEXT,
            start TEXT NOT NULL,
            "end" TEXT NOT NULL,
            timezone TEXT NOT NULL DEFAULT 'UTC',
            rule_id BLOB REFERENCES recurrence_rules(id),
            end_recurring TEXT,
            creator TEXT,
            created_on TEXT NOT NULL
        )"#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"CREATE TABLE IF NOT EXISTS occurrences (
            id BLOB PRIMARY KEY,
            event_id BLOB NOT NULL REFERENCES events(id) ON DELETE CASCADE,
            start TEXT NOT NULL,
            "end" TEXT NOT NULL,
            original_start TEXT NOT NULL,
            original_end TEXT NOT NULL,
            cancelled BOOLEAN NOT NULL DEFAULT FALSE,
            description TEXT,
            created_at TEXT NOT NULL,
            UNIQUE (event_id, original_start, original_end)
        )"#,
    )
    .execute(pool)
    .await?;

    Ok(())
}
