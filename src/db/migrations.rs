use anyhow::{Context, Result};
use sqlx::SqlitePool;
use tracing::debug;

use super::HISTORY_INDEX;

/// Run all pending migrations.
pub async fn run(pool: &SqlitePool) -> Result<()> {
    create_migration_table(pool).await?;
    let current_version = get_schema_version(pool).await?;

    if current_version < 1 {
        debug!("Running migration v1");
        run_migration_v1(pool).await?;
        set_schema_version(pool, 1).await?;
    }

    Ok(())
}

async fn create_migration_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r"
        CREATE TABLE IF NOT EXISTS _schema_version (
            version INTEGER PRIMARY KEY
        )
        ",
    )
    .execute(pool)
    .await
    .context("Failed to create schema version table")?;

    Ok(())
}

async fn get_schema_version(pool: &SqlitePool) -> Result<i32> {
    let row: Option<(i32,)> = sqlx::query_as("SELECT version FROM _schema_version LIMIT 1")
        .fetch_optional(pool)
        .await
        .context("Failed to get schema version")?;

    Ok(row.map_or(0, |(v,)| v))
}

async fn set_schema_version(pool: &SqlitePool, version: i32) -> Result<()> {
    sqlx::query("DELETE FROM _schema_version")
        .execute(pool)
        .await?;
    sqlx::query("INSERT INTO _schema_version (version) VALUES (?)")
        .bind(version)
        .execute(pool)
        .await?;
    Ok(())
}

async fn run_migration_v1(pool: &SqlitePool) -> Result<()> {
    debug!("Running migration v1: creating items table");

    // No uniqueness on (name, created_at): repeats are filtered before insert.
    sqlx::query(
        r"
        CREATE TABLE IF NOT EXISTS items (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            created_at TEXT NOT NULL,
            raw_date TEXT NOT NULL,
            email TEXT,
            sender_name TEXT,
            name TEXT NOT NULL,
            description TEXT NOT NULL DEFAULT '',
            location TEXT,
            can_self_pickup INTEGER NOT NULL DEFAULT 0,
            mailing_list TEXT,
            photo_urls TEXT NOT NULL DEFAULT '[]',
            content_hash TEXT,
            ingested_at TEXT NOT NULL DEFAULT (datetime('now'))
        )
        ",
    )
    .execute(pool)
    .await
    .context("Failed to create items table")?;

    sqlx::query(&format!(
        "CREATE INDEX IF NOT EXISTS {HISTORY_INDEX} ON items(name, created_at)"
    ))
        .execute(pool)
        .await
        .context("Failed to create items index")?;

    Ok(())
}
