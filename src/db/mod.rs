//! SQLite item catalog.
//!
//! The catalog is also the dedup history: every run looks up recent rows by
//! `(name, created_at)` before inserting, so opening the store makes sure the
//! index behind that lookup exists.

mod migrations;
mod models;
mod queries;

pub use models::*;
pub use queries::*;

use std::path::Path;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteSynchronous,
};
use tracing::{debug, info};

/// Index serving the history window lookup.
pub const HISTORY_INDEX: &str = "idx_items_name_created";

#[derive(Debug, Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Open (or create) the catalog at `path` and bring its schema up to date.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened or written, a migration
    /// fails, or the history index is missing afterwards.
    pub async fn new(path: &Path) -> Result<Self> {
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            // Every list source inserts into the same table at once.
            .busy_timeout(Duration::from_secs(10));

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .with_context(|| format!("Failed to open item catalog at {}", path.display()))?;

        let db = Self { pool };
        migrations::run(&db.pool).await?;
        debug!("Catalog migrations complete");

        if !db.has_history_index().await? {
            bail!(
                "Item catalog is missing index {HISTORY_INDEX}; delete {} and re-ingest",
                path.display()
            );
        }
        db.check_writable(path).await?;

        let items = count_items(&db.pool).await?;
        info!(path = %path.display(), items, "Item catalog ready");

        Ok(db)
    }

    /// Whether the `(name, created_at)` index used by history dedup exists.
    ///
    /// # Errors
    ///
    /// Returns an error if the schema cannot be read.
    pub async fn has_history_index(&self) -> Result<bool> {
        let row: Option<(String,)> = sqlx::query_as(
            "SELECT name FROM sqlite_master WHERE type = 'index' AND tbl_name = 'items' AND name = ?",
        )
        .bind(HISTORY_INDEX)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to read catalog schema")?;
        Ok(row.is_some())
    }

    /// Issue a no-op write and roll it back. A read-only mount fails here
    /// instead of after a digest has been fetched and enriched.
    async fn check_writable(&self, path: &Path) -> Result<()> {
        let mut tx = self
            .pool
            .begin()
            .await
            .context("Failed to start catalog transaction")?;
        sqlx::query("UPDATE _schema_version SET version = version")
            .execute(&mut *tx)
            .await
            .with_context(|| {
                format!(
                    "Item catalog is not writable (path: {}). Check volume permissions",
                    path.display()
                )
            })?;
        tx.rollback()
            .await
            .context("Failed to roll back catalog write check")?;
        Ok(())
    }

    #[must_use]
    pub const fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}
