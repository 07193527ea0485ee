use anyhow::{Context, Result};
use sqlx::SqlitePool;

use super::models::{Item, NewItem};

// ========== Items ==========

/// Items named exactly `name` whose `created_at` lies in `[from, to]`.
///
/// Both bounds are RFC 3339 UTC strings as produced by
/// [`crate::digest::date::to_storage`].
pub async fn find_items_in_window(
    pool: &SqlitePool,
    name: &str,
    from: &str,
    to: &str,
) -> Result<Vec<Item>> {
    sqlx::query_as(
        r"
        SELECT * FROM items
        WHERE name = ? AND created_at >= ? AND created_at <= ?
        ORDER BY created_at
        ",
    )
    .bind(name)
    .bind(from)
    .bind(to)
    .fetch_all(pool)
    .await
    .context("Failed to query items in window")
}

/// Insert a new item, returning its ID.
pub async fn insert_item(pool: &SqlitePool, item: &NewItem) -> Result<i64> {
    let photo_urls =
        serde_json::to_string(&item.photo_urls).context("Failed to encode photo urls")?;

    let result = sqlx::query(
        r"
        INSERT INTO items (created_at, raw_date, email, sender_name, name, description,
                           location, can_self_pickup, mailing_list, photo_urls, content_hash)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        ",
    )
    .bind(&item.created_at)
    .bind(&item.raw_date)
    .bind(&item.email)
    .bind(&item.sender_name)
    .bind(&item.name)
    .bind(&item.description)
    .bind(&item.location)
    .bind(item.can_self_pickup)
    .bind(&item.mailing_list)
    .bind(&photo_urls)
    .bind(&item.content_hash)
    .execute(pool)
    .await
    .context("Failed to insert item")?;

    Ok(result.last_insert_rowid())
}

/// Get an item by ID.
pub async fn get_item(pool: &SqlitePool, id: i64) -> Result<Option<Item>> {
    sqlx::query_as("SELECT * FROM items WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await
        .context("Failed to fetch item")
}

/// All items with the given name, oldest first.
pub async fn get_items_by_name(pool: &SqlitePool, name: &str) -> Result<Vec<Item>> {
    sqlx::query_as("SELECT * FROM items WHERE name = ? ORDER BY created_at")
        .bind(name)
        .fetch_all(pool)
        .await
        .context("Failed to fetch items by name")
}

/// Total number of items.
pub async fn count_items(pool: &SqlitePool) -> Result<i64> {
    let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM items")
        .fetch_one(pool)
        .await
        .context("Failed to count items")?;
    Ok(count)
}

/// Delete every item. Used to reset a catalog before a full re-ingest.
pub async fn clear_items(pool: &SqlitePool) -> Result<u64> {
    let result = sqlx::query("DELETE FROM items")
        .execute(pool)
        .await
        .context("Failed to clear items")?;
    Ok(result.rows_affected())
}
