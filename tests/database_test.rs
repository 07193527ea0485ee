//! Integration tests for the item store.

use mailman_digest_ingest::db::{
    clear_items, count_items, find_items_in_window, get_item, get_items_by_name, insert_item,
    Database, NewItem, HISTORY_INDEX,
};
use tempfile::TempDir;

async fn setup_db() -> (Database, TempDir) {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let db_path = temp_dir.path().join("test.sqlite");
    let db = Database::new(&db_path)
        .await
        .expect("Failed to create database");
    (db, temp_dir)
}

fn new_item(name: &str, created_at: &str) -> NewItem {
    NewItem {
        created_at: created_at.to_string(),
        raw_date: "Tue, 10 Sep 2024 14:03:22 -0400".to_string(),
        email: Some("jdoe@mit.edu".to_string()),
        sender_name: Some("Jane Doe".to_string()),
        name: name.to_string(),
        description: "Large wooden desk".to_string(),
        location: "Building 32".to_string(),
        can_self_pickup: true,
        mailing_list: "Reuse".to_string(),
        photo_urls: vec![
            "https://cdn.example.com/a.jpg".to_string(),
            "https://imgur.com/a/desk".to_string(),
        ],
        content_hash: "abc123".to_string(),
    }
}

#[tokio::test]
async fn test_insert_and_get_item() {
    let (db, _temp_dir) = setup_db().await;

    let id = insert_item(db.pool(), &new_item("Free desk", "2024-09-10T18:03:22Z"))
        .await
        .expect("Failed to insert item");
    assert!(id > 0);

    let item = get_item(db.pool(), id)
        .await
        .expect("Failed to get item")
        .expect("Item not found");

    assert_eq!(item.name, "Free desk");
    assert_eq!(item.created_at, "2024-09-10T18:03:22Z");
    assert_eq!(item.email.as_deref(), Some("jdoe@mit.edu"));
    assert_eq!(item.location.as_deref(), Some("Building 32"));
    assert!(item.can_self_pickup);
    assert_eq!(item.mailing_list.as_deref(), Some("Reuse"));
    assert_eq!(
        item.photo_url_list(),
        vec!["https://cdn.example.com/a.jpg", "https://imgur.com/a/desk"]
    );
    assert!(!item.ingested_at.is_empty());
}

#[tokio::test]
async fn test_window_query_bounds_are_inclusive() {
    let (db, _temp_dir) = setup_db().await;

    insert_item(db.pool(), &new_item("Free desk", "2024-09-03T12:00:00Z"))
        .await
        .unwrap();
    insert_item(db.pool(), &new_item("Free desk", "2024-09-17T12:00:00Z"))
        .await
        .unwrap();
    insert_item(db.pool(), &new_item("Free desk", "2024-09-17T12:00:01Z"))
        .await
        .unwrap();
    insert_item(db.pool(), &new_item("Free lamp", "2024-09-10T12:00:00Z"))
        .await
        .unwrap();

    let found = find_items_in_window(
        db.pool(),
        "Free desk",
        "2024-09-03T12:00:00Z",
        "2024-09-17T12:00:00Z",
    )
    .await
    .unwrap();

    let dates: Vec<&str> = found.iter().map(|i| i.created_at.as_str()).collect();
    assert_eq!(dates, vec!["2024-09-03T12:00:00Z", "2024-09-17T12:00:00Z"]);
}

#[tokio::test]
async fn test_same_subject_may_be_stored_twice() {
    let (db, _temp_dir) = setup_db().await;

    insert_item(db.pool(), &new_item("Free bagels", "2024-09-02T13:00:00Z"))
        .await
        .unwrap();
    insert_item(db.pool(), &new_item("Free bagels", "2024-09-16T13:00:00Z"))
        .await
        .unwrap();

    let items = get_items_by_name(db.pool(), "Free bagels").await.unwrap();
    assert_eq!(items.len(), 2);
    assert_eq!(count_items(db.pool()).await.unwrap(), 2);
}

#[tokio::test]
async fn test_clear_items() {
    let (db, _temp_dir) = setup_db().await;

    insert_item(db.pool(), &new_item("Free desk", "2024-09-10T18:03:22Z"))
        .await
        .unwrap();
    assert_eq!(clear_items(db.pool()).await.unwrap(), 1);
    assert_eq!(count_items(db.pool()).await.unwrap(), 0);
}

#[tokio::test]
async fn test_reopen_keeps_items() {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("test.sqlite");

    {
        let db = Database::new(&db_path).await.unwrap();
        insert_item(db.pool(), &new_item("Free desk", "2024-09-10T18:03:22Z"))
            .await
            .unwrap();
    }

    let db = Database::new(&db_path).await.unwrap();
    assert_eq!(count_items(db.pool()).await.unwrap(), 1);
}

#[tokio::test]
async fn test_open_builds_history_index() {
    let (db, _temp_dir) = setup_db().await;
    assert!(db.has_history_index().await.unwrap());

    sqlx::query(&format!("DROP INDEX {HISTORY_INDEX}"))
        .execute(db.pool())
        .await
        .unwrap();
    assert!(!db.has_history_index().await.unwrap());
}

#[tokio::test]
async fn test_open_rejects_catalog_without_history_index() {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("test.sqlite");

    {
        let db = Database::new(&db_path).await.unwrap();
        sqlx::query(&format!("DROP INDEX {HISTORY_INDEX}"))
            .execute(db.pool())
            .await
            .unwrap();
    }

    let err = Database::new(&db_path).await.unwrap_err();
    assert!(format!("{err:#}").contains(HISTORY_INDEX));
}
