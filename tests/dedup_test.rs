//! Integration tests for deduplication against stored history.

use chrono::{TimeZone, Utc};
use mailman_digest_ingest::db::{insert_item, Database, NewItem};
use mailman_digest_ingest::dedup::seen_in_history;
use tempfile::TempDir;

async fn setup_db() -> (Database, TempDir) {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let db_path = temp_dir.path().join("test.sqlite");
    let db = Database::new(&db_path)
        .await
        .expect("Failed to create database");
    (db, temp_dir)
}

async fn store(db: &Database, name: &str, created_at: &str) {
    let item = NewItem {
        created_at: created_at.to_string(),
        raw_date: String::new(),
        email: None,
        sender_name: None,
        name: name.to_string(),
        description: String::new(),
        location: "Location not found".to_string(),
        can_self_pickup: false,
        mailing_list: "Reuse".to_string(),
        photo_urls: Vec::new(),
        content_hash: String::new(),
    };
    insert_item(db.pool(), &item).await.unwrap();
}

#[tokio::test]
async fn test_recent_same_subject_is_duplicate() {
    let (db, _temp_dir) = setup_db().await;
    store(&db, "Free desk", "2024-09-04T12:00:00Z").await;

    let posted = Utc.with_ymd_and_hms(2024, 9, 10, 12, 0, 0).unwrap();
    assert!(seen_in_history(db.pool(), "Free desk", posted, 7).await.unwrap());
}

#[tokio::test]
async fn test_old_same_subject_is_not_duplicate() {
    let (db, _temp_dir) = setup_db().await;
    store(&db, "Free desk", "2024-08-01T12:00:00Z").await;

    let posted = Utc.with_ymd_and_hms(2024, 9, 10, 12, 0, 0).unwrap();
    assert!(!seen_in_history(db.pool(), "Free desk", posted, 7).await.unwrap());
}

#[tokio::test]
async fn test_window_is_symmetric_and_inclusive() {
    let (db, _temp_dir) = setup_db().await;
    store(&db, "Free desk", "2024-09-17T12:00:00Z").await;

    let seven_days_before = Utc.with_ymd_and_hms(2024, 9, 10, 12, 0, 0).unwrap();
    assert!(seen_in_history(db.pool(), "Free desk", seven_days_before, 7)
        .await
        .unwrap());

    let eight_days_before = Utc.with_ymd_and_hms(2024, 9, 9, 12, 0, 0).unwrap();
    assert!(!seen_in_history(db.pool(), "Free desk", eight_days_before, 7)
        .await
        .unwrap());
}

#[tokio::test]
async fn test_subject_match_is_exact() {
    let (db, _temp_dir) = setup_db().await;
    store(&db, "Free desk", "2024-09-09T12:00:00Z").await;

    let posted = Utc.with_ymd_and_hms(2024, 9, 10, 12, 0, 0).unwrap();
    assert!(!seen_in_history(db.pool(), "Free desks", posted, 7).await.unwrap());
    assert!(!seen_in_history(db.pool(), "free desk", posted, 7).await.unwrap());
}

#[tokio::test]
async fn test_weekly_recurrence_is_treated_as_duplicate() {
    // Exact-subject matching cannot tell a repeat offer from a bump.
    let (db, _temp_dir) = setup_db().await;
    store(&db, "Free bagels", "2024-09-02T13:00:00Z").await;

    let next_week = Utc.with_ymd_and_hms(2024, 9, 9, 13, 0, 0).unwrap();
    assert!(seen_in_history(db.pool(), "Free bagels", next_week, 7)
        .await
        .unwrap());
}
