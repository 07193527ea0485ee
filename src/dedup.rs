//! Posting deduplication.
//!
//! Two independent stages, both of which must pass:
//!
//! 1. Against history: a stored item with the same subject whose timestamp is
//!    within the dedup window of the posting means it was already ingested.
//! 2. Within a batch: among postings that share a subject, only the earliest
//!    survives; later ones are bumps of the same offer.
//!
//! Recurring identical subjects (a weekly "Free bagels") fall inside the same
//! window and are treated as duplicates. That is a known precision limit of
//! exact-subject matching.

use std::collections::hash_map::Entry;
use std::collections::{HashMap, HashSet};

use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use sqlx::SqlitePool;
use tracing::debug;

use crate::db::find_items_in_window;
use crate::digest::date::to_storage;
use crate::digest::Posting;

/// Whether an item named `subject` was stored within `window_days` of `timestamp`.
///
/// # Errors
///
/// Returns an error if the history store cannot be queried.
pub async fn seen_in_history(
    pool: &SqlitePool,
    subject: &str,
    timestamp: DateTime<Utc>,
    window_days: i64,
) -> Result<bool> {
    let window = Duration::days(window_days);
    let from = to_storage(&(timestamp - window));
    let to = to_storage(&(timestamp + window));

    let matches = find_items_in_window(pool, subject, &from, &to).await?;
    if let Some(existing) = matches.first() {
        debug!(
            subject = %subject,
            existing_id = existing.id,
            existing_created_at = %existing.created_at,
            "Posting already ingested"
        );
        return Ok(true);
    }
    Ok(false)
}

/// Keep only the earliest posting for each subject.
///
/// Returns `(kept, dropped)`, both in input order. Ties on timestamp keep
/// the posting that came first.
#[must_use]
pub fn dedup_batch(postings: Vec<Posting>) -> (Vec<Posting>, Vec<Posting>) {
    let keep: HashSet<usize> = {
        let mut earliest: HashMap<&str, usize> = HashMap::new();
        for (idx, posting) in postings.iter().enumerate() {
            match earliest.entry(posting.subject.as_str()) {
                Entry::Vacant(slot) => {
                    slot.insert(idx);
                }
                Entry::Occupied(mut slot) => {
                    if posting.timestamp < postings[*slot.get()].timestamp {
                        slot.insert(idx);
                    }
                }
            }
        }
        earliest.into_values().collect()
    };

    let mut kept = Vec::with_capacity(keep.len());
    let mut dropped = Vec::new();
    for (idx, posting) in postings.into_iter().enumerate() {
        if keep.contains(&idx) {
            kept.push(posting);
        } else {
            dropped.push(posting);
        }
    }
    (kept, dropped)
}
