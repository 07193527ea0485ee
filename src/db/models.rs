use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::digest::date::to_storage;
use crate::digest::Posting;

/// A catalog item ingested from a digest.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Item {
    pub id: i64,
    /// RFC 3339 UTC timestamp of the posting.
    pub created_at: String,
    pub raw_date: String,
    pub email: Option<String>,
    pub sender_name: Option<String>,
    /// The posting subject.
    pub name: String,
    pub description: String,
    pub location: Option<String>,
    pub can_self_pickup: bool,
    pub mailing_list: Option<String>,
    /// JSON array of URLs.
    pub photo_urls: String,
    pub content_hash: Option<String>,
    pub ingested_at: String,
}

impl Item {
    /// Decoded `photo_urls`; malformed JSON yields an empty list.
    #[must_use]
    pub fn photo_url_list(&self) -> Vec<String> {
        serde_json::from_str(&self.photo_urls).unwrap_or_default()
    }
}

/// Data for inserting a new item.
#[derive(Debug, Clone)]
pub struct NewItem {
    pub created_at: String,
    pub raw_date: String,
    pub email: Option<String>,
    pub sender_name: Option<String>,
    pub name: String,
    pub description: String,
    pub location: String,
    pub can_self_pickup: bool,
    pub mailing_list: String,
    pub photo_urls: Vec<String>,
    pub content_hash: String,
}

impl NewItem {
    /// Build the sink record for a fully processed posting.
    #[must_use]
    pub fn from_posting(posting: &Posting) -> Self {
        Self {
            created_at: to_storage(&posting.timestamp),
            raw_date: posting.posted_at.clone(),
            email: Some(posting.sender_address.clone()).filter(|s| !s.is_empty()),
            sender_name: Some(posting.sender_name.clone()).filter(|s| !s.is_empty()),
            name: posting.subject.clone(),
            description: posting.body.clone(),
            location: posting.location.clone(),
            can_self_pickup: posting.can_self_pickup,
            mailing_list: posting.mailing_list.as_str().to_string(),
            photo_urls: posting.photo_urls(),
            content_hash: compute_hash(&posting.subject, &posting.body),
        }
    }
}

/// SHA-256 over subject and body.
fn compute_hash(subject: &str, body: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(subject.as_bytes());
    hasher.update(b"\n");
    hasher.update(body.as_bytes());
    hex::encode(hasher.finalize())
}
