//! Digest text handling: splitting an archive dump into postings and parsing
//! each posting into a structured record.

pub mod date;
pub mod links;
pub mod parser;
pub mod sender;
pub mod splitter;

pub use links::LinkFilter;
pub use parser::{parse_block, ParseState, ParserOptions};
pub use splitter::{split_digest, DigestBatch};

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;

use crate::constants::LOCATION_NOT_FOUND;

/// Which list a posting was sent to, derived from its subject tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum MailingList {
    Reuse,
    FreeFood,
    Unknown,
}

impl MailingList {
    /// Value stored in the catalog.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Reuse => "Reuse",
            Self::FreeFood => "Free-food",
            Self::Unknown => "Unknown",
        }
    }

    /// Map an archive directory name (`reuse`, `free-foods`) to a list.
    #[must_use]
    pub fn from_archive_name(name: &str) -> Self {
        match name.to_lowercase().as_str() {
            "reuse" => Self::Reuse,
            "free-foods" | "free-food" => Self::FreeFood,
            _ => Self::Unknown,
        }
    }

    /// Bracketed subject prefix the list software adds.
    #[must_use]
    pub fn subject_tag(&self) -> Option<&'static str> {
        match self {
            Self::Reuse => Some("[Reuse]"),
            Self::FreeFood => Some("[Free-food]"),
            Self::Unknown => None,
        }
    }

    /// Sender token used by the list's own digest messages.
    #[must_use]
    pub fn digest_author(&self) -> Option<&'static str> {
        match self {
            Self::Reuse => Some("Reuse"),
            Self::FreeFood => Some("Free-food"),
            Self::Unknown => None,
        }
    }

    /// Line that closes an embedded digest.
    #[must_use]
    pub fn digest_end_marker(&self) -> Option<&'static str> {
        match self {
            Self::Reuse => Some("End of Reuse Digest"),
            Self::FreeFood => Some("End of Free-food Digest"),
            Self::Unknown => None,
        }
    }

    /// Strip a leading list tag from a subject.
    ///
    /// Returns the detected list and the remaining, trimmed subject. Subjects
    /// without a recognized tag come back unchanged as [`MailingList::Unknown`].
    #[must_use]
    pub fn split_subject(subject: &str) -> (Self, String) {
        let subject = subject.trim();
        for list in [Self::Reuse, Self::FreeFood] {
            if let Some(rest) = list.subject_tag().and_then(|tag| subject.strip_prefix(tag)) {
                return (list, rest.trim().to_string());
            }
        }
        (Self::Unknown, subject.to_string())
    }
}

impl std::fmt::Display for MailingList {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a posting was dropped. None of these abort a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Error)]
pub enum RejectReason {
    #[error("reply to an earlier message")]
    Reply,
    #[error("not an offer (digest, forward or reply subject)")]
    NotAnOffer,
    #[error("date header missing or unparseable")]
    UnparseableDate,
    #[error("subject missing")]
    MissingSubject,
    #[error("already ingested within the dedup window")]
    DuplicateHistory,
    #[error("repeat of an earlier posting in the same batch")]
    DuplicateBatch,
    #[error("announces that an item was claimed")]
    Claimed,
}

impl RejectReason {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Reply => "reply",
            Self::NotAnOffer => "not_an_offer",
            Self::UnparseableDate => "unparseable_date",
            Self::MissingSubject => "missing_subject",
            Self::DuplicateHistory => "duplicate_history",
            Self::DuplicateBatch => "duplicate_batch",
            Self::Claimed => "claimed",
        }
    }
}

/// One offer extracted from a digest.
#[derive(Debug, Clone, Serialize)]
pub struct Posting {
    /// Subject with the list tag removed. Never empty.
    pub subject: String,
    pub sender_address: String,
    pub sender_name: String,
    /// Raw `From:` value still awaiting collaborator lookup.
    pub sender_lookup: Option<String>,
    /// Date header text as written.
    pub posted_at: String,
    pub timestamp: DateTime<Utc>,
    pub mailing_list: MailingList,
    pub body: String,
    pub links: Vec<String>,
    pub attachment_links: Vec<String>,
    pub relocated_image_urls: Vec<String>,
    pub location: String,
    pub can_self_pickup: bool,
}

impl Posting {
    /// All image/link URLs for the catalog: relocated first, then the
    /// remaining body and attachment links, without repeats.
    #[must_use]
    pub fn photo_urls(&self) -> Vec<String> {
        let mut urls: Vec<String> = Vec::new();
        for url in self
            .relocated_image_urls
            .iter()
            .chain(&self.links)
            .chain(&self.attachment_links)
        {
            if !urls.contains(url) {
                urls.push(url.clone());
            }
        }
        urls
    }

    /// Whether enrichment has produced anything but the sentinel.
    #[must_use]
    pub fn has_location(&self) -> bool {
        self.location != LOCATION_NOT_FOUND
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_subject_tags() {
        assert_eq!(
            MailingList::split_subject("[Reuse] Free desk"),
            (MailingList::Reuse, "Free desk".to_string())
        );
        assert_eq!(
            MailingList::split_subject("[Free-food] Pizza leftover"),
            (MailingList::FreeFood, "Pizza leftover".to_string())
        );
        assert_eq!(
            MailingList::split_subject("Moving sale"),
            (MailingList::Unknown, "Moving sale".to_string())
        );
    }

    #[test]
    fn test_archive_names() {
        assert_eq!(MailingList::from_archive_name("reuse"), MailingList::Reuse);
        assert_eq!(MailingList::from_archive_name("free-foods"), MailingList::FreeFood);
        assert_eq!(MailingList::from_archive_name("bikes"), MailingList::Unknown);
    }

    #[test]
    fn test_reject_reason_labels() {
        assert_eq!(RejectReason::NotAnOffer.as_str(), "not_an_offer");
        assert_eq!(RejectReason::DuplicateBatch.to_string(), "repeat of an earlier posting in the same batch");
    }
}
