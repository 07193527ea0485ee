//! Sender resolution for `From:` headers.
//!
//! Pipermail obfuscates addresses as `user at host (Display Name)`. Local
//! addresses are decoded here; anything else is flagged for the text
//! collaborator.

use super::MailingList;

/// Result of decoding a `From:` value locally.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sender {
    pub address: String,
    pub name: String,
    /// Set when the address had no institutional form and must be looked up.
    pub needs_lookup: bool,
}

/// Decode a `From:` header value (without the `From:` prefix).
#[must_use]
pub fn resolve_sender(raw: &str, institution_marker: &str) -> Sender {
    let mut address = raw.trim().to_string();

    if !address.to_lowercase().contains(institution_marker) {
        return Sender {
            address,
            name: String::new(),
            needs_lookup: true,
        };
    }

    let mut name = String::new();
    if let (Some(open), Some(close)) = (address.find('('), address.find(')')) {
        if open < close {
            name = address[open + 1..close].trim().to_string();
            address = address[..open].trim().to_string();
        }
    }

    if let Some(author) = digest_author_prefix(&address) {
        address = author.to_string();
    }

    if let Some((user, domain)) = address.split_once(" at ") {
        address = format!("{}@{}", user.trim(), domain.trim());
    }

    Sender {
        address,
        name,
        needs_lookup: false,
    }
}

fn digest_author_prefix(address: &str) -> Option<&'static str> {
    [MailingList::Reuse, MailingList::FreeFood]
        .iter()
        .filter_map(MailingList::digest_author)
        .find(|author| address.starts_with(author))
}
