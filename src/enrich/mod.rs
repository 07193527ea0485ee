//! Best-effort enrichment through an external text-understanding model.
//!
//! Nothing in here fails a posting. Collaborator errors are logged and turned
//! into [`Enrichment::Unavailable`] or the unchanged input.

pub mod geocode;
pub mod openai;

use std::sync::LazyLock;

use anyhow::Result;
use async_trait::async_trait;
use regex::Regex;
use tracing::{debug, warn};

use crate::constants::LOCATION_NOT_FOUND;
use crate::digest::Posting;

pub use openai::OpenAiClient;

const LOCATION_SYSTEM_PROMPT: &str = "You are a helpful assistant that extracts pick-up locations and whether the user can self-pickup from email bodies. Do not include any other text in the response. Return the location and a boolean for whether the user can self-pickup, separated by a comma. If the location is not found, return \"Location not found, False\".\n\nAll pickups happen in or around MIT campus. Also includes Boston, Harvard.";

static SENDER_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"Name: (.+),").expect("Invalid sender name regex"));
static SENDER_EMAIL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"Email: (.+)").expect("Invalid sender email regex"));

/// Single-turn prompt/response collaborator.
#[async_trait]
pub trait TextModel: Send + Sync {
    /// Send one prompt, optionally with a system instruction, and return the reply text.
    async fn complete(&self, system: Option<&str>, prompt: &str) -> Result<String>;
}

/// Outcome of location extraction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Enrichment {
    /// The collaborator answered. `location` may itself be the not-found text.
    Extracted {
        location: String,
        can_self_pickup: bool,
    },
    /// No usable answer; callers fall back to the sentinel.
    Unavailable,
}

impl Enrichment {
    #[must_use]
    pub fn location(&self) -> &str {
        match self {
            Self::Extracted { location, .. } => location,
            Self::Unavailable => LOCATION_NOT_FOUND,
        }
    }

    #[must_use]
    pub fn can_self_pickup(&self) -> bool {
        match self {
            Self::Extracted {
                can_self_pickup, ..
            } => *can_self_pickup,
            Self::Unavailable => false,
        }
    }

    #[must_use]
    pub fn is_available(&self) -> bool {
        matches!(self, Self::Extracted { .. })
    }

    /// Copy the result onto a posting.
    pub fn apply(&self, posting: &mut Posting) {
        posting.location = self.location().to_string();
        posting.can_self_pickup = self.can_self_pickup();
    }
}

/// Ask the model for the pickup location and self-pickup flag.
pub async fn enrich(model: Option<&dyn TextModel>, subject: &str, body: &str) -> Enrichment {
    let Some(model) = model else {
        return Enrichment::Unavailable;
    };

    let prompt = format!(
        "What is the pick-up location mentioned in this email body, and can the user self-pickup?\n\n{subject}\n{body}"
    );

    match model.complete(Some(LOCATION_SYSTEM_PROMPT), &prompt).await {
        Ok(reply) => match parse_location_reply(&reply) {
            Some((location, can_self_pickup)) => {
                debug!(subject = %subject, location = %location, can_self_pickup, "Extracted location");
                Enrichment::Extracted {
                    location,
                    can_self_pickup,
                }
            }
            None => {
                warn!(subject = %subject, reply = %reply, "Malformed location reply");
                Enrichment::Unavailable
            }
        },
        Err(e) => {
            warn!(subject = %subject, "Location extraction unavailable: {e:#}");
            Enrichment::Unavailable
        }
    }
}

/// Split a `"<location>, <True|False>"` reply on its last comma.
#[must_use]
pub fn parse_location_reply(reply: &str) -> Option<(String, bool)> {
    let (location, flag) = reply.trim().rsplit_once(',')?;
    let location = location.trim();
    if location.is_empty() {
        return None;
    }
    Some((location.to_string(), flag.trim() == "True"))
}

/// Ask the model to pull a display name and address out of a raw `From:` value.
///
/// Returns `None` when the model is missing, fails, or answers in another shape.
pub async fn lookup_sender(model: Option<&dyn TextModel>, raw: &str) -> Option<(String, String)> {
    let model = model?;
    let prompt = format!(
        "Extract the name and email address from this string: '{raw}'. Format the response as 'Name: [name], Email: [email]'"
    );

    match model.complete(None, &prompt).await {
        Ok(reply) => {
            let parsed = parse_sender_reply(&reply);
            if parsed.is_none() {
                debug!(raw = %raw, reply = %reply, "Sender reply did not match");
            }
            parsed
        }
        Err(e) => {
            warn!(raw = %raw, "Sender lookup unavailable: {e:#}");
            None
        }
    }
}

/// Parse `Name: <name>, Email: <email>`.
#[must_use]
pub fn parse_sender_reply(reply: &str) -> Option<(String, String)> {
    let name = SENDER_NAME.captures(reply)?.get(1)?.as_str();
    let email = SENDER_EMAIL.captures(reply)?.get(1)?.as_str();
    Some((name.trim().to_string(), email.trim().to_string()))
}

/// Resolve a posting's sender through the model if it was flagged for lookup.
pub async fn resolve_posting_sender(model: Option<&dyn TextModel>, posting: &mut Posting) {
    let Some(raw) = posting.sender_lookup.take() else {
        return;
    };
    if let Some((name, email)) = lookup_sender(model, &raw).await {
        posting.sender_name = name;
        posting.sender_address = email;
    }
}

/// Ask whether a posting offers something new rather than announcing it is gone.
///
/// Anything other than a plain `False` counts as an offer, so collaborator
/// failures never drop a posting.
pub async fn is_new_offer(model: Option<&dyn TextModel>, subject: &str, body: &str) -> bool {
    let Some(model) = model else {
        return true;
    };
    let prompt = format!(
        "Check if this email is confirming that something is claimed. If it is saying something is claimed, return 'False'. Otherwise if it is describing or providing something new, return 'True'. Here is the email: Subject: {subject} Body: {body} Is this offering or describing something? Format the response as 'True' or 'False'."
    );

    match model.complete(None, &prompt).await {
        Ok(reply) => !reply.trim().eq_ignore_ascii_case("false"),
        Err(e) => {
            warn!(subject = %subject, "Offer check unavailable: {e:#}");
            true
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Canned(&'static str);

    #[async_trait]
    impl TextModel for Canned {
        async fn complete(&self, _system: Option<&str>, _prompt: &str) -> Result<String> {
            Ok(self.0.to_string())
        }
    }

    struct Broken;

    #[async_trait]
    impl TextModel for Broken {
        async fn complete(&self, _system: Option<&str>, _prompt: &str) -> Result<String> {
            anyhow::bail!("connection refused")
        }
    }

    #[test]
    fn test_parse_location_reply() {
        assert_eq!(
            parse_location_reply("Building 32, Stata Center lobby, True"),
            Some(("Building 32, Stata Center lobby".to_string(), true))
        );
        assert_eq!(
            parse_location_reply("Location not found, False"),
            Some(("Location not found".to_string(), false))
        );
        // Case-sensitive flag
        assert_eq!(
            parse_location_reply("Room 4-231, true"),
            Some(("Room 4-231".to_string(), false))
        );
        assert_eq!(parse_location_reply("no comma here"), None);
        assert_eq!(parse_location_reply(", True"), None);
    }

    #[test]
    fn test_parse_sender_reply() {
        assert_eq!(
            parse_sender_reply("Name: Jane Doe, Email: jane@gmail.com"),
            Some(("Jane Doe".to_string(), "jane@gmail.com".to_string()))
        );
        assert_eq!(parse_sender_reply("I could not find a name"), None);
    }

    #[tokio::test]
    async fn test_enrich_extracts() {
        let model = Canned("Student Center, True");
        let result = enrich(Some(&model), "Free desk", "come get it").await;
        assert_eq!(result.location(), "Student Center");
        assert!(result.can_self_pickup());
        assert!(result.is_available());
    }

    #[tokio::test]
    async fn test_enrich_degrades_to_sentinel() {
        let result = enrich(Some(&Broken), "Free desk", "come get it").await;
        assert_eq!(result, Enrichment::Unavailable);
        assert_eq!(result.location(), LOCATION_NOT_FOUND);
        assert!(!result.can_self_pickup());

        let missing = enrich(None, "Free desk", "body").await;
        assert_eq!(missing, Enrichment::Unavailable);

        let malformed = enrich(Some(&Canned("I am not sure")), "Free desk", "body").await;
        assert_eq!(malformed, Enrichment::Unavailable);
    }

    #[tokio::test]
    async fn test_lookup_sender_failure_is_none() {
        assert!(lookup_sender(Some(&Broken), "Jane <jane@gmail.com>").await.is_none());
        assert_eq!(
            lookup_sender(Some(&Canned("Name: Jane, Email: jane@gmail.com")), "raw").await,
            Some(("Jane".to_string(), "jane@gmail.com".to_string()))
        );
    }

    #[tokio::test]
    async fn test_offer_check() {
        assert!(!is_new_offer(Some(&Canned("False")), "Desk", "claimed").await);
        assert!(is_new_offer(Some(&Canned("True")), "Desk", "free").await);
        assert!(is_new_offer(Some(&Broken), "Desk", "free").await);
        assert!(is_new_offer(None, "Desk", "free").await);
    }
}
