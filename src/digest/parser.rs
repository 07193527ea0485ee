//! Line-scanning state machine that turns one raw block into a [`Posting`].

use crate::config::Config;
use crate::constants::{
    FOOTER_RULE_MIN_LEN, LOCATION_NOT_FOUND, NEXT_PART_MARKER, OUTLOOK_SIGNATURE_PREFIX,
    SCRUBBED_SUFFIX,
};

use super::date::parse_posting_date;
use super::links::{extract_urls, LinkFilter};
use super::sender::{resolve_sender, Sender};
use super::{MailingList, Posting, RejectReason};

/// Where the scanner is within a block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseState {
    Header,
    Body,
    Attachments,
    Done,
}

/// Settings the parser needs from configuration.
#[derive(Debug, Clone)]
pub struct ParserOptions {
    pub link_filter: LinkFilter,
    pub institution_marker: String,
}

impl ParserOptions {
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self {
            link_filter: LinkFilter::from_config(config),
            institution_marker: config.institution_marker.clone(),
        }
    }
}

/// Parse one raw block.
///
/// # Errors
///
/// Returns the [`RejectReason`] when the block is a reply, a forward, a
/// digest, or lacks a usable subject or date.
pub fn parse_block(block: &str, options: &ParserOptions) -> Result<Posting, RejectReason> {
    let mut scanner = Scanner::new(options);
    for line in block.lines() {
        scanner.feed(line)?;
    }
    scanner.finish()
}

struct Scanner<'a> {
    options: &'a ParserOptions,
    state: ParseState,
    sender: Option<Sender>,
    raw_date: Option<String>,
    subject: Option<(MailingList, String)>,
    body_lines: Vec<&'a str>,
    attachment_links: Vec<String>,
}

impl<'a> Scanner<'a> {
    fn new(options: &'a ParserOptions) -> Self {
        Self {
            options,
            state: ParseState::Header,
            sender: None,
            raw_date: None,
            subject: None,
            body_lines: Vec::new(),
            attachment_links: Vec::new(),
        }
    }

    fn feed(&mut self, line: &'a str) -> Result<(), RejectReason> {
        self.state = match self.state {
            ParseState::Header => self.header_line(line)?,
            ParseState::Body => self.body_line(line),
            ParseState::Attachments => self.attachment_line(line),
            ParseState::Done => ParseState::Done,
        };
        Ok(())
    }

    fn header_line(&mut self, line: &str) -> Result<ParseState, RejectReason> {
        if line.trim().is_empty() {
            return Ok(ParseState::Body);
        }

        if let Some(value) = line.strip_prefix("From:") {
            self.sender = Some(resolve_sender(value, &self.options.institution_marker));
        } else if let Some(value) = line.strip_prefix("Date:") {
            self.raw_date = Some(value.trim().to_string());
        } else if let Some(value) = line.strip_prefix("Subject:") {
            let (list, subject) = MailingList::split_subject(value);
            if is_not_an_offer(&subject) {
                return Err(RejectReason::NotAnOffer);
            }
            self.subject = Some((list, subject));
        } else if line.starts_with("In-Reply-To:") {
            return Err(RejectReason::Reply);
        }
        // Message-ID and any other header are skipped.

        Ok(ParseState::Header)
    }

    fn body_line(&mut self, line: &'a str) -> ParseState {
        if is_boundary(line) {
            return ParseState::Attachments;
        }
        self.body_lines.push(line);
        ParseState::Body
    }

    fn attachment_line(&mut self, line: &str) -> ParseState {
        self.attachment_links.extend(
            extract_urls(line)
                .into_iter()
                .filter(|url| self.options.link_filter.allows(url)),
        );
        ParseState::Attachments
    }

    fn finish(mut self) -> Result<Posting, RejectReason> {
        self.state = ParseState::Done;

        let (mailing_list, subject) = self
            .subject
            .filter(|(_, s)| !s.is_empty())
            .ok_or(RejectReason::MissingSubject)?;

        let posted_at = self.raw_date.unwrap_or_default();
        let timestamp = parse_posting_date(&posted_at).ok_or(RejectReason::UnparseableDate)?;

        let sender = self.sender.unwrap_or(Sender {
            address: String::new(),
            name: String::new(),
            needs_lookup: false,
        });

        let body = self.body_lines.join("\n").trim().to_string();
        let links = self.options.link_filter.extract(&body);

        Ok(Posting {
            subject,
            sender_lookup: sender.needs_lookup.then(|| sender.address.clone()),
            sender_address: sender.address,
            sender_name: sender.name,
            posted_at,
            timestamp,
            mailing_list,
            body,
            links,
            attachment_links: self.attachment_links,
            relocated_image_urls: Vec::new(),
            location: LOCATION_NOT_FOUND.to_string(),
            can_self_pickup: false,
        })
    }
}

/// Subjects that are list traffic rather than new offers.
fn is_not_an_offer(subject: &str) -> bool {
    let lower = subject.to_lowercase();
    if ["re:", "fwd:", "fw:"].iter().any(|p| lower.starts_with(p)) {
        return true;
    }
    [MailingList::Reuse, MailingList::FreeFood]
        .iter()
        .filter_map(MailingList::digest_author)
        .any(|author| subject.starts_with(&format!("{author} Digest")))
}

/// Lines that end the body and start the trailing attachment section.
fn is_boundary(line: &str) -> bool {
    let trimmed = line.trim_end();
    trimmed == NEXT_PART_MARKER
        || trimmed.ends_with(SCRUBBED_SUFFIX)
        || trimmed.starts_with(OUTLOOK_SIGNATURE_PREFIX)
        || (trimmed.len() >= FOOTER_RULE_MIN_LEN && trimmed.chars().all(|c| c == '_'))
}
