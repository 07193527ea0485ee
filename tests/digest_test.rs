//! Integration tests for splitting and parsing digests.

use mailman_digest_ingest::config::Config;
use mailman_digest_ingest::digest::{
    parse_block, split_digest, MailingList, ParserOptions, RejectReason,
};

fn options() -> ParserOptions {
    ParserOptions::from_config(&Config::for_testing())
}

fn posting_block(sender: &str, date: &str, subject: &str, body: &str) -> String {
    format!(
        "From {sender}  Tue Sep 10 14:03:22 2024\nFrom: {sender} (Someone)\nDate: {date}\nSubject: {subject}\nMessage-ID: <{subject}@mit.edu>\n\n{body}\n\n"
    )
}

#[test]
fn test_single_posting_round_trip() {
    let raw = posting_block(
        "jdoe at mit.edu",
        "Tue, 10 Sep 2024 14:03:22 -0400",
        "[Reuse] Two office chairs",
        "  Two chairs by the elevator in building 4.  ",
    );

    let batch = split_digest(&raw, MailingList::Reuse, 30);
    assert_eq!(batch.blocks.len(), 1);

    let posting = parse_block(&batch.blocks[0], &options()).unwrap();
    assert_eq!(posting.subject, "Two office chairs");
    assert_eq!(posting.sender_address, "jdoe@mit.edu");
    assert_eq!(posting.sender_name, "Someone");
    assert_eq!(posting.body, "Two chairs by the elevator in building 4.");
    assert_eq!(posting.mailing_list, MailingList::Reuse);
}

#[test]
fn test_list_follows_subject_tag() {
    let cases = [
        ("[Reuse] Lamp", MailingList::Reuse, "Lamp"),
        ("[Free-food] Bagels in 32-G882", MailingList::FreeFood, "Bagels in 32-G882"),
        ("Lamp", MailingList::Unknown, "Lamp"),
    ];

    for (subject, list, stripped) in cases {
        let raw = posting_block("jdoe at mit.edu", "Tue, 10 Sep 2024 14:03:22 -0400", subject, "body");
        let batch = split_digest(&raw, MailingList::Reuse, 30);
        let posting = parse_block(&batch.blocks[0], &options()).unwrap();
        assert_eq!(posting.mailing_list, list, "{subject}");
        assert_eq!(posting.subject, stripped, "{subject}");
    }
}

#[test]
fn test_replies_and_forwards_never_become_postings() {
    for subject in ["Re: Lamp", "[Reuse] RE: Lamp", "FW: Lamp", "[Free-food] fwd: pizza"] {
        let raw = posting_block("jdoe at mit.edu", "Tue, 10 Sep 2024 14:03:22 -0400", subject, "body");
        let batch = split_digest(&raw, MailingList::Reuse, 30);
        assert_eq!(
            parse_block(&batch.blocks[0], &options()).unwrap_err(),
            RejectReason::NotAnOffer,
            "{subject}"
        );
    }
}

#[test]
fn test_long_form_date_is_accepted() {
    let raw = posting_block(
        "jdoe at mit.edu",
        "Tuesday, September 10, 2024 at 2:03PM",
        "[Reuse] Lamp",
        "body",
    );
    let batch = split_digest(&raw, MailingList::Reuse, 30);
    let posting = parse_block(&batch.blocks[0], &options()).unwrap();
    assert_eq!(posting.timestamp.to_rfc3339(), "2024-09-10T14:03:00+00:00");
}

#[test]
fn test_url_filter_applies_to_body_and_attachments() {
    let raw = "\
From: jdoe at mit.edu (Jane)
Date: Tue, 10 Sep 2024 14:03:22 -0400
Subject: [Reuse] Bike

Photos at https://photos.example.com/bike.jpg
Sent from https://aka.ms/mobile and http://mailman.example.edu/pipermail/reuse/000123.html
-------------- next part --------------
An HTML attachment was scrubbed...
URL: <http://mailman.example.edu/mailman/private/reuse/attachments/20240910/b/attachment.htm>
-------------- next part --------------
A non-text attachment was scrubbed...
URL: <http://mailman.example.edu/mailman/private/reuse/attachments/20240910/b/bike.png>
";
    let batch = split_digest(raw, MailingList::Reuse, 30);
    let posting = parse_block(&batch.blocks[0], &options()).unwrap();

    assert_eq!(posting.links, vec!["https://photos.example.com/bike.jpg"]);
    assert_eq!(
        posting.attachment_links,
        vec!["http://mailman.example.edu/mailman/private/reuse/attachments/20240910/b/bike.png"]
    );
    for url in posting.links.iter().chain(&posting.attachment_links) {
        assert!(!url.ends_with(".html") && !url.ends_with(".htm"));
        assert!(!url.contains("aka.ms"));
    }
}

#[test]
fn test_embedded_digest_is_skipped() {
    let mut raw = posting_block("jdoe at mit.edu", "Tue, 10 Sep 2024 14:03:22 -0400", "[Reuse] Lamp", "lamp");
    raw.push_str(
        "From: Reuse <reuse at mit.edu>\nSubject: Reuse Digest, Vol 12, Issue 3\n\nFrom: ghost at mit.edu (Ghost)\nSubject: [Reuse] Not real\n\nEnd of Reuse Digest, Vol 12, Issue 3\n**********\n",
    );
    raw.push_str(&posting_block("asmith at mit.edu", "Wed, 11 Sep 2024 09:00:00 -0400", "[Reuse] Mirror", "mirror"));

    let batch = split_digest(&raw, MailingList::Reuse, 30);
    let subjects: Vec<String> = batch
        .blocks
        .iter()
        .map(|b| parse_block(b, &options()).unwrap().subject)
        .collect();
    assert_eq!(subjects, vec!["Lamp", "Mirror"]);
}

#[test]
fn test_only_trailing_window_is_kept() {
    let raw: String = (1..=40)
        .map(|i| {
            posting_block(
                "jdoe at mit.edu",
                "Tue, 10 Sep 2024 14:03:22 -0400",
                &format!("[Reuse] Item {i}"),
                "body",
            )
        })
        .collect();

    let batch = split_digest(&raw, MailingList::Reuse, 30);
    assert_eq!(batch.total_blocks, 40);
    assert_eq!(batch.blocks.len(), 30);

    let first = parse_block(&batch.blocks[0], &options()).unwrap();
    let last = parse_block(&batch.blocks[29], &options()).unwrap();
    assert_eq!(first.subject, "Item 11");
    assert_eq!(last.subject, "Item 40");
}
