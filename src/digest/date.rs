//! Date header parsing.
//!
//! Archives carry two shapes of date: the RFC 2822 style written by mail
//! servers, and the long form some clients paste into forwarded text.

use chrono::{DateTime, NaiveDateTime, Utc};

const MAIL_FORMAT: &str = "%a, %d %b %Y %H:%M:%S %z";
const LONG_FORMAT: &str = "%A, %B %d, %Y at %I:%M%p";

/// Parse a `Date:` header value into UTC.
///
/// Literal `?` characters (mangled non-breaking spaces) and a trailing
/// `(TZ)` comment are ignored. Returns `None` when neither format matches.
#[must_use]
pub fn parse_posting_date(raw: &str) -> Option<DateTime<Utc>> {
    let cleaned: String = raw.chars().filter(|c| *c != '?').collect();
    let cleaned = strip_zone_comment(cleaned.trim());

    if let Ok(dt) = DateTime::parse_from_str(cleaned, MAIL_FORMAT) {
        return Some(dt.with_timezone(&Utc));
    }

    NaiveDateTime::parse_from_str(cleaned, LONG_FORMAT)
        .ok()
        .map(|naive| naive.and_utc())
}

fn strip_zone_comment(value: &str) -> &str {
    match value.find(" (") {
        Some(idx) if value.ends_with(')') => value[..idx].trim_end(),
        _ => value,
    }
}

/// Canonical storage form; lexicographic order matches time order.
#[must_use]
pub fn to_storage(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(chrono::SecondsFormat::Secs, true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_mail_format() {
        let parsed = parse_posting_date("Tue, 10 Sep 2024 14:03:22 -0400").unwrap();
        assert_eq!(parsed, Utc.with_ymd_and_hms(2024, 9, 10, 18, 3, 22).unwrap());
    }

    #[test]
    fn test_single_digit_day_and_zone_comment() {
        let parsed = parse_posting_date("Wed, 4 Sep 2024 09:00:00 -0400 (EDT)").unwrap();
        assert_eq!(parsed, Utc.with_ymd_and_hms(2024, 9, 4, 13, 0, 0).unwrap());
    }

    #[test]
    fn test_long_format() {
        let parsed = parse_posting_date("Tuesday, September 10, 2024 at 2:03PM").unwrap();
        assert_eq!(parsed, Utc.with_ymd_and_hms(2024, 9, 10, 14, 3, 0).unwrap());
    }

    #[test]
    fn test_question_marks_are_stripped() {
        let parsed = parse_posting_date("Tuesday, September 10, 2024 at 2:03?PM").unwrap();
        assert_eq!(parsed, Utc.with_ymd_and_hms(2024, 9, 10, 14, 3, 0).unwrap());
    }

    #[test]
    fn test_unparseable() {
        assert!(parse_posting_date("").is_none());
        assert!(parse_posting_date("last Tuesday").is_none());
        assert!(parse_posting_date("2024-09-10").is_none());
    }

    #[test]
    fn test_storage_form_orders_lexicographically() {
        let early = Utc.with_ymd_and_hms(2024, 9, 4, 9, 0, 0).unwrap();
        let late = Utc.with_ymd_and_hms(2024, 9, 10, 18, 3, 22).unwrap();
        assert_eq!(to_storage(&late), "2024-09-10T18:03:22Z");
        assert!(to_storage(&early) < to_storage(&late));
    }
}
