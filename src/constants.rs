//! Shared constants used across the application.

/// User agent string used for archive and collaborator requests.
pub const USER_AGENT: &str = "mailman-digest-ingest/0.1";

/// Location reported when the pickup location is unknown.
pub const LOCATION_NOT_FOUND: &str = "Location not found";

/// Separator pipermail inserts before each scrubbed attachment.
pub const NEXT_PART_MARKER: &str = "-------------- next part --------------";

/// Suffix of the line pipermail writes in place of a removed attachment.
pub const SCRUBBED_SUFFIX: &str = "attachment was scrubbed...";

/// Mail-client signature that starts trailing boilerplate.
pub const OUTLOOK_SIGNATURE_PREFIX: &str = "Get Outlook for";

/// Underscore rules at least this long separate quoted replies and list footers.
pub const FOOTER_RULE_MIN_LEN: usize = 32;
