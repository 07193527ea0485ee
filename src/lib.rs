//! Mailman digest ingester library.
//!
//! Fetches private mailman digest archives for free-stuff lists, splits them
//! into individual offers, filters repeats, enriches each offer with a pickup
//! location, re-hosts scrubbed images, and records the result in SQLite.

// Allow raw string hashes for safety - they're harmless and prevent issues if content changes
#![allow(clippy::needless_raw_string_hashes)]

pub mod config;
pub mod constants;
pub mod db;
pub mod dedup;
pub mod digest;
pub mod enrich;
pub mod mailman;
pub mod pipeline;
pub mod relocate;
pub mod s3;
