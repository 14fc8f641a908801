//! The reserved expiration metadata entry and its wire format.
//!
//! Expiration is soft: an item whose `Expires` entry is in the past is
//! treated as absent by readers and as reclaimable by the sweep, regardless
//! of whether the physical record still exists. Absence of the entry means
//! the item never expires.
//!
//! The timestamp format is fixed — UTC, second precision, no fractional
//! seconds, `Z` suffix — and must round-trip exactly so that independent
//! implementations sharing the same namespace agree on expiry.

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDateTime, Utc};

/// Reserved metadata key holding an item's expiration timestamp.
///
/// This key never appears in the metadata returned to callers and is
/// stripped from caller-supplied metadata on write; only the write
/// operation's explicit expiry parameter controls it.
pub const EXPIRES_METADATA_KEY: &str = "Expires";

/// `yyyy-MM-ddTHH:mm:ssZ`, second precision.
const EXPIRES_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

/// Formats an expiration instant as the reserved entry's value.
///
/// Sub-second precision is truncated; the stored value always round-trips
/// exactly through [`parse_expiry`].
#[must_use]
pub fn format_expiry(at: DateTime<Utc>) -> String {
    at.format(EXPIRES_FORMAT).to_string()
}

/// Parses a reserved entry's value. Returns `None` for anything that is not
/// exactly in the fixed format.
#[must_use]
pub fn parse_expiry(value: &str) -> Option<DateTime<Utc>> {
    NaiveDateTime::parse_from_str(value, EXPIRES_FORMAT).ok().map(|dt| dt.and_utc())
}

/// Extracts the expiration instant from a raw metadata map.
///
/// An unparseable entry is treated as "never expires": failing closed would
/// make a single corrupt entry permanently unreadable and unsweepable,
/// while failing open leaves the item visible until a later write repairs
/// the entry.
#[must_use]
pub fn expiry_from_metadata(metadata: &BTreeMap<String, String>) -> Option<DateTime<Utc>> {
    let raw = metadata.get(EXPIRES_METADATA_KEY)?;
    let parsed = parse_expiry(raw);
    if parsed.is_none() {
        tracing::warn!(value = %raw, "unparseable expiration metadata entry, treating as non-expiring");
    }
    parsed
}
