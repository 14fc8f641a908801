//! Namespace addressing: validated key/partition newtypes and the resolver.
//!
//! A storage location is the concatenation of a partition prefix and an item
//! key, joined by a single `/`, matching the hierarchical addressing
//! convention of the underlying blob namespace. Resolution is a pure
//! function — no I/O, no side effects.

use std::fmt;

use thiserror::Error;

/// Hierarchical path separator of the blob namespace.
pub const SEPARATOR: char = '/';

/// Error returned when an [`ItemKey`] fails validation.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum InvalidKey {
    /// Keys must be non-empty.
    #[error("item key must not be empty")]
    Empty,
    /// A leading separator would escape the partition prefix.
    #[error("item key must not start with '{SEPARATOR}'")]
    LeadingSeparator,
}

/// A validated item key, unique within a partition.
///
/// Keys are non-empty and never start with the namespace separator; interior
/// separators are allowed (a key may itself be hierarchical).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ItemKey(String);

impl ItemKey {
    /// Validates and wraps a key string.
    pub fn new(key: impl Into<String>) -> Result<Self, InvalidKey> {
        let key = key.into();
        if key.is_empty() {
            return Err(InvalidKey::Empty);
        }
        if key.starts_with(SEPARATOR) {
            return Err(InvalidKey::LeadingSeparator);
        }
        Ok(Self(key))
    }

    /// Returns the raw key string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ItemKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::str::FromStr for ItemKey {
    type Err = InvalidKey;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

/// A hierarchical path prefix grouping items, analogous to a directory.
///
/// Any string is a valid partition; the empty string is the namespace root.
/// Trailing separators are tolerated and normalized away at resolve time.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Partition(String);

impl Partition {
    /// Wraps a partition path.
    #[must_use]
    pub fn new(path: impl Into<String>) -> Self {
        Self(path.into())
    }

    /// The namespace root (empty prefix).
    #[must_use]
    pub fn root() -> Self {
        Self(String::new())
    }

    /// Returns the raw partition path.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// True when this partition is the namespace root.
    #[must_use]
    pub fn is_root(&self) -> bool {
        self.0.trim_end_matches(SEPARATOR).is_empty()
    }

    /// The partition as a listing prefix: normalized path plus a trailing
    /// separator, or the empty string for the root.
    #[must_use]
    pub fn as_prefix(&self) -> String {
        let trimmed = self.0.trim_end_matches(SEPARATOR);
        if trimmed.is_empty() { String::new() } else { format!("{trimmed}{SEPARATOR}") }
    }
}

impl fmt::Display for Partition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Maps a (key, partition) pair to its single addressable storage location.
#[must_use]
pub fn resolve(key: &ItemKey, partition: &Partition) -> String {
    let prefix = partition.0.trim_end_matches(SEPARATOR);
    if prefix.is_empty() {
        key.as_str().to_owned()
    } else {
        format!("{prefix}{SEPARATOR}{key}")
    }
}
