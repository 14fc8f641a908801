//! Shared test utilities for item-store and adapter testing.
//!
//! This module provides helpers for creating test stores, generating test
//! data, and asserting on results. It is feature-gated behind `testutil` to
//! prevent leaking into production builds.
//!
//! # Usage
//!
//! In integration tests, enable the feature in `Cargo.toml`:
//!
//! ```toml
//! [dev-dependencies]
//! keel-store = { path = "../store", features = ["testutil"] }
//! ```

use std::sync::Arc;

use bytes::Bytes;
use chrono::{DateTime, Duration, Utc};

use crate::{
    config::StoreConfig,
    location::ItemKey,
    memory::MemoryBlobStore,
    store::{ItemStore, WriteOptions},
};

/// Create a deterministic test key from a prefix and index.
///
/// Produces keys like `"prefix:000042"` (zero-padded to 6 digits) so that
/// lexicographic ordering matches numeric ordering in listings.
///
/// # Panics
///
/// Panics if `prefix` makes the key invalid (empty prefixes are fine; the
/// index suffix keeps the key non-empty).
#[must_use]
#[allow(clippy::expect_used)]
pub fn make_key(prefix: &str, idx: usize) -> ItemKey {
    ItemKey::new(format!("{prefix}:{idx:06}")).expect("generated test keys are valid")
}

/// Create test content of the given size filled with `0xAB` bytes.
#[must_use]
pub fn make_content(size: usize) -> Bytes {
    Bytes::from(vec![0xAB; size])
}

/// An expiration instant `seconds` in the past.
#[must_use]
pub fn expired_since(seconds: i64) -> DateTime<Utc> {
    Utc::now() - Duration::seconds(seconds)
}

/// An expiration instant `seconds` in the future.
#[must_use]
pub fn expires_in(seconds: i64) -> DateTime<Utc> {
    Utc::now() + Duration::seconds(seconds)
}

/// Create an [`ItemStore`] over a fresh [`MemoryBlobStore`], pre-populated
/// with `count` keys under `prefix`.
///
/// Returns the store together with the underlying adapter so tests can
/// inspect raw namespace state (e.g. physical records of logically expired
/// items).
///
/// # Panics
///
/// Panics if any write fails (should not happen with `MemoryBlobStore`).
#[allow(clippy::expect_used)]
pub async fn populated_store(
    config: StoreConfig,
    prefix: &str,
    count: usize,
) -> (ItemStore, Arc<MemoryBlobStore>) {
    let client = Arc::new(MemoryBlobStore::new());
    let store = ItemStore::new(client.clone(), config);
    for i in 0..count {
        store
            .write(&make_key(prefix, i), make_content(16), WriteOptions::default())
            .await
            .expect("populate write failed");
    }
    (store, client)
}

/// Assert that a result is `Err(BlobError::Conflict { .. })` (possibly
/// wrapped in a [`StoreError::Blob`](crate::StoreError::Blob)).
#[macro_export]
macro_rules! assert_conflict {
    ($result:expr) => {
        match &$result {
            Err($crate::StoreError::Blob($crate::BlobError::Conflict { .. })) => {},
            other => panic!("expected lease conflict, got: {other:?}"),
        }
    };
}

/// Assert that a read outcome is `NotFound`.
#[macro_export]
macro_rules! assert_read_not_found {
    ($outcome:expr) => {
        match &$outcome {
            $crate::ReadOutcome::NotFound => {},
            other => panic!("expected ReadOutcome::NotFound, got: {other:?}"),
        }
    };
}

/// Assert that a write outcome is `PreconditionFailed`, ignoring the
/// carried properties.
#[macro_export]
macro_rules! assert_write_precondition_failed {
    ($outcome:expr) => {
        match &$outcome {
            $crate::WriteOutcome::PreconditionFailed(_) => {},
            other => panic!("expected WriteOutcome::PreconditionFailed, got: {other:?}"),
        }
    };
}

/// Unwrap a [`ReadOutcome::Found`](crate::ReadOutcome::Found) into its item.
#[macro_export]
macro_rules! assert_found {
    ($outcome:expr) => {
        match $outcome {
            $crate::ReadOutcome::Found(item) => item,
            other => panic!("expected ReadOutcome::Found, got: {other:?}"),
        }
    };
}
