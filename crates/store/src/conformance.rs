//! Conformance test suite for [`BlobStore`] implementations.
//!
//! This module provides async test functions that validate whether a
//! [`BlobStore`] adapter correctly satisfies the trait contract — the
//! conditional-access semantics the item store builds on. Every adapter,
//! in-memory or durable, can run the same suite to ensure interoperability.
//!
//! # Usage
//!
//! Enable the `testutil` feature and call each conformance function with a
//! fresh adapter instance:
//!
//! ```no_run
//! use keel_store::{MemoryBlobStore, conformance};
//!
//! #[tokio::test]
//! async fn upload_then_read_round_trips() {
//!     conformance::upload_then_read_round_trips(&MemoryBlobStore::new()).await;
//! }
//! ```
//!
//! # Test Categories
//!
//! | Category | Contract aspect |
//! |----------|-----------------|
//! | Lifecycle | exists/upload/read/delete basics, ETag churn |
//! | Conditional | if-match / if-none-match / if-(un)modified-since |
//! | Lease | exclusivity, release, not-found acquisition |
//! | Listing | prefix scoping, ordering, continuation tokens |
//! | Metadata | round-trip and replace-on-overwrite |

use std::{collections::BTreeMap, time::Duration};

use bytes::Bytes;

use crate::{
    blob::{BlobStore, Etag, ReadConditions, UploadArgs, WriteConditions},
    error::BlobError,
};

fn plain() -> UploadArgs {
    UploadArgs::default()
}

// ============================================================================
// Lifecycle
// ============================================================================

/// `exists` is false before upload, true after, false after delete.
pub async fn exists_reflects_lifecycle<B: BlobStore>(store: &B) {
    assert!(!store.exists("life/k").await.expect("exists"), "missing blob should not exist");

    store.upload("life/k", Bytes::from("v"), plain()).await.expect("upload");
    assert!(store.exists("life/k").await.expect("exists after upload"));

    store.delete("life/k", &WriteConditions::default(), None).await.expect("delete");
    assert!(!store.exists("life/k").await.expect("exists after delete"));
}

/// Upload then read round-trips content, headers, and a non-empty ETag.
pub async fn upload_then_read_round_trips<B: BlobStore>(store: &B) {
    let mut args = plain();
    args.content_type = Some("text/plain".into());
    args.content_encoding = Some("identity".into());
    store.upload("rt/k", Bytes::from("payload"), args).await.expect("upload");

    let (properties, content) =
        store.open_read("rt/k", &ReadConditions::default()).await.expect("read");
    assert_eq!(content, Bytes::from("payload"));
    assert_eq!(properties.content_length, 7);
    assert_eq!(properties.content_type.as_deref(), Some("text/plain"));
    assert_eq!(properties.content_encoding.as_deref(), Some("identity"));
    assert!(!properties.etag.as_str().is_empty(), "ETag must be non-empty");
}

/// Every successful upload produces a fresh ETag and bumps `last_modified`
/// monotonically.
pub async fn upload_changes_etag<B: BlobStore>(store: &B) {
    let first = store.upload("tag/k", Bytes::from("a"), plain()).await.expect("first upload");
    let second = store.upload("tag/k", Bytes::from("b"), plain()).await.expect("second upload");

    assert_ne!(first.etag, second.etag, "overwrite must assign a new ETag");
    assert!(second.last_modified >= first.last_modified);
    assert_eq!(first.created_at, second.created_at, "creation time survives overwrite");
}

/// `get_properties` on a missing blob is `NotFound`.
pub async fn get_properties_missing_is_not_found<B: BlobStore>(store: &B) {
    let result = store.get_properties("ghost/k").await;
    assert!(matches!(result, Err(BlobError::NotFound { .. })), "got: {result:?}");
}

/// `delete` on a missing blob is `NotFound`.
pub async fn delete_missing_is_not_found<B: BlobStore>(store: &B) {
    let result = store.delete("ghost/k", &WriteConditions::default(), None).await;
    assert!(matches!(result, Err(BlobError::NotFound { .. })), "got: {result:?}");
}

// ============================================================================
// Conditional
// ============================================================================

/// Upload with a stale `if_match` fails and leaves content unchanged.
pub async fn upload_if_match_stale_fails<B: BlobStore>(store: &B) {
    store.upload("cond/k", Bytes::from("original"), plain()).await.expect("seed");

    let mut stale = plain();
    stale.conditions.if_match = Some(Etag::new("bogus-tag"));
    let result = store.upload("cond/k", Bytes::from("clobbered"), stale).await;
    assert!(matches!(result, Err(BlobError::PreconditionFailed)), "got: {result:?}");

    let (_, content) = store.open_read("cond/k", &ReadConditions::default()).await.expect("read");
    assert_eq!(content, Bytes::from("original"), "failed write must not alter content");
}

/// Upload with the current `if_match` succeeds.
pub async fn upload_if_match_current_succeeds<B: BlobStore>(store: &B) {
    let seeded = store.upload("cond/k", Bytes::from("v1"), plain()).await.expect("seed");

    let mut matched = plain();
    matched.conditions.if_match = Some(seeded.etag);
    store.upload("cond/k", Bytes::from("v2"), matched).await.expect("conditional upload");
}

/// `if_match` against a missing blob is a precondition failure, not
/// not-found.
pub async fn upload_if_match_on_missing_fails<B: BlobStore>(store: &B) {
    let mut conditional = plain();
    conditional.conditions.if_match = Some(Etag::new("any"));
    let result = store.upload("cond/ghost", Bytes::from("x"), conditional).await;
    assert!(matches!(result, Err(BlobError::PreconditionFailed)), "got: {result:?}");
}

/// Read with `if_none_match` equal to the current tag is `NotModified`.
pub async fn open_read_if_none_match_current_is_not_modified<B: BlobStore>(store: &B) {
    let seeded = store.upload("cond/k", Bytes::from("v"), plain()).await.expect("seed");

    let conditions = ReadConditions { if_none_match: Some(seeded.etag), if_modified_since: None };
    let result = store.open_read("cond/k", &conditions).await;
    assert!(matches!(result, Err(BlobError::NotModified)), "got: {result:?}");
}

/// Read with `if_modified_since` at or after the last write is
/// `NotModified`; an earlier instant reads normally.
pub async fn open_read_if_modified_since_semantics<B: BlobStore>(store: &B) {
    let seeded = store.upload("cond/k", Bytes::from("v"), plain()).await.expect("seed");

    let at_write = ReadConditions {
        if_none_match: None,
        if_modified_since: Some(seeded.last_modified),
    };
    let result = store.open_read("cond/k", &at_write).await;
    assert!(matches!(result, Err(BlobError::NotModified)), "got: {result:?}");

    let before_write = ReadConditions {
        if_none_match: None,
        if_modified_since: Some(seeded.last_modified - chrono::Duration::seconds(60)),
    };
    store.open_read("cond/k", &before_write).await.expect("read of since-modified blob");
}

/// Upload with `if_unmodified_since` before the last write fails.
pub async fn upload_if_unmodified_since_violation_fails<B: BlobStore>(store: &B) {
    let seeded = store.upload("cond/k", Bytes::from("v1"), plain()).await.expect("seed");

    let mut conditional = plain();
    conditional.conditions.if_unmodified_since =
        Some(seeded.last_modified - chrono::Duration::seconds(60));
    let result = store.upload("cond/k", Bytes::from("v2"), conditional).await;
    assert!(matches!(result, Err(BlobError::PreconditionFailed)), "got: {result:?}");
}

/// Conditional delete with the current tag succeeds; with a stale tag it
/// fails and the blob survives.
pub async fn delete_if_match_semantics<B: BlobStore>(store: &B) {
    let seeded = store.upload("cond/k", Bytes::from("v"), plain()).await.expect("seed");

    let stale =
        WriteConditions { if_match: Some(Etag::new("bogus-tag")), if_unmodified_since: None };
    let result = store.delete("cond/k", &stale, None).await;
    assert!(matches!(result, Err(BlobError::PreconditionFailed)), "got: {result:?}");
    assert!(store.exists("cond/k").await.expect("exists"), "blob must survive a failed delete");

    let current = WriteConditions { if_match: Some(seeded.etag), if_unmodified_since: None };
    store.delete("cond/k", &current, None).await.expect("conditional delete");
}

// ============================================================================
// Lease
// ============================================================================

/// While a lease is active, a second acquisition conflicts and unleased
/// mutations conflict; the holder mutates freely.
pub async fn lease_excludes_other_holders<B: BlobStore>(store: &B) {
    store.upload("lease/k", Bytes::from("v"), plain()).await.expect("seed");

    let lease = store.acquire_lease("lease/k", Duration::from_secs(15)).await.expect("acquire");

    let second = store.acquire_lease("lease/k", Duration::from_secs(15)).await;
    assert!(matches!(second, Err(BlobError::Conflict { .. })), "got: {second:?}");

    let blind = store.upload("lease/k", Bytes::from("intruder"), plain()).await;
    assert!(matches!(blind, Err(BlobError::Conflict { .. })), "got: {blind:?}");

    let mut held = plain();
    held.lease = Some(lease.clone());
    store.upload("lease/k", Bytes::from("holder"), held).await.expect("leased upload");

    store.release_lease("lease/k", &lease).await.expect("release");
}

/// After release, the location can be leased and mutated again.
pub async fn lease_release_allows_reacquisition<B: BlobStore>(store: &B) {
    store.upload("lease/k", Bytes::from("v"), plain()).await.expect("seed");

    let first = store.acquire_lease("lease/k", Duration::from_secs(15)).await.expect("acquire");
    store.release_lease("lease/k", &first).await.expect("release");

    let second =
        store.acquire_lease("lease/k", Duration::from_secs(15)).await.expect("reacquire");
    store.release_lease("lease/k", &second).await.expect("release again");

    store.upload("lease/k", Bytes::from("after"), plain()).await.expect("unleased upload");
}

/// Leases cannot be taken on missing blobs.
pub async fn acquire_lease_on_missing_is_not_found<B: BlobStore>(store: &B) {
    let result = store.acquire_lease("lease/ghost", Duration::from_secs(15)).await;
    assert!(matches!(result, Err(BlobError::NotFound { .. })), "got: {result:?}");
}

// ============================================================================
// Listing
// ============================================================================

/// Listing is prefix-scoped, ordered, and exhaustive across continuation
/// tokens.
pub async fn listing_is_prefix_scoped_ordered_and_exhaustive<B: BlobStore>(store: &B) {
    for i in 0..25 {
        store
            .upload(&format!("scan/{i:03}"), Bytes::from("v"), plain())
            .await
            .expect("upload scan entry");
    }
    store.upload("other/entry", Bytes::from("v"), plain()).await.expect("upload decoy");

    let mut seen = Vec::new();
    let mut token = None;
    loop {
        let page = store.list_entries("scan/", token.as_ref()).await.expect("list page");
        seen.extend(page.entries.into_iter().map(|entry| entry.location));
        match page.next {
            Some(next) => token = Some(next),
            None => break,
        }
    }

    let expected: Vec<String> = (0..25).map(|i| format!("scan/{i:03}")).collect();
    assert_eq!(seen, expected, "listing must be exhaustive, ordered, and prefix-scoped");
}

/// Listed entries carry properties and metadata without further requests.
pub async fn listing_entries_include_metadata<B: BlobStore>(store: &B) {
    let mut args = plain();
    args.metadata.insert("tier".into(), "gold".into());
    store.upload("scan/meta", Bytes::from("v"), args).await.expect("upload");

    let page = store.list_entries("scan/", None).await.expect("list");
    let entry = page
        .entries
        .iter()
        .find(|entry| entry.location == "scan/meta")
        .expect("uploaded entry must be listed");
    assert_eq!(entry.properties.metadata.get("tier").map(String::as_str), Some("gold"));
    assert!(!entry.properties.etag.as_str().is_empty());
}

// ============================================================================
// Metadata
// ============================================================================

/// Metadata round-trips through upload and property reads.
pub async fn metadata_round_trips<B: BlobStore>(store: &B) {
    let mut args = plain();
    args.metadata.insert("owner".into(), "alice".into());
    args.metadata.insert("env".into(), "staging".into());
    store.upload("meta/k", Bytes::from("v"), args).await.expect("upload");

    let properties = store.get_properties("meta/k").await.expect("get_properties");
    assert_eq!(properties.metadata.get("owner").map(String::as_str), Some("alice"));
    assert_eq!(properties.metadata.get("env").map(String::as_str), Some("staging"));
}

/// Overwrites replace the metadata map entirely; stale entries do not leak
/// through.
pub async fn metadata_replaced_on_overwrite<B: BlobStore>(store: &B) {
    let mut first = plain();
    first.metadata.insert("stale".into(), "yes".into());
    store.upload("meta/k", Bytes::from("v1"), first).await.expect("first upload");

    let mut second = plain();
    second.metadata.insert("fresh".into(), "yes".into());
    store.upload("meta/k", Bytes::from("v2"), second).await.expect("second upload");

    let properties = store.get_properties("meta/k").await.expect("get_properties");
    assert!(!properties.metadata.contains_key("stale"), "old metadata must be replaced");
    assert_eq!(properties.metadata.get("fresh").map(String::as_str), Some("yes"));
}
