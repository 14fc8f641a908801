//! The object-storage boundary: the [`BlobStore`] trait and its wire types.
//!
//! This trait is the only external dependency of the item-store core. It
//! models a hierarchical blob namespace with conditional access primitives:
//! ETag / modification-time preconditions, time-bound exclusive leases,
//! point-in-time snapshots, and paginated listing with per-entry metadata.
//!
//! Adapters exist per backing technology — [`MemoryBlobStore`](crate::MemoryBlobStore)
//! in this crate for tests and development, `FsBlobStore` in `keel-store-fs`
//! for local durable storage. All adapters are expected to be thread-safe
//! (`Send + Sync`) and to pass the [`conformance`](crate::conformance) suite.
//!
//! # Condition semantics
//!
//! | Request condition | Satisfied when | Violated response |
//! |-------------------|----------------|-------------------|
//! | `if_none_match` (read) | stored ETag differs | [`BlobError::NotModified`] |
//! | `if_modified_since` (read) | stored `last_modified` is later | [`BlobError::NotModified`] |
//! | `if_match` (write/delete) | stored ETag is equal | [`BlobError::PreconditionFailed`] |
//! | `if_unmodified_since` (write) | stored `last_modified` is not later | [`BlobError::PreconditionFailed`] |
//!
//! An `if_match` condition against a missing blob is a precondition failure,
//! not a not-found: the caller asserted a version that cannot exist.

use std::{collections::BTreeMap, fmt, time::Duration};

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};

use crate::error::BlobResult;

/// Opaque version token assigned by the store on every successful write.
///
/// Tags compare by exact string equality; callers echo them back as
/// preconditions and must not interpret their contents.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Etag(String);

impl Etag {
    /// Wraps a raw tag string.
    #[must_use]
    pub fn new(tag: impl Into<String>) -> Self {
        Self(tag.into())
    }

    /// Returns the raw tag string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Etag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifier of an exclusive lease held on a single blob.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeaseId(String);

impl LeaseId {
    /// Wraps a raw lease id string.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the raw lease id string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for LeaseId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Opaque continuation token for resuming a paginated listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContinuationToken(String);

impl ContinuationToken {
    /// Wraps a raw token string.
    #[must_use]
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// Returns the raw token string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Full property set of a stored blob, as the store reports it.
///
/// The metadata map is raw: it includes the reserved expiration entry when
/// one is set. The item-store layer strips that entry before handing
/// metadata to callers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlobProperties {
    /// Version tag assigned by the store on the last write.
    pub etag: Etag,
    /// When the blob was first created.
    pub created_at: DateTime<Utc>,
    /// When the blob's content or metadata last changed.
    pub last_modified: DateTime<Utc>,
    /// MIME content type, if one was supplied on upload.
    pub content_type: Option<String>,
    /// Content encoding, if one was supplied on upload.
    pub content_encoding: Option<String>,
    /// Content length in bytes.
    pub content_length: u64,
    /// Raw metadata map, reserved entries included.
    pub metadata: BTreeMap<String, String>,
}

/// Preconditions for read operations.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReadConditions {
    /// Succeed only if the stored ETag differs from this one.
    pub if_none_match: Option<Etag>,
    /// Succeed only if the blob was modified after this instant.
    pub if_modified_since: Option<DateTime<Utc>>,
}

/// Preconditions for write and delete operations.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WriteConditions {
    /// Succeed only if the stored ETag equals this one.
    pub if_match: Option<Etag>,
    /// Succeed only if the blob was not modified after this instant.
    pub if_unmodified_since: Option<DateTime<Utc>>,
}

/// Everything an [`upload`](BlobStore::upload) carries besides the content.
#[derive(Debug, Clone, Default)]
pub struct UploadArgs {
    /// MIME content type to record.
    pub content_type: Option<String>,
    /// Content encoding to record.
    pub content_encoding: Option<String>,
    /// Metadata map to store. Replaces the previous map entirely.
    pub metadata: BTreeMap<String, String>,
    /// Write preconditions.
    pub conditions: WriteConditions,
    /// Lease id to present, when the blob is leased by this caller.
    pub lease: Option<LeaseId>,
}

/// A single entry returned by [`list_entries`](BlobStore::list_entries).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlobEntry {
    /// The blob's full location within the namespace.
    pub location: String,
    /// The blob's properties, metadata included.
    pub properties: BlobProperties,
}

/// One page of a listing.
#[derive(Debug, Clone)]
pub struct ListPage {
    /// Entries in this page, in ascending location order.
    pub entries: Vec<BlobEntry>,
    /// Token for the next page, absent when the listing is exhausted.
    pub next: Option<ContinuationToken>,
}

/// Abstract object-storage client over a hierarchical blob namespace.
///
/// Implementations own connection management, authentication, and transient
/// retry — none of that leaks through this interface. Every method is a
/// single request against the remote store and may take store-latency time
/// to complete.
///
/// # Operations
///
/// | Method | Conditional responses |
/// |--------|----------------------|
/// | [`exists`](Self::exists) | — |
/// | [`get_properties`](Self::get_properties) | `NotFound` |
/// | [`open_read`](Self::open_read) | `NotFound`, `NotModified`, `PreconditionFailed` |
/// | [`upload`](Self::upload) | `PreconditionFailed`, `Conflict` |
/// | [`delete`](Self::delete) | `NotFound`, `PreconditionFailed`, `Conflict` |
/// | [`snapshot`](Self::snapshot) | `NotFound`, `PreconditionFailed`, `Conflict` |
/// | [`acquire_lease`](Self::acquire_lease) | `NotFound`, `Conflict` |
/// | [`release_lease`](Self::release_lease) | `Conflict` |
/// | [`list_entries`](Self::list_entries) | — |
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Returns whether a blob exists at `location`.
    #[must_use = "storage operations may fail and errors must be handled"]
    async fn exists(&self, location: &str) -> BlobResult<bool>;

    /// Fetches the blob's properties and metadata without its content.
    #[must_use = "storage operations may fail and errors must be handled"]
    async fn get_properties(&self, location: &str) -> BlobResult<BlobProperties>;

    /// Reads the blob's content, honoring read preconditions.
    ///
    /// Returns the property set observed at read time together with the
    /// content, so that a caller sees a consistent (properties, content)
    /// pair from a single request.
    #[must_use = "storage operations may fail and errors must be handled"]
    async fn open_read(
        &self,
        location: &str,
        conditions: &ReadConditions,
    ) -> BlobResult<(BlobProperties, Bytes)>;

    /// Creates or overwrites the blob, honoring write preconditions and an
    /// optional held lease. Returns the new property set.
    #[must_use = "storage operations may fail and errors must be handled"]
    async fn upload(
        &self,
        location: &str,
        content: Bytes,
        args: UploadArgs,
    ) -> BlobResult<BlobProperties>;

    /// Deletes the blob, honoring write preconditions and an optional held
    /// lease. Any snapshots of the blob are deleted with it.
    #[must_use = "storage operations may fail and errors must be handled"]
    async fn delete(
        &self,
        location: &str,
        conditions: &WriteConditions,
        lease: Option<&LeaseId>,
    ) -> BlobResult<()>;

    /// Captures a point-in-time copy of the blob's current content and
    /// metadata, honoring write preconditions.
    #[must_use = "storage operations may fail and errors must be handled"]
    async fn snapshot(
        &self,
        location: &str,
        conditions: &WriteConditions,
        lease: Option<&LeaseId>,
    ) -> BlobResult<()>;

    /// Acquires an exclusive lease on the blob for `duration`.
    ///
    /// Fails with [`Conflict`](crate::BlobError::Conflict) while another
    /// holder's lease is active. Duration bounds are a store-policy concern
    /// enforced by [`StoreConfig`](crate::StoreConfig); adapters accept any
    /// duration.
    #[must_use = "storage operations may fail and errors must be handled"]
    async fn acquire_lease(&self, location: &str, duration: Duration) -> BlobResult<LeaseId>;

    /// Releases a held lease.
    ///
    /// Releasing when no lease is active is a no-op; presenting a mismatched
    /// id is a [`Conflict`](crate::BlobError::Conflict).
    #[must_use = "storage operations may fail and errors must be handled"]
    async fn release_lease(&self, location: &str, lease: &LeaseId) -> BlobResult<()>;

    /// Lists blobs whose location starts with `prefix`, one page at a time.
    ///
    /// Pass the `next` token of the previous page to continue; a page with
    /// `next == None` ends the listing. Entries carry full properties and
    /// metadata so consumers can filter without further requests.
    #[must_use = "storage operations may fail and errors must be handled"]
    async fn list_entries(
        &self,
        prefix: &str,
        token: Option<&ContinuationToken>,
    ) -> BlobResult<ListPage>;
}
