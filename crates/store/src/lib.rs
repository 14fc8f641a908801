//! Conditional key/value store over a hierarchical blob namespace.
//!
//! This crate provides [`ItemStore`], a key/value abstraction layered over
//! an abstract object-storage client ([`BlobStore`]), with:
//!
//! - **Optimistic concurrency** — every write assigns a fresh ETag; callers
//!   pass the tag they last observed and handle
//!   [`WriteOutcome::PreconditionFailed`] by re-reading.
//! - **Leased mutations** — optionally, writes and deletes against existing
//!   items hold a time-bound exclusive lease for the span of the mutation.
//! - **Soft expiry** — items carry an optional expiration instant in a
//!   reserved metadata entry; expired items read as absent even before
//!   their physical record is reclaimed.
//! - **Expiration sweep** — an idempotent batch pass that physically
//!   deletes expired items, tolerant of concurrent readers and writers.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                       Caller                                │
//! │   read / write / delete / sweep_expired                     │
//! ├─────────────────────────────────────────────────────────────┤
//! │                      ItemStore                              │
//! │   namespace resolution │ expiry policy │ lease orchestration│
//! ├─────────────────────────────────────────────────────────────┤
//! │                    BlobStore trait                          │
//! │   exists, get_properties, open_read, upload, delete,        │
//! │   snapshot, acquire/release_lease, list_entries             │
//! ├──────────────┬──────────────────────────────────────────────┤
//! │ MemoryBlobStore │           FsBlobStore                     │
//! │  (testing)      │        (in `keel-store-fs`)               │
//! └──────────────┴──────────────────────────────────────────────┘
//! ```
//!
//! # Quick Start
//!
//! ```
//! use std::sync::Arc;
//!
//! use bytes::Bytes;
//! use keel_store::{
//!     ItemKey, ItemStore, MemoryBlobStore, ReadOptions, ReadOutcome, StoreConfig, WriteOptions,
//! };
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let store = ItemStore::new(Arc::new(MemoryBlobStore::new()), StoreConfig::default());
//!     let key = ItemKey::new("greeting")?;
//!
//!     store.write(&key, Bytes::from("hello"), WriteOptions::default()).await?;
//!
//!     if let ReadOutcome::Found(item) = store.read(&key, ReadOptions::default()).await? {
//!         assert_eq!(item.content, Bytes::from("hello"));
//!     }
//!     Ok(())
//! }
//! ```
//!
//! # Implementing an Adapter
//!
//! 1. Implement the [`BlobStore`] trait.
//! 2. Map backend-specific failures onto [`BlobError`].
//! 3. Run the [`conformance`] suite against the adapter (enable the
//!    `testutil` feature).
//!
//! See the [`memory`] module for a reference implementation and the
//! `keel-store-fs` crate for a durable one.
//!
//! # Error Handling
//!
//! The common conditional paths are outcome values, not errors: absent and
//! expired items read as [`ReadOutcome::NotFound`], matched conditionals as
//! [`ReadOutcome::NotModified`], lost write races as
//! [`WriteOutcome::PreconditionFailed`]. Lease contention surfaces as
//! [`BlobError::Conflict`]; everything else propagates unchanged. This
//! crate never retries — transient-failure handling belongs to the adapter
//! or its SDK.

#![deny(unsafe_code)]

pub mod blob;
#[allow(clippy::expect_used)]
#[cfg(any(test, feature = "testutil"))]
pub mod conformance;
pub mod config;
pub mod error;
pub mod expiry;
pub mod location;
pub mod memory;
pub mod metrics;
pub mod store;
pub mod suppress;
#[cfg(any(test, feature = "testutil"))]
pub mod testutil;

// Re-export primary types at crate root for convenience
pub use blob::{
    BlobEntry, BlobProperties, BlobStore, ContinuationToken, Etag, LeaseId, ListPage,
    ReadConditions, UploadArgs, WriteConditions,
};
pub use config::{
    ConfigError, MAX_LEASE_DURATION, MIN_LEASE_DURATION, StoreConfig, VersioningPolicy,
};
pub use error::{BlobError, BlobResult, BoxError, StoreError, StoreResult};
pub use expiry::EXPIRES_METADATA_KEY;
pub use location::{InvalidKey, ItemKey, Partition};
pub use memory::MemoryBlobStore;
pub use metrics::{Metrics, MetricsSnapshot};
pub use store::{
    DeleteOptions, DeleteOutcome, Item, ItemProperties, ItemStore, ReadOptions, ReadOutcome,
    SweepOptions, WriteOptions, WriteOutcome,
};
pub use suppress::{LogSuppressed, SuppressedErrorHook};
