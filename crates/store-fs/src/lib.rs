//! Filesystem-backed implementation of the
//! [`BlobStore`](keel_store::BlobStore) interface for `keel-store`.
//!
//! This crate provides [`FsBlobStore`], a durable adapter that lays a blob
//! namespace out as plain files under a root directory: content files,
//! JSON metadata sidecars, lease files with wall-clock expiry, and
//! snapshot copies. It implements the full conditional-access surface the
//! [`ItemStore`](keel_store::ItemStore) core builds on, and passes the
//! same [`conformance`](keel_store::conformance) suite as the in-memory
//! adapter.
//!
//! # Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use bytes::Bytes;
//! use keel_store::{ItemKey, ItemStore, StoreConfig, WriteOptions};
//! use keel_store_fs::{FsBlobStore, FsStoreConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = FsStoreConfig::builder().root("/var/lib/keel").build()?;
//!     let client = Arc::new(FsBlobStore::new(config).await?);
//!     let store = ItemStore::new(client, StoreConfig::default());
//!
//!     let key = ItemKey::new("greeting")?;
//!     store.write(&key, Bytes::from("hello"), WriteOptions::default()).await?;
//!     Ok(())
//! }
//! ```
//!
//! # Scope
//!
//! The adapter arbitrates concurrent access within one process. Sharing a
//! root directory between processes is not coordinated beyond the
//! atomicity of file renames.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod backend;
mod config;
mod error;

/// Filesystem-backed blob store.
pub use backend::FsBlobStore;
/// Configuration for the filesystem adapter.
pub use config::FsStoreConfig;
/// Filesystem-specific error type and result alias.
pub use error::{FsStoreError, Result};
