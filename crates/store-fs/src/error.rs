//! Error types for the filesystem adapter.
//!
//! This module maps filesystem-level failures onto the generic
//! [`BlobError`](keel_store::BlobError) taxonomy so that callers of the
//! [`BlobStore`](keel_store::BlobStore) trait see the same error surface
//! regardless of the backing technology.

use keel_store::BlobError;
use thiserror::Error;

/// Result type alias for filesystem adapter operations.
pub type Result<T> = std::result::Result<T, FsStoreError>;

/// Errors specific to the filesystem adapter.
#[derive(Debug, Error)]
pub enum FsStoreError {
    /// An I/O operation failed.
    #[error("I/O error at {path}: {source}")]
    Io {
        /// The path involved.
        path: String,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// A metadata sidecar document could not be encoded or decoded.
    #[error("metadata document error at {path}: {source}")]
    Sidecar {
        /// The sidecar path involved.
        path: String,
        /// The underlying JSON error.
        #[source]
        source: serde_json::Error,
    },

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),
}

impl FsStoreError {
    pub(crate) fn io(path: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io { path: path.into(), source }
    }

    pub(crate) fn sidecar(path: impl Into<String>, source: serde_json::Error) -> Self {
        Self::Sidecar { path: path.into(), source }
    }
}

impl From<FsStoreError> for BlobError {
    fn from(err: FsStoreError) -> Self {
        match err {
            FsStoreError::Io { path, source } => {
                if source.kind() == std::io::ErrorKind::NotFound {
                    BlobError::not_found(path)
                } else {
                    BlobError::internal_with_source(format!("I/O failure at {path}"), source)
                }
            },
            FsStoreError::Sidecar { path, source } => {
                // A corrupt sidecar means the record cannot be interpreted
                // at all; surfaced as internal so callers do not mistake it
                // for logical absence.
                tracing::error!(path = %path, error = %source, "corrupt metadata sidecar");
                BlobError::internal_with_source(format!("corrupt sidecar at {path}"), source)
            },
            FsStoreError::Config(message) => BlobError::internal(format!("config: {message}")),
        }
    }
}
