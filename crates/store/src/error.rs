//! Error types and result aliases.
//!
//! Two layers of errors exist in this crate:
//!
//! - [`BlobError`] — produced by [`BlobStore`](crate::BlobStore) adapters. The
//!   conditional variants (`NotFound`, `NotModified`, `PreconditionFailed`)
//!   are part of the normal protocol and are translated by
//!   [`ItemStore`](crate::ItemStore) into outcome values rather than errors.
//! - [`StoreError`] — surfaced by [`ItemStore`](crate::ItemStore) operations.
//!   Wraps any blob error that is not absorbed into an outcome, plus the
//!   strict-mode not-found signal and cooperative cancellation.
//!
//! Adapters map their internal failures onto [`BlobError`]; see the
//! `keel-store-fs` crate for a reference mapping.

use std::sync::Arc;

use thiserror::Error;

/// A boxed error type for source chain tracking.
pub type BoxError = Arc<dyn std::error::Error + Send + Sync>;

/// Result type alias for [`BlobStore`](crate::BlobStore) operations.
pub type BlobResult<T> = Result<T, BlobError>;

/// Result type alias for [`ItemStore`](crate::ItemStore) operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors produced at the object-storage boundary.
///
/// The first three variants are *conditional responses*: they signal that a
/// request's preconditions did their job, not that something is broken. The
/// item-store layer converts them into [`ReadOutcome`](crate::ReadOutcome) /
/// [`WriteOutcome`](crate::WriteOutcome) values. Everything else propagates
/// unchanged — this crate performs no retries on behalf of the caller.
///
/// # Non-exhaustive
///
/// New variants may be added in future minor releases without a semver-breaking
/// change. Downstream match expressions must include a wildcard arm.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum BlobError {
    /// The blob does not exist at the requested location.
    #[error("blob not found: {location}")]
    NotFound {
        /// The location that was not found.
        location: String,
    },

    /// A conditional read matched the caller's cached version.
    #[error("blob not modified")]
    NotModified,

    /// A write/delete precondition (`if-match` / `if-unmodified-since`) was
    /// violated by a concurrent modification.
    #[error("blob precondition failed")]
    PreconditionFailed,

    /// A lease on the blob is held by another party, or a mutation was
    /// attempted with a missing or mismatched lease id.
    #[error("lease conflict: {location}")]
    Conflict {
        /// The location whose lease is contended.
        location: String,
    },

    /// Failure to communicate with the storage service.
    #[error("connection error: {message}")]
    Connection {
        /// Description of the connection error.
        message: String,
        /// The underlying error that caused this connection failure.
        #[source]
        source: Option<BoxError>,
    },

    /// The operation exceeded its configured time limit.
    #[error("operation timeout")]
    Timeout,

    /// Adapter-specific internal error.
    #[error("internal error: {message}")]
    Internal {
        /// Description of the internal error.
        message: String,
        /// The underlying error that caused this internal failure.
        #[source]
        source: Option<BoxError>,
    },
}

impl BlobError {
    /// Creates a new `NotFound` error for the given location.
    #[must_use]
    pub fn not_found(location: impl Into<String>) -> Self {
        Self::NotFound { location: location.into() }
    }

    /// Creates a new `Conflict` error for the given location.
    #[must_use]
    pub fn conflict(location: impl Into<String>) -> Self {
        Self::Conflict { location: location.into() }
    }

    /// Creates a new `Connection` error with the given message.
    #[must_use]
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection { message: message.into(), source: None }
    }

    /// Creates a new `Connection` error with a message and source error.
    #[must_use]
    pub fn connection_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Connection { message: message.into(), source: Some(Arc::new(source)) }
    }

    /// Creates a new `Internal` error with the given message.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal { message: message.into(), source: None }
    }

    /// Creates a new `Internal` error with a message and source error.
    #[must_use]
    pub fn internal_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Internal { message: message.into(), source: Some(Arc::new(source)) }
    }

    /// Creates a new `Timeout` error.
    #[must_use]
    pub fn timeout() -> Self {
        Self::Timeout
    }

    /// True for the conditional-response variants that the read/write paths
    /// translate into outcome values instead of surfacing as errors.
    #[must_use]
    pub fn is_conditional(&self) -> bool {
        matches!(self, Self::NotFound { .. } | Self::NotModified | Self::PreconditionFailed)
    }
}

/// Errors surfaced by [`ItemStore`](crate::ItemStore) operations.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StoreError {
    /// The item is absent or logically expired, and the caller opted into
    /// strict not-found signaling via
    /// [`ReadOptions::require_exists`](crate::ReadOptions::require_exists).
    #[error("item not found: {key}")]
    NotFound {
        /// The key that was not found.
        key: String,
    },

    /// The operation's cancellation signal fired before any mutating call
    /// was issued.
    #[error("operation cancelled")]
    Cancelled,

    /// An unabsorbed error from the underlying blob store, propagated
    /// unchanged.
    #[error(transparent)]
    Blob(#[from] BlobError),
}
