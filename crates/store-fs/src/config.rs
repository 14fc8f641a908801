//! Configuration for the filesystem adapter.

use std::{path::PathBuf, time::Duration};

use serde::{Deserialize, Serialize};

use crate::error::{FsStoreError, Result};

/// Default per-request timeout (30 seconds).
const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Default number of entries per listing page.
const DEFAULT_PAGE_SIZE: usize = 256;

/// Configuration for [`FsBlobStore`](crate::FsBlobStore).
///
/// # Example
///
/// ```
/// use std::time::Duration;
///
/// use keel_store_fs::FsStoreConfig;
///
/// let config = FsStoreConfig::builder()
///     .root("/var/lib/keel")
///     .page_size(500)
///     .request_timeout(Duration::from_secs(10))
///     .build()?;
/// # Ok::<(), keel_store_fs::FsStoreError>(())
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FsStoreConfig {
    /// Directory under which all namespace state lives.
    pub(crate) root: PathBuf,

    /// Entries per listing page.
    #[serde(default = "default_page_size")]
    pub(crate) page_size: usize,

    /// Upper bound on the wall-clock time of a single operation.
    #[serde(with = "humantime_serde", default = "default_request_timeout")]
    pub(crate) request_timeout: Duration,
}

fn default_page_size() -> usize {
    DEFAULT_PAGE_SIZE
}

fn default_request_timeout() -> Duration {
    DEFAULT_REQUEST_TIMEOUT
}

#[bon::bon]
impl FsStoreConfig {
    /// Creates a new configuration, validating all fields.
    ///
    /// # Arguments
    ///
    /// * `root` - Directory under which all namespace state lives.
    ///
    /// # Optional Fields
    ///
    /// * `page_size` - Entries per listing page (default: 256; must be at least 1).
    /// * `request_timeout` - Per-operation timeout (default: 30 seconds).
    ///
    /// # Errors
    ///
    /// Returns [`FsStoreError::Config`] if `root` is empty or `page_size`
    /// is zero.
    #[builder]
    pub fn new(
        #[builder(into)] root: PathBuf,
        #[builder(default = DEFAULT_PAGE_SIZE)] page_size: usize,
        #[builder(default = DEFAULT_REQUEST_TIMEOUT)] request_timeout: Duration,
    ) -> Result<Self> {
        if root.as_os_str().is_empty() {
            return Err(FsStoreError::Config("root directory is required".into()));
        }
        if page_size == 0 {
            return Err(FsStoreError::Config("page_size must be at least 1".into()));
        }

        Ok(Self { root, page_size, request_timeout })
    }

    /// Returns the root directory.
    #[must_use]
    pub fn root(&self) -> &PathBuf {
        &self.root
    }

    /// Returns the listing page size.
    #[must_use]
    pub fn page_size(&self) -> usize {
        self.page_size
    }

    /// Returns the per-operation timeout.
    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        self.request_timeout
    }
}
