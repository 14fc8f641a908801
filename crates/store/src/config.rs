//! Configuration for the item store.
//!
//! All behavioral knobs live here and are resolved at construction time;
//! there is no process-global state. Adapter-specific settings (connection
//! endpoints, request timeouts) belong to the adapter's own config — see
//! `keel-store-fs` for an example.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Shortest lease the store will request.
pub const MIN_LEASE_DURATION: Duration = Duration::from_secs(15);

/// Longest lease the store will request.
pub const MAX_LEASE_DURATION: Duration = Duration::from_secs(60);

/// Configuration validation error.
#[derive(Debug, Error, PartialEq, Eq)]
#[non_exhaustive]
pub enum ConfigError {
    /// The lease duration is outside the store-imposed bounds.
    #[error("lease duration {actual:?} outside allowed bounds {min:?}..={max:?}")]
    LeaseDurationOutOfBounds {
        /// The rejected duration.
        actual: Duration,
        /// Lower bound, inclusive.
        min: Duration,
        /// Upper bound, inclusive.
        max: Duration,
    },

    /// A configuration field failed validation.
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Strategy for preserving prior content on overwrite.
///
/// With `Snapshot`, the write path captures a point-in-time copy of the
/// current content — under the same preconditions as the write itself —
/// before uploading the replacement.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VersioningPolicy {
    /// Overwrites discard the previous content.
    #[default]
    None,
    /// A snapshot of the previous content is taken before each overwrite.
    Snapshot,
}

/// Configuration for [`ItemStore`](crate::ItemStore).
///
/// # Example
///
/// ```
/// use std::time::Duration;
///
/// use keel_store::{StoreConfig, VersioningPolicy};
///
/// let config = StoreConfig::builder()
///     .default_partition("tenants/alpha")
///     .lease_duration(Duration::from_secs(30))
///     .versioning(VersioningPolicy::Snapshot)
///     .build()?;
/// # Ok::<(), keel_store::ConfigError>(())
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StoreConfig {
    /// Partition substituted when an operation does not name one. May be
    /// empty, meaning the namespace root.
    #[serde(default)]
    pub(crate) default_partition: String,

    /// When set, writes and deletes against existing items take an
    /// exclusive lease of this duration for the span of the mutation.
    #[serde(with = "humantime_serde", default)]
    pub(crate) lease_duration: Option<Duration>,

    /// Overwrite-preservation strategy.
    #[serde(default)]
    pub(crate) versioning: VersioningPolicy,
}

#[bon::bon]
impl StoreConfig {
    /// Creates a new configuration, validating all fields.
    ///
    /// # Optional Fields
    ///
    /// * `default_partition` - Partition used when operations omit one (default: root).
    /// * `lease_duration` - Enables leased mutations; must lie within
    ///   [`MIN_LEASE_DURATION`]..=[`MAX_LEASE_DURATION`].
    /// * `versioning` - Overwrite-preservation strategy (default: `None`).
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::LeaseDurationOutOfBounds`] if a lease duration
    /// outside the store-imposed bounds is supplied.
    #[builder]
    pub fn new(
        #[builder(into, default)] default_partition: String,
        lease_duration: Option<Duration>,
        #[builder(default)] versioning: VersioningPolicy,
    ) -> Result<Self, ConfigError> {
        if let Some(actual) = lease_duration
            && !(MIN_LEASE_DURATION..=MAX_LEASE_DURATION).contains(&actual)
        {
            return Err(ConfigError::LeaseDurationOutOfBounds {
                actual,
                min: MIN_LEASE_DURATION,
                max: MAX_LEASE_DURATION,
            });
        }

        Ok(Self { default_partition, lease_duration, versioning })
    }

    /// Returns the default partition path.
    #[must_use]
    pub fn default_partition(&self) -> &str {
        &self.default_partition
    }

    /// Returns the lease duration, if leased mutations are enabled.
    #[must_use]
    pub fn lease_duration(&self) -> Option<Duration> {
        self.lease_duration
    }

    /// Returns the overwrite-preservation strategy.
    #[must_use]
    pub fn versioning(&self) -> VersioningPolicy {
        self.versioning
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            default_partition: String::new(),
            lease_duration: None,
            versioning: VersioningPolicy::default(),
        }
    }
}
