//! The item store: conditional reads and writes, explicit delete, and the
//! expiration sweep, layered over a [`BlobStore`].
//!
//! Every operation resolves a namespace location first, delegates to the
//! blob store, then applies local policy — the expiration check and the
//! conditional-match checks — before returning a uniform outcome value.
//!
//! # Outcomes, not exceptions
//!
//! The common conditional paths are values: [`ReadOutcome::NotFound`],
//! [`ReadOutcome::NotModified`], [`WriteOutcome::PreconditionFailed`],
//! [`DeleteOutcome::NotFound`]. Errors are reserved for contention
//! ([`BlobError::Conflict`] on lease acquisition), cancellation, and
//! anything unexpected from the store, which propagates unchanged — this
//! layer never retries.
//!
//! # Concurrency
//!
//! There is no in-process shared mutable state here; the blob store is the
//! sole synchronization point. Callers needing linearizable updates pass
//! the ETag they last observed and handle `PreconditionFailed` by
//! re-reading and retrying at their own discretion.

use std::{collections::BTreeMap, fmt, sync::Arc};

use bytes::Bytes;
use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;

use crate::{
    blob::{
        BlobProperties, BlobStore, ContinuationToken, Etag, LeaseId, ReadConditions, UploadArgs,
        WriteConditions,
    },
    config::{StoreConfig, VersioningPolicy},
    error::{BlobError, StoreError, StoreResult},
    expiry::{EXPIRES_METADATA_KEY, expiry_from_metadata, format_expiry},
    location::{ItemKey, Partition, resolve},
    metrics::Metrics,
    suppress::{LogSuppressed, SuppressedErrorHook},
};

/// Property set of a stored item, as surfaced to callers.
///
/// Unlike [`BlobProperties`], the metadata map here is the caller's own:
/// the reserved expiration entry is stripped out and exposed as the typed
/// [`expires_at`](Self::expires_at) field instead.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemProperties {
    /// Version tag assigned by the store on the last write.
    pub etag: Etag,
    /// When the item was first created.
    pub created_at: DateTime<Utc>,
    /// When the item last changed.
    pub last_modified: DateTime<Utc>,
    /// MIME content type, if recorded.
    pub content_type: Option<String>,
    /// Content encoding, if recorded.
    pub content_encoding: Option<String>,
    /// Content length in bytes.
    pub content_length: u64,
    /// Soft-expiration instant, if one is set.
    pub expires_at: Option<DateTime<Utc>>,
    /// Caller metadata, reserved entries excluded.
    pub metadata: BTreeMap<String, String>,
}

impl ItemProperties {
    pub(crate) fn from_blob(properties: BlobProperties) -> Self {
        let BlobProperties {
            etag,
            created_at,
            last_modified,
            content_type,
            content_encoding,
            content_length,
            mut metadata,
        } = properties;
        let expires_at = expiry_from_metadata(&metadata);
        metadata.remove(EXPIRES_METADATA_KEY);
        Self {
            etag,
            created_at,
            last_modified,
            content_type,
            content_encoding,
            content_length,
            expires_at,
            metadata,
        }
    }
}

/// A read item: content plus properties.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Item {
    /// The key the item was read under.
    pub key: ItemKey,
    /// The item's content.
    pub content: Bytes,
    /// The item's properties and metadata.
    pub properties: ItemProperties,
}

/// Outcome of a [`read`](ItemStore::read).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadOutcome {
    /// The item exists and its content is included.
    Found(Item),
    /// The item is absent or logically expired.
    NotFound,
    /// The caller's cached version is still current; properties are
    /// included, content is not.
    NotModified(ItemProperties),
}

/// Outcome of a [`write`](ItemStore::write).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteOutcome {
    /// The write committed; fresh properties are included.
    Written(ItemProperties),
    /// The write lost an optimistic-concurrency race. Carries the
    /// last-known (possibly stale) properties, when the item existed at
    /// the time they were fetched.
    PreconditionFailed(Option<ItemProperties>),
}

/// Outcome of a [`delete`](ItemStore::delete).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteOutcome {
    /// The item was deleted.
    Deleted,
    /// No item existed at the location.
    NotFound,
    /// The delete lost an optimistic-concurrency race.
    PreconditionFailed,
}

/// Options for [`read`](ItemStore::read).
#[derive(Debug, Clone, Default)]
pub struct ReadOptions {
    /// Partition to read from; the store default applies when absent.
    pub partition: Option<Partition>,
    /// Short-circuit to `NotModified` when the stored ETag equals this one.
    pub if_none_match: Option<Etag>,
    /// Short-circuit to `NotModified` when the item has not been modified
    /// after this instant.
    pub if_modified_since: Option<DateTime<Utc>>,
    /// Surface absence as [`StoreError::NotFound`] instead of the
    /// [`ReadOutcome::NotFound`] status.
    pub require_exists: bool,
    /// Cooperative cancellation signal.
    pub cancel: Option<CancellationToken>,
}

/// Options for [`write`](ItemStore::write).
#[derive(Debug, Clone, Default)]
pub struct WriteOptions {
    /// Partition to write into; the store default applies when absent.
    pub partition: Option<Partition>,
    /// MIME content type to record.
    pub content_type: Option<String>,
    /// Content encoding to record.
    pub content_encoding: Option<String>,
    /// Require the stored ETag to equal this one.
    pub if_match: Option<Etag>,
    /// Require the item to be unmodified after this instant.
    pub if_unmodified_since: Option<DateTime<Utc>>,
    /// Soft-expiration instant. Absent means the item never expires; a
    /// previously stored expiration entry is cleared.
    pub expires_at: Option<DateTime<Utc>>,
    /// Caller metadata to store. The reserved expiration key is stripped;
    /// only `expires_at` controls it.
    pub metadata: BTreeMap<String, String>,
    /// Cooperative cancellation signal, honored up to the moment the
    /// content upload is issued.
    pub cancel: Option<CancellationToken>,
}

/// Options for [`delete`](ItemStore::delete).
#[derive(Debug, Clone, Default)]
pub struct DeleteOptions {
    /// Partition to delete from; the store default applies when absent.
    pub partition: Option<Partition>,
    /// Require the stored ETag to equal this one.
    pub if_match: Option<Etag>,
    /// Cooperative cancellation signal.
    pub cancel: Option<CancellationToken>,
}

/// Options for [`sweep_expired`](ItemStore::sweep_expired).
#[derive(Debug, Clone, Default)]
pub struct SweepOptions {
    /// Restrict the sweep to one partition. Unlike reads and writes, an
    /// absent partition here means the *whole namespace*, not the store
    /// default.
    pub partition: Option<Partition>,
    /// Cooperative cancellation signal, honored between store calls.
    pub cancel: Option<CancellationToken>,
}

/// Key/value store over a hierarchical blob namespace, with optimistic
/// concurrency, optional leased mutations, soft expiry, and an idempotent
/// expiration sweep.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
///
/// use bytes::Bytes;
/// use keel_store::{
///     ItemKey, ItemStore, MemoryBlobStore, ReadOptions, ReadOutcome, StoreConfig, WriteOptions,
/// };
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let store = ItemStore::new(Arc::new(MemoryBlobStore::new()), StoreConfig::default());
///     let key = ItemKey::new("greeting")?;
///
///     store.write(&key, Bytes::from("hello"), WriteOptions::default()).await?;
///
///     match store.read(&key, ReadOptions::default()).await? {
///         ReadOutcome::Found(item) => assert_eq!(item.content, Bytes::from("hello")),
///         other => panic!("unexpected outcome: {other:?}"),
///     }
///     Ok(())
/// }
/// ```
#[derive(Clone)]
pub struct ItemStore {
    client: Arc<dyn BlobStore>,
    config: StoreConfig,
    default_partition: Partition,
    hook: Arc<dyn SuppressedErrorHook>,
    metrics: Option<Arc<Metrics>>,
}

impl fmt::Debug for ItemStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ItemStore")
            .field("default_partition", &self.default_partition)
            .field("lease_duration", &self.config.lease_duration())
            .field("versioning", &self.config.versioning())
            .finish_non_exhaustive()
    }
}

impl ItemStore {
    /// Creates a store over the given blob client.
    #[must_use]
    pub fn new(client: Arc<dyn BlobStore>, config: StoreConfig) -> Self {
        let default_partition = Partition::new(config.default_partition());
        Self {
            client,
            config,
            default_partition,
            hook: Arc::new(LogSuppressed),
            metrics: None,
        }
    }

    /// Replaces the suppressed-error hook. The default hook logs at `warn`.
    #[must_use]
    pub fn with_suppressed_hook(mut self, hook: Arc<dyn SuppressedErrorHook>) -> Self {
        self.hook = hook;
        self
    }

    /// Attaches operation counters.
    #[must_use]
    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Returns the store's configuration.
    #[must_use]
    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    fn resolve(&self, key: &ItemKey, partition: Option<&Partition>) -> String {
        resolve(key, partition.unwrap_or(&self.default_partition))
    }

    fn cancelled(cancel: Option<&CancellationToken>) -> bool {
        cancel.is_some_and(CancellationToken::is_cancelled)
    }

    fn metrics(&self) -> Option<&Metrics> {
        self.metrics.as_deref()
    }

    fn suppress(&self, operation: &str, location: &str, error: &BlobError) {
        if let Some(m) = self.metrics() {
            m.record_suppressed();
        }
        self.hook.on_suppressed(operation, location, error);
    }

    fn missing(&self, key: &ItemKey, require_exists: bool) -> StoreResult<ReadOutcome> {
        if let Some(m) = self.metrics() {
            m.record_not_found();
        }
        if require_exists {
            Err(StoreError::NotFound { key: key.to_string() })
        } else {
            Ok(ReadOutcome::NotFound)
        }
    }

    fn not_modified(&self, properties: BlobProperties) -> StoreResult<ReadOutcome> {
        if let Some(m) = self.metrics() {
            m.record_not_modified();
        }
        Ok(ReadOutcome::NotModified(ItemProperties::from_blob(properties)))
    }

    /// Reads an item, honoring not-found, not-modified, and
    /// expiration-as-not-found semantics.
    ///
    /// An item whose expiration has passed is reported `NotFound` and its
    /// physical record is deleted best-effort; failures of that cleanup are
    /// suppressed.
    ///
    /// # Errors
    ///
    /// [`StoreError::NotFound`] only when
    /// [`require_exists`](ReadOptions::require_exists) is set;
    /// [`StoreError::Cancelled`] when the cancellation signal fired first;
    /// otherwise any non-conditional blob error, unchanged.
    #[tracing::instrument(skip(self, options), fields(key = %key))]
    pub async fn read(&self, key: &ItemKey, options: ReadOptions) -> StoreResult<ReadOutcome> {
        if let Some(m) = self.metrics() {
            m.record_read();
        }
        let location = self.resolve(key, options.partition.as_ref());
        if Self::cancelled(options.cancel.as_ref()) {
            return Err(StoreError::Cancelled);
        }

        let properties = match self.client.get_properties(&location).await {
            Ok(properties) => properties,
            Err(BlobError::NotFound { .. }) => return self.missing(key, options.require_exists),
            Err(error) => return Err(error.into()),
        };

        // Expiration masks existence for all readers. Reclaim the record
        // opportunistically, conditioned on the version just observed so a
        // concurrent resurrection is never clobbered.
        if let Some(expires_at) = expiry_from_metadata(&properties.metadata)
            && expires_at <= Utc::now()
        {
            let conditions =
                WriteConditions { if_match: Some(properties.etag.clone()), if_unmodified_since: None };
            match self.client.delete(&location, &conditions, None).await {
                Ok(()) => {
                    if let Some(m) = self.metrics() {
                        m.record_reclaimed(1);
                    }
                    tracing::debug!(location = %location, "reclaimed expired item during read");
                },
                Err(error) => self.suppress("expired-delete", &location, &error),
            }
            return self.missing(key, options.require_exists);
        }

        if let Some(tag) = &options.if_none_match
            && properties.etag == *tag
        {
            return self.not_modified(properties);
        }
        if let Some(since) = options.if_modified_since
            && properties.last_modified <= since
        {
            return self.not_modified(properties);
        }

        // Open the content with the same conditions the caller supplied:
        // a writer racing between the property fetch and this read is
        // caught here and mapped back to the statuses above.
        let conditions = ReadConditions {
            if_none_match: options.if_none_match.clone(),
            if_modified_since: options.if_modified_since,
        };
        match self.client.open_read(&location, &conditions).await {
            Ok((fresh, content)) => Ok(ReadOutcome::Found(Item {
                key: key.clone(),
                content,
                properties: ItemProperties::from_blob(fresh),
            })),
            Err(BlobError::NotFound { .. }) => self.missing(key, options.require_exists),
            Err(BlobError::NotModified | BlobError::PreconditionFailed) => {
                self.not_modified(properties)
            },
            Err(error) => Err(error.into()),
        }
    }

    /// Writes an item, honoring preconditions, the configured lease policy,
    /// and the configured versioning policy.
    ///
    /// A lease, when configured and the item exists, is held for the span
    /// of the mutation and released afterwards regardless of outcome;
    /// release failures are suppressed. A precondition violation at any
    /// step is returned as [`WriteOutcome::PreconditionFailed`], never as
    /// an error.
    ///
    /// # Errors
    ///
    /// [`BlobError::Conflict`] (wrapped) when the lease is held elsewhere;
    /// [`StoreError::Cancelled`] when the signal fired before the upload
    /// was issued; otherwise any non-conditional blob error, unchanged.
    #[tracing::instrument(skip(self, content, options), fields(key = %key, bytes = content.len()))]
    pub async fn write(
        &self,
        key: &ItemKey,
        content: Bytes,
        options: WriteOptions,
    ) -> StoreResult<WriteOutcome> {
        if let Some(m) = self.metrics() {
            m.record_write();
        }
        let location = self.resolve(key, options.partition.as_ref());
        if Self::cancelled(options.cancel.as_ref()) {
            return Err(StoreError::Cancelled);
        }

        let exists = self.client.exists(&location).await.map_err(StoreError::from)?;

        let mut lease: Option<LeaseId> = None;
        let outcome = self.write_inner(&location, exists, content, &options, &mut lease).await;

        if let Some(id) = &lease
            && let Err(error) = self.client.release_lease(&location, id).await
        {
            self.suppress("lease-release", &location, &error);
        }

        if let Ok(WriteOutcome::PreconditionFailed(_)) = &outcome
            && let Some(m) = self.metrics()
        {
            m.record_precondition_failure();
        }
        outcome
    }

    async fn write_inner(
        &self,
        location: &str,
        exists: bool,
        content: Bytes,
        options: &WriteOptions,
        lease: &mut Option<LeaseId>,
    ) -> StoreResult<WriteOutcome> {
        let conditions = WriteConditions {
            if_match: options.if_match.clone(),
            if_unmodified_since: options.if_unmodified_since,
        };

        // Last-known properties for precondition-failure reporting, fetched
        // under the lease when one is held. No lease is needed for an item
        // that does not exist yet.
        let mut last_known: Option<BlobProperties> = None;
        if exists {
            if let Some(duration) = self.config.lease_duration() {
                if Self::cancelled(options.cancel.as_ref()) {
                    return Err(StoreError::Cancelled);
                }
                match self.client.acquire_lease(location, duration).await {
                    Ok(id) => *lease = Some(id),
                    // Vanished since the existence probe; no lease needed
                    // against a missing item.
                    Err(BlobError::NotFound { .. }) => {},
                    Err(error) => return Err(error.into()),
                }
            }
            match self.client.get_properties(location).await {
                Ok(properties) => last_known = Some(properties),
                // Deleted between the existence probe and this fetch.
                Err(BlobError::NotFound { .. }) => {},
                Err(error) => return Err(error.into()),
            }
        }

        if last_known.is_some() && self.config.versioning() == VersioningPolicy::Snapshot {
            if Self::cancelled(options.cancel.as_ref()) {
                return Err(StoreError::Cancelled);
            }
            // The snapshot carries the caller's preconditions so it is never
            // taken against stale expectations.
            match self.client.snapshot(location, &conditions, lease.as_ref()).await {
                Ok(()) => {},
                Err(BlobError::PreconditionFailed) => {
                    return Ok(WriteOutcome::PreconditionFailed(
                        last_known.map(ItemProperties::from_blob),
                    ));
                },
                Err(error) => return Err(error.into()),
            }
        }

        // Point of no return: once the upload is issued the operation
        // commits or fails on its own terms, not via caller cancellation.
        if Self::cancelled(options.cancel.as_ref()) {
            return Err(StoreError::Cancelled);
        }

        let mut metadata = options.metadata.clone();
        metadata.remove(EXPIRES_METADATA_KEY);
        if let Some(expires_at) = options.expires_at {
            metadata.insert(EXPIRES_METADATA_KEY.to_string(), format_expiry(expires_at));
        }
        let args = UploadArgs {
            content_type: options.content_type.clone(),
            content_encoding: options.content_encoding.clone(),
            metadata,
            conditions,
            lease: lease.clone(),
        };
        match self.client.upload(location, content, args).await {
            Ok(_) => {},
            Err(BlobError::PreconditionFailed) => {
                return Ok(WriteOutcome::PreconditionFailed(
                    last_known.map(ItemProperties::from_blob),
                ));
            },
            Err(error) => return Err(error.into()),
        }

        // The upload response carries the new tag but not the full property
        // set; re-read it so callers get created_at and last_modified as
        // the store recorded them.
        let fresh = self.client.get_properties(location).await.map_err(StoreError::from)?;
        Ok(WriteOutcome::Written(ItemProperties::from_blob(fresh)))
    }

    /// Deletes an item, honoring an optional ETag precondition and the
    /// configured lease policy.
    ///
    /// # Errors
    ///
    /// [`BlobError::Conflict`] (wrapped) when the lease is held elsewhere;
    /// [`StoreError::Cancelled`] when the signal fired before the delete
    /// was issued; otherwise any non-conditional blob error, unchanged.
    #[tracing::instrument(skip(self, options), fields(key = %key))]
    pub async fn delete(
        &self,
        key: &ItemKey,
        options: DeleteOptions,
    ) -> StoreResult<DeleteOutcome> {
        if let Some(m) = self.metrics() {
            m.record_delete();
        }
        let location = self.resolve(key, options.partition.as_ref());
        if Self::cancelled(options.cancel.as_ref()) {
            return Err(StoreError::Cancelled);
        }

        if !self.client.exists(&location).await.map_err(StoreError::from)? {
            return Ok(DeleteOutcome::NotFound);
        }

        let mut lease: Option<LeaseId> = None;
        let outcome = self.delete_inner(&location, &options, &mut lease).await;

        if let Some(id) = &lease
            && let Err(error) = self.client.release_lease(&location, id).await
        {
            self.suppress("lease-release", &location, &error);
        }

        if let Ok(DeleteOutcome::PreconditionFailed) = &outcome
            && let Some(m) = self.metrics()
        {
            m.record_precondition_failure();
        }
        outcome
    }

    async fn delete_inner(
        &self,
        location: &str,
        options: &DeleteOptions,
        lease: &mut Option<LeaseId>,
    ) -> StoreResult<DeleteOutcome> {
        if let Some(duration) = self.config.lease_duration() {
            if Self::cancelled(options.cancel.as_ref()) {
                return Err(StoreError::Cancelled);
            }
            match self.client.acquire_lease(location, duration).await {
                Ok(id) => *lease = Some(id),
                // Deleted between the existence probe and the acquisition.
                Err(BlobError::NotFound { .. }) => return Ok(DeleteOutcome::NotFound),
                Err(error) => return Err(error.into()),
            }
        }

        if Self::cancelled(options.cancel.as_ref()) {
            return Err(StoreError::Cancelled);
        }
        let conditions =
            WriteConditions { if_match: options.if_match.clone(), if_unmodified_since: None };
        match self.client.delete(location, &conditions, lease.as_ref()).await {
            Ok(()) => {
                // The lease died with the blob.
                *lease = None;
                Ok(DeleteOutcome::Deleted)
            },
            Err(BlobError::NotFound { .. }) => Ok(DeleteOutcome::NotFound),
            Err(BlobError::PreconditionFailed) => Ok(DeleteOutcome::PreconditionFailed),
            Err(error) => Err(error.into()),
        }
    }

    /// Physically reclaims items whose expiration has passed.
    ///
    /// Paginates the listing of the target partition — or the whole
    /// namespace when none is given — and issues a conditional delete per
    /// expired entry, keyed on the ETag the listing reported. Entries
    /// already removed or rewritten by concurrent consumers are skipped
    /// without retry. The sweep is idempotent and safe to run concurrently
    /// with itself and with reads and writes.
    ///
    /// Returns the number of items reclaimed.
    ///
    /// # Errors
    ///
    /// [`StoreError::Cancelled`] when the signal fires between store calls;
    /// any blob error other than not-found/precondition-failed aborts the
    /// sweep and propagates unchanged.
    #[tracing::instrument(skip(self, options), fields(partition = options.partition.as_ref().map(Partition::as_str)))]
    pub async fn sweep_expired(&self, options: SweepOptions) -> StoreResult<u64> {
        if let Some(m) = self.metrics() {
            m.record_sweep();
        }
        let prefix = options.partition.as_ref().map(Partition::as_prefix).unwrap_or_default();

        let mut reclaimed = 0u64;
        let mut token: Option<ContinuationToken> = None;
        loop {
            if Self::cancelled(options.cancel.as_ref()) {
                return Err(StoreError::Cancelled);
            }
            let page = self.client.list_entries(&prefix, token.as_ref()).await?;

            for entry in page.entries {
                let Some(expires_at) = expiry_from_metadata(&entry.properties.metadata) else {
                    continue;
                };
                if expires_at > Utc::now() {
                    continue;
                }
                if Self::cancelled(options.cancel.as_ref()) {
                    return Err(StoreError::Cancelled);
                }

                let conditions = WriteConditions {
                    if_match: Some(entry.properties.etag.clone()),
                    if_unmodified_since: None,
                };
                match self.client.delete(&entry.location, &conditions, None).await {
                    Ok(()) => {
                        reclaimed += 1;
                        tracing::debug!(location = %entry.location, "reclaimed expired item");
                    },
                    // Another reader, sweeper, or writer got there first.
                    Err(BlobError::NotFound { .. } | BlobError::PreconditionFailed) => {
                        tracing::debug!(
                            location = %entry.location,
                            "expired item already removed or rewritten, skipping"
                        );
                    },
                    Err(error) => return Err(error.into()),
                }
            }

            match page.next {
                Some(next) => token = Some(next),
                None => break,
            }
        }

        if let Some(m) = self.metrics() {
            m.record_reclaimed(reclaimed);
        }
        tracing::debug!(reclaimed, "expiration sweep finished");
        Ok(reclaimed)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn blob_properties(metadata: BTreeMap<String, String>) -> BlobProperties {
        BlobProperties {
            etag: Etag::new("0x1"),
            created_at: Utc::now(),
            last_modified: Utc::now(),
            content_type: Some("application/json".into()),
            content_encoding: None,
            content_length: 2,
            metadata,
        }
    }

    #[test]
    fn item_properties_strip_the_reserved_entry() {
        let mut metadata = BTreeMap::new();
        metadata.insert("owner".to_string(), "alice".to_string());
        metadata.insert(EXPIRES_METADATA_KEY.to_string(), "2030-01-01T00:00:00Z".to_string());

        let properties = ItemProperties::from_blob(blob_properties(metadata));

        assert!(properties.expires_at.is_some());
        assert!(!properties.metadata.contains_key(EXPIRES_METADATA_KEY));
        assert_eq!(properties.metadata.get("owner").map(String::as_str), Some("alice"));
    }

    #[test]
    fn item_properties_without_entry_never_expire() {
        let properties = ItemProperties::from_blob(blob_properties(BTreeMap::new()));
        assert_eq!(properties.expires_at, None);
    }
}
