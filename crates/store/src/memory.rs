//! In-memory [`BlobStore`] adapter.
//!
//! This adapter is primarily intended for tests and development. It models
//! the full conditional-access surface of a real blob service — ETags,
//! leases with wall-clock expiry, snapshots, paginated listing — over
//! `BTreeMap`s guarded by a single [`parking_lot::RwLock`], so that blob
//! state and lease state are always checked together atomically.
//!
//! # Cloning
//!
//! `MemoryBlobStore` is cheaply cloneable via [`Arc`]; all clones share the
//! same underlying namespace.
//!
//! # Fidelity notes
//!
//! - ETags are monotonic per store instance and change on every successful
//!   upload, content or metadata alike.
//! - Expired leases are ignored lazily; no background task exists. Physical
//!   reclamation of expired *items* is likewise never automatic — that is
//!   the sweep's job, as with a real blob service.

use std::{
    collections::BTreeMap,
    sync::Arc,
    time::Duration,
};

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;

use crate::{
    blob::{
        BlobEntry, BlobProperties, BlobStore, ContinuationToken, Etag, LeaseId, ListPage,
        ReadConditions, UploadArgs, WriteConditions,
    },
    error::{BlobError, BlobResult},
};

/// Default number of entries per listing page.
pub const DEFAULT_PAGE_SIZE: usize = 100;

/// A stored blob: content plus the property set the store maintains for it.
#[derive(Debug, Clone)]
struct BlobRecord {
    content: Bytes,
    content_type: Option<String>,
    content_encoding: Option<String>,
    metadata: BTreeMap<String, String>,
    etag: Etag,
    created_at: DateTime<Utc>,
    last_modified: DateTime<Utc>,
}

impl BlobRecord {
    fn properties(&self) -> BlobProperties {
        BlobProperties {
            etag: self.etag.clone(),
            created_at: self.created_at,
            last_modified: self.last_modified,
            content_type: self.content_type.clone(),
            content_encoding: self.content_encoding.clone(),
            content_length: self.content.len() as u64,
            metadata: self.metadata.clone(),
        }
    }
}

#[derive(Debug, Clone)]
struct LeaseRecord {
    id: LeaseId,
    expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
struct SnapshotRecord {
    #[allow(dead_code)]
    taken_at: DateTime<Utc>,
    #[allow(dead_code)]
    record: BlobRecord,
}

#[derive(Default)]
struct MemoryState {
    blobs: BTreeMap<String, BlobRecord>,
    leases: BTreeMap<String, LeaseRecord>,
    snapshots: BTreeMap<String, Vec<SnapshotRecord>>,
    etag_seq: u64,
    lease_seq: u64,
}

impl MemoryState {
    fn next_etag(&mut self) -> Etag {
        self.etag_seq += 1;
        Etag::new(format!("0x{:08x}", self.etag_seq))
    }

    fn next_lease_id(&mut self) -> LeaseId {
        self.lease_seq += 1;
        LeaseId::new(format!("lease-{:08x}", self.lease_seq))
    }

    /// The active (non-expired) lease on `location`, if any.
    fn active_lease(&self, location: &str, now: DateTime<Utc>) -> Option<&LeaseRecord> {
        self.leases.get(location).filter(|lease| lease.expires_at > now)
    }

    /// Verifies that a mutation may proceed under the location's lease state.
    ///
    /// While a lease is active, mutations must present its id. With no
    /// active lease, a stale presented id is ignored — the holder's
    /// exclusivity window has simply ended.
    fn check_lease(
        &self,
        location: &str,
        presented: Option<&LeaseId>,
        now: DateTime<Utc>,
    ) -> BlobResult<()> {
        match self.active_lease(location, now) {
            Some(active) if presented != Some(&active.id) => Err(BlobError::conflict(location)),
            _ => Ok(()),
        }
    }

    /// Verifies write preconditions against the current record, which may be
    /// absent. An `if_match` against an absent blob is a precondition
    /// failure: the asserted version cannot exist.
    fn check_write_conditions(
        record: Option<&BlobRecord>,
        conditions: &WriteConditions,
    ) -> BlobResult<()> {
        if let Some(expected) = &conditions.if_match {
            match record {
                Some(current) if current.etag == *expected => {},
                _ => return Err(BlobError::PreconditionFailed),
            }
        }
        if let Some(threshold) = conditions.if_unmodified_since
            && let Some(current) = record
            && current.last_modified > threshold
        {
            return Err(BlobError::PreconditionFailed);
        }
        Ok(())
    }
}

/// In-memory blob namespace for tests and development.
#[derive(Clone)]
pub struct MemoryBlobStore {
    state: Arc<RwLock<MemoryState>>,
    page_size: usize,
}

impl std::fmt::Debug for MemoryBlobStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.read();
        f.debug_struct("MemoryBlobStore")
            .field("blobs", &state.blobs.len())
            .field("leases", &state.leases.len())
            .field("page_size", &self.page_size)
            .finish_non_exhaustive()
    }
}

impl MemoryBlobStore {
    /// Creates an empty namespace with the default listing page size.
    #[must_use]
    pub fn new() -> Self {
        Self::with_page_size(DEFAULT_PAGE_SIZE)
    }

    /// Creates an empty namespace with a custom listing page size.
    ///
    /// Small page sizes are useful for exercising continuation-token
    /// handling in tests.
    ///
    /// # Panics
    ///
    /// Panics if `page_size` is zero.
    #[must_use]
    pub fn with_page_size(page_size: usize) -> Self {
        assert!(page_size > 0, "page_size must be at least 1");
        Self { state: Arc::new(RwLock::new(MemoryState::default())), page_size }
    }

    /// Number of snapshots captured for `location`. Diagnostic accessor for
    /// tests of snapshot-on-overwrite behavior.
    #[must_use]
    pub fn snapshot_count(&self, location: &str) -> usize {
        self.state.read().snapshots.get(location).map_or(0, Vec::len)
    }
}

impl Default for MemoryBlobStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn exists(&self, location: &str) -> BlobResult<bool> {
        Ok(self.state.read().blobs.contains_key(location))
    }

    async fn get_properties(&self, location: &str) -> BlobResult<BlobProperties> {
        let state = self.state.read();
        state
            .blobs
            .get(location)
            .map(BlobRecord::properties)
            .ok_or_else(|| BlobError::not_found(location))
    }

    async fn open_read(
        &self,
        location: &str,
        conditions: &ReadConditions,
    ) -> BlobResult<(BlobProperties, Bytes)> {
        let state = self.state.read();
        let record = state.blobs.get(location).ok_or_else(|| BlobError::not_found(location))?;

        if let Some(tag) = &conditions.if_none_match
            && record.etag == *tag
        {
            return Err(BlobError::NotModified);
        }
        if let Some(since) = conditions.if_modified_since
            && record.last_modified <= since
        {
            return Err(BlobError::NotModified);
        }

        Ok((record.properties(), record.content.clone()))
    }

    async fn upload(
        &self,
        location: &str,
        content: Bytes,
        args: UploadArgs,
    ) -> BlobResult<BlobProperties> {
        let now = Utc::now();
        let mut state = self.state.write();

        state.check_lease(location, args.lease.as_ref(), now)?;
        MemoryState::check_write_conditions(state.blobs.get(location), &args.conditions)?;

        let etag = state.next_etag();
        let created_at = state.blobs.get(location).map_or(now, |prior| prior.created_at);
        let record = BlobRecord {
            content,
            content_type: args.content_type,
            content_encoding: args.content_encoding,
            metadata: args.metadata,
            etag,
            created_at,
            last_modified: now,
        };
        let properties = record.properties();
        state.blobs.insert(location.to_string(), record);

        Ok(properties)
    }

    async fn delete(
        &self,
        location: &str,
        conditions: &WriteConditions,
        lease: Option<&LeaseId>,
    ) -> BlobResult<()> {
        let now = Utc::now();
        let mut state = self.state.write();

        if !state.blobs.contains_key(location) {
            return Err(BlobError::not_found(location));
        }
        state.check_lease(location, lease, now)?;
        MemoryState::check_write_conditions(state.blobs.get(location), conditions)?;

        state.blobs.remove(location);
        state.leases.remove(location);
        state.snapshots.remove(location);

        Ok(())
    }

    async fn snapshot(
        &self,
        location: &str,
        conditions: &WriteConditions,
        lease: Option<&LeaseId>,
    ) -> BlobResult<()> {
        let now = Utc::now();
        let mut state = self.state.write();

        let Some(record) = state.blobs.get(location).cloned() else {
            return Err(BlobError::not_found(location));
        };
        state.check_lease(location, lease, now)?;
        MemoryState::check_write_conditions(Some(&record), conditions)?;

        state
            .snapshots
            .entry(location.to_string())
            .or_default()
            .push(SnapshotRecord { taken_at: now, record });

        Ok(())
    }

    async fn acquire_lease(&self, location: &str, duration: Duration) -> BlobResult<LeaseId> {
        let now = Utc::now();
        let mut state = self.state.write();

        if !state.blobs.contains_key(location) {
            return Err(BlobError::not_found(location));
        }
        if state.active_lease(location, now).is_some() {
            return Err(BlobError::conflict(location));
        }

        let id = state.next_lease_id();
        let expires_at = now
            + chrono::Duration::from_std(duration)
                .map_err(|_| BlobError::internal("lease duration out of range"))?;
        state.leases.insert(location.to_string(), LeaseRecord { id: id.clone(), expires_at });

        Ok(id)
    }

    async fn release_lease(&self, location: &str, lease: &LeaseId) -> BlobResult<()> {
        let now = Utc::now();
        let mut state = self.state.write();

        match state.active_lease(location, now) {
            Some(active) if active.id != *lease => Err(BlobError::conflict(location)),
            Some(_) => {
                state.leases.remove(location);
                Ok(())
            },
            // No active lease: release is idempotent.
            None => {
                state.leases.remove(location);
                Ok(())
            },
        }
    }

    async fn list_entries(
        &self,
        prefix: &str,
        token: Option<&ContinuationToken>,
    ) -> BlobResult<ListPage> {
        let state = self.state.read();

        let entries: Vec<BlobEntry> = state
            .blobs
            .range(prefix.to_string()..)
            .take_while(|(location, _)| location.starts_with(prefix))
            .filter(|(location, _)| token.is_none_or(|t| location.as_str() > t.as_str()))
            .take(self.page_size + 1)
            .map(|(location, record)| BlobEntry {
                location: location.clone(),
                properties: record.properties(),
            })
            .collect();

        // One extra entry was requested purely to detect whether a further
        // page exists.
        let mut page: Vec<BlobEntry> = entries;
        let next = if page.len() > self.page_size {
            page.truncate(self.page_size);
            page.last().map(|entry| ContinuationToken::new(entry.location.clone()))
        } else {
            None
        };

        Ok(ListPage { entries: page, next })
    }
}
