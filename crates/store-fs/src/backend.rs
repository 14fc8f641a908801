//! Filesystem-backed [`BlobStore`] adapter.
//!
//! Namespace state lives in parallel trees under one root directory:
//!
//! ```text
//! <root>/
//!   objects/<location>          content bytes
//!   meta/<location>.json        property sidecar (ETag, timestamps, metadata)
//!   leases/<location>.json      active lease, if any
//!   snapshots/<location>/<etag> point-in-time copies (+ .json sidecars)
//!   tmp/                        staging area for atomic writes
//! ```
//!
//! All mutations stage into `tmp/` and commit via rename, so a crashed
//! write never leaves a torn object behind. Mutations of the whole
//! namespace are serialized by an instance-level async mutex, which makes
//! condition checks and their writes atomic *within this process*; the
//! adapter does not arbitrate between separate processes sharing a root.
//!
//! # Limitations
//!
//! - A location that is a directory prefix of another (`"a"` next to
//!   `"a/b"`) cannot hold content on a filesystem; such writes fail with an
//!   internal error.
//! - Lease expiry uses the wall clock; expired leases are ignored lazily.

use std::{
    collections::BTreeMap,
    fmt,
    path::{Path, PathBuf},
    time::Duration,
};

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use keel_store::{
    BlobEntry, BlobError, BlobProperties, BlobResult, BlobStore, ContinuationToken, Etag, LeaseId,
    ListPage, ReadConditions, UploadArgs, WriteConditions,
};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use tokio::{fs, sync::Mutex};

use crate::{config::FsStoreConfig, error::FsStoreError};

/// Property sidecar stored next to each object.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct MetaDoc {
    etag: String,
    created_at: DateTime<Utc>,
    last_modified: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    content_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    content_encoding: Option<String>,
    content_length: u64,
    #[serde(default)]
    metadata: BTreeMap<String, String>,
}

impl MetaDoc {
    fn properties(&self) -> BlobProperties {
        BlobProperties {
            etag: Etag::new(self.etag.clone()),
            created_at: self.created_at,
            last_modified: self.last_modified,
            content_type: self.content_type.clone(),
            content_encoding: self.content_encoding.clone(),
            content_length: self.content_length,
            metadata: self.metadata.clone(),
        }
    }
}

/// Active-lease sidecar.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct LeaseDoc {
    id: String,
    expires_at: DateTime<Utc>,
}

impl LeaseDoc {
    fn is_active(&self, now: DateTime<Utc>) -> bool {
        self.expires_at > now
    }
}

fn new_etag() -> String {
    hex::encode(rand::random::<[u8; 16]>())
}

fn new_lease_id() -> String {
    format!("lease-{}", hex::encode(rand::random::<[u8; 8]>()))
}

/// Rejects locations that would escape the namespace trees.
fn validate_location(location: &str) -> BlobResult<()> {
    let well_formed = !location.is_empty()
        && !location.contains('\\')
        && location.split('/').all(|segment| {
            !segment.is_empty() && segment != "." && segment != ".."
        });
    if well_formed {
        Ok(())
    } else {
        Err(BlobError::internal(format!("invalid location: {location:?}")))
    }
}

fn display(path: &Path) -> String {
    path.display().to_string()
}

/// Verifies write preconditions against the current sidecar, which may be
/// absent. An `if_match` against a missing object is a precondition
/// failure: the asserted version cannot exist.
fn check_write_conditions(meta: Option<&MetaDoc>, conditions: &WriteConditions) -> BlobResult<()> {
    if let Some(expected) = &conditions.if_match {
        match meta {
            Some(current) if current.etag == expected.as_str() => {},
            _ => return Err(BlobError::PreconditionFailed),
        }
    }
    if let Some(threshold) = conditions.if_unmodified_since
        && let Some(current) = meta
        && current.last_modified > threshold
    {
        return Err(BlobError::PreconditionFailed);
    }
    Ok(())
}

/// Filesystem adapter for the [`BlobStore`] interface.
///
/// # Example
///
/// ```no_run
/// use std::sync::Arc;
///
/// use keel_store::{ItemStore, StoreConfig};
/// use keel_store_fs::{FsBlobStore, FsStoreConfig};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let config = FsStoreConfig::builder().root("/var/lib/keel").build()?;
/// let client = Arc::new(FsBlobStore::new(config).await?);
/// let store = ItemStore::new(client, StoreConfig::default());
/// # Ok(())
/// # }
/// ```
pub struct FsBlobStore {
    root: PathBuf,
    page_size: usize,
    request_timeout: Duration,
    /// Serializes mutations so a condition check and its write commit
    /// together. Read paths do not take it.
    write_lock: Mutex<()>,
}

impl fmt::Debug for FsBlobStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FsBlobStore")
            .field("root", &self.root)
            .field("page_size", &self.page_size)
            .field("request_timeout", &self.request_timeout)
            .finish_non_exhaustive()
    }
}

impl FsBlobStore {
    /// Creates the adapter, laying out the namespace trees under the
    /// configured root.
    ///
    /// # Errors
    ///
    /// Returns [`FsStoreError::Io`] if the directories cannot be created.
    pub async fn new(config: FsStoreConfig) -> Result<Self, FsStoreError> {
        let root = config.root().clone();
        for tree in ["objects", "meta", "leases", "snapshots", "tmp"] {
            let path = root.join(tree);
            fs::create_dir_all(&path)
                .await
                .map_err(|source| FsStoreError::io(display(&path), source))?;
        }

        Ok(Self {
            root,
            page_size: config.page_size(),
            request_timeout: config.request_timeout(),
            write_lock: Mutex::new(()),
        })
    }

    fn object_path(&self, location: &str) -> PathBuf {
        self.root.join("objects").join(location)
    }

    fn meta_path(&self, location: &str) -> PathBuf {
        self.root.join("meta").join(format!("{location}.json"))
    }

    fn lease_path(&self, location: &str) -> PathBuf {
        self.root.join("leases").join(format!("{location}.json"))
    }

    fn snapshot_dir(&self, location: &str) -> PathBuf {
        self.root.join("snapshots").join(location)
    }

    /// Applies the configured request timeout to one operation.
    async fn bounded<T, F>(&self, future: F) -> BlobResult<T>
    where
        F: Future<Output = BlobResult<T>>,
    {
        match tokio::time::timeout(self.request_timeout, future).await {
            Ok(result) => result,
            Err(_) => Err(BlobError::Timeout),
        }
    }

    /// Stages `bytes` in `tmp/` and commits them to `target` via rename.
    async fn write_atomic(&self, target: &Path, bytes: &[u8]) -> Result<(), FsStoreError> {
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|source| FsStoreError::io(display(parent), source))?;
        }
        let staging = self.root.join("tmp").join(hex::encode(rand::random::<[u8; 8]>()));
        fs::write(&staging, bytes)
            .await
            .map_err(|source| FsStoreError::io(display(&staging), source))?;
        fs::rename(&staging, target)
            .await
            .map_err(|source| FsStoreError::io(display(target), source))
    }

    async fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>, FsStoreError> {
        match fs::read(path).await {
            Ok(bytes) => serde_json::from_slice(&bytes)
                .map(Some)
                .map_err(|source| FsStoreError::sidecar(display(path), source)),
            Err(source) if source.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(source) => Err(FsStoreError::io(display(path), source)),
        }
    }

    async fn write_json<T: Serialize>(&self, path: &Path, value: &T) -> Result<(), FsStoreError> {
        let bytes = serde_json::to_vec_pretty(value)
            .map_err(|source| FsStoreError::sidecar(display(path), source))?;
        self.write_atomic(path, &bytes).await
    }

    async fn load_meta(&self, location: &str) -> BlobResult<Option<MetaDoc>> {
        Self::read_json(&self.meta_path(location)).await.map_err(BlobError::from)
    }

    /// The active (non-expired) lease on `location`, if any.
    async fn active_lease(&self, location: &str) -> BlobResult<Option<LeaseDoc>> {
        let doc: Option<LeaseDoc> =
            Self::read_json(&self.lease_path(location)).await.map_err(BlobError::from)?;
        Ok(doc.filter(|lease| lease.is_active(Utc::now())))
    }

    /// Verifies that a mutation may proceed under the location's lease
    /// state. While a lease is active, mutations must present its id; with
    /// no active lease, a stale presented id is ignored.
    async fn check_lease(&self, location: &str, presented: Option<&LeaseId>) -> BlobResult<()> {
        match self.active_lease(location).await? {
            Some(active) if presented.map(LeaseId::as_str) != Some(active.id.as_str()) => {
                Err(BlobError::conflict(location))
            },
            _ => Ok(()),
        }
    }

    async fn remove_if_present(path: &Path) -> Result<(), FsStoreError> {
        match fs::remove_file(path).await {
            Ok(()) => Ok(()),
            Err(source) if source.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(FsStoreError::io(display(path), source)),
        }
    }

    /// Collects every object location under `objects/`, relative and
    /// `/`-separated, in no particular order.
    async fn collect_locations(&self) -> BlobResult<Vec<String>> {
        let objects_root = self.root.join("objects");
        let mut locations = Vec::new();
        let mut pending = vec![objects_root.clone()];

        while let Some(dir) = pending.pop() {
            let mut entries = match fs::read_dir(&dir).await {
                Ok(entries) => entries,
                Err(source) if source.kind() == std::io::ErrorKind::NotFound => continue,
                Err(source) => return Err(FsStoreError::io(display(&dir), source).into()),
            };
            while let Some(entry) = entries
                .next_entry()
                .await
                .map_err(|source| BlobError::from(FsStoreError::io(display(&dir), source)))?
            {
                let path = entry.path();
                let file_type = entry
                    .file_type()
                    .await
                    .map_err(|source| BlobError::from(FsStoreError::io(display(&path), source)))?;
                if file_type.is_dir() {
                    pending.push(path);
                } else if let Ok(relative) = path.strip_prefix(&objects_root) {
                    let location = relative
                        .components()
                        .map(|component| component.as_os_str().to_string_lossy())
                        .collect::<Vec<_>>()
                        .join("/");
                    locations.push(location);
                }
            }
        }

        Ok(locations)
    }

    async fn upload_inner(
        &self,
        location: &str,
        content: Bytes,
        args: UploadArgs,
    ) -> BlobResult<BlobProperties> {
        validate_location(location)?;
        let _guard = self.write_lock.lock().await;

        let prior = self.load_meta(location).await?;
        self.check_lease(location, args.lease.as_ref()).await?;
        check_write_conditions(prior.as_ref(), &args.conditions)?;

        let now = Utc::now();
        let doc = MetaDoc {
            etag: new_etag(),
            created_at: prior.as_ref().map_or(now, |doc| doc.created_at),
            last_modified: now,
            content_type: args.content_type,
            content_encoding: args.content_encoding,
            content_length: content.len() as u64,
            metadata: args.metadata,
        };

        self.write_atomic(&self.object_path(location), &content)
            .await
            .map_err(BlobError::from)?;
        self.write_json(&self.meta_path(location), &doc).await.map_err(BlobError::from)?;

        Ok(doc.properties())
    }

    async fn delete_inner(
        &self,
        location: &str,
        conditions: &WriteConditions,
        lease: Option<&LeaseId>,
    ) -> BlobResult<()> {
        validate_location(location)?;
        let _guard = self.write_lock.lock().await;

        let Some(meta) = self.load_meta(location).await? else {
            return Err(BlobError::not_found(location));
        };
        self.check_lease(location, lease).await?;
        check_write_conditions(Some(&meta), conditions)?;

        Self::remove_if_present(&self.object_path(location)).await.map_err(BlobError::from)?;
        Self::remove_if_present(&self.meta_path(location)).await.map_err(BlobError::from)?;
        Self::remove_if_present(&self.lease_path(location)).await.map_err(BlobError::from)?;
        let snapshots = self.snapshot_dir(location);
        match fs::remove_dir_all(&snapshots).await {
            Ok(()) => {},
            Err(source) if source.kind() == std::io::ErrorKind::NotFound => {},
            Err(source) => return Err(FsStoreError::io(display(&snapshots), source).into()),
        }

        Ok(())
    }

    async fn snapshot_inner(
        &self,
        location: &str,
        conditions: &WriteConditions,
        lease: Option<&LeaseId>,
    ) -> BlobResult<()> {
        validate_location(location)?;
        let _guard = self.write_lock.lock().await;

        let Some(meta) = self.load_meta(location).await? else {
            return Err(BlobError::not_found(location));
        };
        self.check_lease(location, lease).await?;
        check_write_conditions(Some(&meta), conditions)?;

        let object = self.object_path(location);
        let content = fs::read(&object)
            .await
            .map_err(|source| BlobError::from(FsStoreError::io(display(&object), source)))?;

        let dir = self.snapshot_dir(location);
        self.write_atomic(&dir.join(&meta.etag), &content).await.map_err(BlobError::from)?;
        self.write_json(&dir.join(format!("{}.json", meta.etag)), &meta)
            .await
            .map_err(BlobError::from)?;

        Ok(())
    }

    async fn acquire_lease_inner(
        &self,
        location: &str,
        duration: Duration,
    ) -> BlobResult<LeaseId> {
        validate_location(location)?;
        let _guard = self.write_lock.lock().await;

        if self.load_meta(location).await?.is_none() {
            return Err(BlobError::not_found(location));
        }
        if self.active_lease(location).await?.is_some() {
            return Err(BlobError::conflict(location));
        }

        let expires_at = Utc::now()
            + chrono::Duration::from_std(duration)
                .map_err(|_| BlobError::internal("lease duration out of range"))?;
        let doc = LeaseDoc { id: new_lease_id(), expires_at };
        self.write_json(&self.lease_path(location), &doc).await.map_err(BlobError::from)?;

        Ok(LeaseId::new(doc.id))
    }

    async fn release_lease_inner(&self, location: &str, lease: &LeaseId) -> BlobResult<()> {
        validate_location(location)?;
        let _guard = self.write_lock.lock().await;

        if let Some(active) = self.active_lease(location).await?
            && active.id != lease.as_str()
        {
            return Err(BlobError::conflict(location));
        }
        // No active lease: release is idempotent.
        Self::remove_if_present(&self.lease_path(location)).await.map_err(BlobError::from)
    }

    async fn list_entries_inner(
        &self,
        prefix: &str,
        token: Option<&ContinuationToken>,
    ) -> BlobResult<ListPage> {
        let mut locations = self.collect_locations().await?;
        locations.sort();
        locations.retain(|location| {
            location.starts_with(prefix)
                && token.is_none_or(|t| location.as_str() > t.as_str())
        });

        let mut entries = Vec::new();
        for location in locations.into_iter().take(self.page_size + 1) {
            // A sidecar can vanish mid-listing when a delete races the
            // walk; such entries are simply skipped.
            if let Some(meta) = self.load_meta(&location).await? {
                entries.push(BlobEntry { location, properties: meta.properties() });
            }
        }

        // One extra entry was requested purely to detect whether a further
        // page exists.
        let next = if entries.len() > self.page_size {
            entries.truncate(self.page_size);
            entries.last().map(|entry| ContinuationToken::new(entry.location.clone()))
        } else {
            None
        };

        Ok(ListPage { entries, next })
    }
}

#[async_trait]
impl BlobStore for FsBlobStore {
    async fn exists(&self, location: &str) -> BlobResult<bool> {
        self.bounded(async {
            validate_location(location)?;
            Ok(self.load_meta(location).await?.is_some())
        })
        .await
    }

    async fn get_properties(&self, location: &str) -> BlobResult<BlobProperties> {
        self.bounded(async {
            validate_location(location)?;
            self.load_meta(location)
                .await?
                .map(|meta| meta.properties())
                .ok_or_else(|| BlobError::not_found(location))
        })
        .await
    }

    async fn open_read(
        &self,
        location: &str,
        conditions: &ReadConditions,
    ) -> BlobResult<(BlobProperties, Bytes)> {
        self.bounded(async {
            validate_location(location)?;
            let Some(meta) = self.load_meta(location).await? else {
                return Err(BlobError::not_found(location));
            };

            if let Some(tag) = &conditions.if_none_match
                && meta.etag == tag.as_str()
            {
                return Err(BlobError::NotModified);
            }
            if let Some(since) = conditions.if_modified_since
                && meta.last_modified <= since
            {
                return Err(BlobError::NotModified);
            }

            let object = self.object_path(location);
            let content = fs::read(&object)
                .await
                .map_err(|source| BlobError::from(FsStoreError::io(display(&object), source)))?;

            Ok((meta.properties(), Bytes::from(content)))
        })
        .await
    }

    async fn upload(
        &self,
        location: &str,
        content: Bytes,
        args: UploadArgs,
    ) -> BlobResult<BlobProperties> {
        self.bounded(self.upload_inner(location, content, args)).await
    }

    async fn delete(
        &self,
        location: &str,
        conditions: &WriteConditions,
        lease: Option<&LeaseId>,
    ) -> BlobResult<()> {
        self.bounded(self.delete_inner(location, conditions, lease)).await
    }

    async fn snapshot(
        &self,
        location: &str,
        conditions: &WriteConditions,
        lease: Option<&LeaseId>,
    ) -> BlobResult<()> {
        self.bounded(self.snapshot_inner(location, conditions, lease)).await
    }

    async fn acquire_lease(&self, location: &str, duration: Duration) -> BlobResult<LeaseId> {
        self.bounded(self.acquire_lease_inner(location, duration)).await
    }

    async fn release_lease(&self, location: &str, lease: &LeaseId) -> BlobResult<()> {
        self.bounded(self.release_lease_inner(location, lease)).await
    }

    async fn list_entries(
        &self,
        prefix: &str,
        token: Option<&ContinuationToken>,
    ) -> BlobResult<ListPage> {
        self.bounded(self.list_entries_inner(prefix, token)).await
    }
}
