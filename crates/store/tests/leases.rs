//! Leased-mutation behavior of the item store: mutual exclusion, release in
//! every outcome, and the suppressed-error channel for release failures.

#![allow(clippy::expect_used, clippy::panic, clippy::unwrap_used)]

use std::{
    sync::{Arc, Mutex},
    time::Duration,
};

use async_trait::async_trait;
use bytes::Bytes;
use keel_store::{
    BlobError, BlobProperties, BlobResult, BlobStore, ContinuationToken, DeleteOptions,
    DeleteOutcome, Etag, ItemKey, ItemStore, LeaseId, ListPage, MemoryBlobStore, ReadConditions,
    StoreConfig, SuppressedErrorHook, UploadArgs, WriteConditions, WriteOptions, WriteOutcome,
    assert_conflict, assert_write_precondition_failed,
};

fn key(name: &str) -> ItemKey {
    ItemKey::new(name).expect("test keys are valid")
}

fn leased_config() -> StoreConfig {
    StoreConfig::builder()
        .lease_duration(Duration::from_secs(15))
        .build()
        .expect("15s is within bounds")
}

/// Hook that records every suppressed cleanup failure.
#[derive(Default)]
struct RecordingHook(Mutex<Vec<(String, String)>>);

impl SuppressedErrorHook for RecordingHook {
    fn on_suppressed(&self, operation: &str, location: &str, _error: &BlobError) {
        self.0.lock().expect("lock").push((operation.to_string(), location.to_string()));
    }
}

impl RecordingHook {
    fn seen(&self) -> Vec<(String, String)> {
        self.0.lock().expect("lock").clone()
    }
}

/// Adapter wrapper whose `release_lease` always fails, for exercising the
/// suppressed-error channel.
struct FailingRelease(Arc<MemoryBlobStore>);

#[async_trait]
impl BlobStore for FailingRelease {
    async fn exists(&self, location: &str) -> BlobResult<bool> {
        self.0.exists(location).await
    }

    async fn get_properties(&self, location: &str) -> BlobResult<BlobProperties> {
        self.0.get_properties(location).await
    }

    async fn open_read(
        &self,
        location: &str,
        conditions: &ReadConditions,
    ) -> BlobResult<(BlobProperties, Bytes)> {
        self.0.open_read(location, conditions).await
    }

    async fn upload(
        &self,
        location: &str,
        content: Bytes,
        args: UploadArgs,
    ) -> BlobResult<BlobProperties> {
        self.0.upload(location, content, args).await
    }

    async fn delete(
        &self,
        location: &str,
        conditions: &WriteConditions,
        lease: Option<&LeaseId>,
    ) -> BlobResult<()> {
        self.0.delete(location, conditions, lease).await
    }

    async fn snapshot(
        &self,
        location: &str,
        conditions: &WriteConditions,
        lease: Option<&LeaseId>,
    ) -> BlobResult<()> {
        self.0.snapshot(location, conditions, lease).await
    }

    async fn acquire_lease(&self, location: &str, duration: Duration) -> BlobResult<LeaseId> {
        self.0.acquire_lease(location, duration).await
    }

    async fn release_lease(&self, _location: &str, _lease: &LeaseId) -> BlobResult<()> {
        Err(BlobError::connection("release channel severed"))
    }

    async fn list_entries(
        &self,
        prefix: &str,
        token: Option<&ContinuationToken>,
    ) -> BlobResult<ListPage> {
        self.0.list_entries(prefix, token).await
    }
}

#[tokio::test]
async fn leased_write_releases_and_allows_the_next_writer() {
    let client = Arc::new(MemoryBlobStore::new());
    let store = ItemStore::new(client.clone(), leased_config());
    let key = key("serialized");

    // First write creates the item (no lease needed against a missing item).
    store.write(&key, Bytes::from("v1"), WriteOptions::default()).await.unwrap();
    // Second write leases, uploads, releases.
    store.write(&key, Bytes::from("v2"), WriteOptions::default()).await.unwrap();

    // The lease is gone afterwards: a manual acquisition succeeds.
    let lease = client.acquire_lease("serialized", Duration::from_secs(15)).await.unwrap();
    client.release_lease("serialized", &lease).await.unwrap();
}

#[tokio::test]
async fn write_against_a_held_lease_is_a_conflict() {
    let client = Arc::new(MemoryBlobStore::new());
    let store = ItemStore::new(client.clone(), leased_config());
    let key = key("contended");

    store.write(&key, Bytes::from("v1"), WriteOptions::default()).await.unwrap();

    // Another holder takes the lease out-of-band.
    let held = client.acquire_lease("contended", Duration::from_secs(15)).await.unwrap();

    let result = store.write(&key, Bytes::from("v2"), WriteOptions::default()).await;
    assert_conflict!(result);

    // After the holder releases, the writer proceeds — serialized after the
    // release, exactly one mutation order.
    client.release_lease("contended", &held).await.unwrap();
    let outcome = store.write(&key, Bytes::from("v2"), WriteOptions::default()).await.unwrap();
    assert!(matches!(outcome, WriteOutcome::Written(_)));
}

#[tokio::test]
async fn two_leased_writers_never_both_succeed_in_the_overlap() {
    let client = Arc::new(MemoryBlobStore::new());
    let store = ItemStore::new(client.clone(), leased_config());
    let key = key("duel");

    store.write(&key, Bytes::from("seed"), WriteOptions::default()).await.unwrap();

    let a = store.clone();
    let b = store.clone();
    let key_a = key.clone();
    let key_b = key.clone();
    let (ra, rb) = tokio::join!(
        a.write(&key_a, Bytes::from("from-a"), WriteOptions::default()),
        b.write(&key_b, Bytes::from("from-b"), WriteOptions::default()),
    );

    // Either both serialized cleanly (each held the lease in turn) or the
    // loser observed the other's lease as a conflict. Never a third state.
    for result in [&ra, &rb] {
        match result {
            Ok(WriteOutcome::Written(_)) => {},
            Err(keel_store::StoreError::Blob(BlobError::Conflict { .. })) => {},
            other => panic!("unexpected overlap outcome: {other:?}"),
        }
    }
    assert!(
        matches!(ra, Ok(WriteOutcome::Written(_))) || matches!(rb, Ok(WriteOutcome::Written(_))),
        "at least one writer must commit"
    );
}

#[tokio::test]
async fn lease_is_released_even_when_the_write_loses_its_race() {
    let client = Arc::new(MemoryBlobStore::new());
    let store = ItemStore::new(client.clone(), leased_config());
    let key = key("released-on-failure");

    store.write(&key, Bytes::from("v1"), WriteOptions::default()).await.unwrap();

    let stale = WriteOptions { if_match: Some(Etag::new("stale")), ..Default::default() };
    let outcome = store.write(&key, Bytes::from("v2"), stale).await.unwrap();
    assert_write_precondition_failed!(outcome);

    // Release must have happened despite the precondition failure.
    let lease = client
        .acquire_lease("released-on-failure", Duration::from_secs(15))
        .await
        .expect("lease must be free after a failed write");
    client.release_lease("released-on-failure", &lease).await.unwrap();
}

#[tokio::test]
async fn release_failures_are_suppressed_not_surfaced() {
    let inner = Arc::new(MemoryBlobStore::new());
    let hook = Arc::new(RecordingHook::default());
    let store = ItemStore::new(Arc::new(FailingRelease(inner.clone())), leased_config())
        .with_suppressed_hook(hook.clone());
    let key = key("noisy-release");

    store.write(&key, Bytes::from("v1"), WriteOptions::default()).await.unwrap();

    // The overwrite takes a lease; releasing it fails, but the write's
    // outcome is unaffected.
    let outcome = store.write(&key, Bytes::from("v2"), WriteOptions::default()).await.unwrap();
    assert!(matches!(outcome, WriteOutcome::Written(_)));

    let seen = hook.seen();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0], ("lease-release".to_string(), "noisy-release".to_string()));
}

#[tokio::test]
async fn leased_delete_removes_the_item() {
    let client = Arc::new(MemoryBlobStore::new());
    let store = ItemStore::new(client.clone(), leased_config());
    let key = key("doomed");

    store.write(&key, Bytes::from("v"), WriteOptions::default()).await.unwrap();
    let outcome = store.delete(&key, DeleteOptions::default()).await.unwrap();

    assert_eq!(outcome, DeleteOutcome::Deleted);
    assert!(!client.exists("doomed").await.unwrap());
}

#[tokio::test]
async fn delete_with_stale_tag_is_precondition_failed_and_releases() {
    let client = Arc::new(MemoryBlobStore::new());
    let store = ItemStore::new(client.clone(), leased_config());
    let key = key("stubborn");

    store.write(&key, Bytes::from("v"), WriteOptions::default()).await.unwrap();

    let options = DeleteOptions { if_match: Some(Etag::new("stale")), ..Default::default() };
    let outcome = store.delete(&key, options).await.unwrap();
    assert_eq!(outcome, DeleteOutcome::PreconditionFailed);
    assert!(client.exists("stubborn").await.unwrap(), "item survives a failed delete");

    let lease = client
        .acquire_lease("stubborn", Duration::from_secs(15))
        .await
        .expect("lease must be free after a failed delete");
    client.release_lease("stubborn", &lease).await.unwrap();
}

#[tokio::test]
async fn delete_of_missing_item_is_a_status_not_an_error() {
    let store = ItemStore::new(Arc::new(MemoryBlobStore::new()), leased_config());
    let outcome = store.delete(&key("phantom"), DeleteOptions::default()).await.unwrap();
    assert_eq!(outcome, DeleteOutcome::NotFound);
}

#[tokio::test]
async fn snapshot_policy_captures_prior_content_under_lease() {
    let client = Arc::new(MemoryBlobStore::new());
    let config = StoreConfig::builder()
        .lease_duration(Duration::from_secs(15))
        .versioning(keel_store::VersioningPolicy::Snapshot)
        .build()
        .unwrap();
    let store = ItemStore::new(client.clone(), config);
    let key = key("versioned");

    // Creation takes no snapshot: there is no prior content.
    store.write(&key, Bytes::from("v1"), WriteOptions::default()).await.unwrap();
    assert_eq!(client.snapshot_count("versioned"), 0);

    store.write(&key, Bytes::from("v2"), WriteOptions::default()).await.unwrap();
    assert_eq!(client.snapshot_count("versioned"), 1);

    store.write(&key, Bytes::from("v3"), WriteOptions::default()).await.unwrap();
    assert_eq!(client.snapshot_count("versioned"), 2);
}

#[tokio::test]
async fn snapshot_policy_respects_stale_preconditions() {
    let client = Arc::new(MemoryBlobStore::new());
    let config =
        StoreConfig::builder().versioning(keel_store::VersioningPolicy::Snapshot).build().unwrap();
    let store = ItemStore::new(client.clone(), config);
    let key = key("guarded");

    store.write(&key, Bytes::from("v1"), WriteOptions::default()).await.unwrap();

    // A snapshot is never taken against stale expectations.
    let stale = WriteOptions { if_match: Some(Etag::new("stale")), ..Default::default() };
    let outcome = store.write(&key, Bytes::from("v2"), stale).await.unwrap();
    assert_write_precondition_failed!(outcome);
    assert_eq!(client.snapshot_count("guarded"), 0);
}
