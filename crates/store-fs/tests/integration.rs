//! Integration tests for the filesystem adapter: the shared conformance
//! suite plus item-store flows end-to-end over real files.

#![allow(clippy::expect_used, clippy::panic, clippy::unwrap_used)]

use std::sync::Arc;

use bytes::Bytes;
use keel_store::{
    BlobStore, ItemKey, ItemStore, ReadOptions, StoreConfig, SweepOptions, WriteOptions,
    assert_found, assert_read_not_found, conformance,
    testutil::{expired_since, expires_in},
};
use keel_store_fs::{FsBlobStore, FsStoreConfig};
use tempfile::TempDir;

async fn adapter() -> (FsBlobStore, TempDir) {
    let dir = tempfile::tempdir().expect("tempdir");
    let config = FsStoreConfig::builder().root(dir.path()).build().expect("config");
    let store = FsBlobStore::new(config).await.expect("adapter");
    (store, dir)
}

async fn adapter_with_page_size(page_size: usize) -> (FsBlobStore, TempDir) {
    let dir = tempfile::tempdir().expect("tempdir");
    let config =
        FsStoreConfig::builder().root(dir.path()).page_size(page_size).build().expect("config");
    let store = FsBlobStore::new(config).await.expect("adapter");
    (store, dir)
}

// ============================================================================
// Conformance suite
// ============================================================================

#[tokio::test]
async fn exists_reflects_lifecycle() {
    let (store, _dir) = adapter().await;
    conformance::exists_reflects_lifecycle(&store).await;
}

#[tokio::test]
async fn upload_then_read_round_trips() {
    let (store, _dir) = adapter().await;
    conformance::upload_then_read_round_trips(&store).await;
}

#[tokio::test]
async fn upload_changes_etag() {
    let (store, _dir) = adapter().await;
    conformance::upload_changes_etag(&store).await;
}

#[tokio::test]
async fn get_properties_missing_is_not_found() {
    let (store, _dir) = adapter().await;
    conformance::get_properties_missing_is_not_found(&store).await;
}

#[tokio::test]
async fn delete_missing_is_not_found() {
    let (store, _dir) = adapter().await;
    conformance::delete_missing_is_not_found(&store).await;
}

#[tokio::test]
async fn upload_if_match_stale_fails() {
    let (store, _dir) = adapter().await;
    conformance::upload_if_match_stale_fails(&store).await;
}

#[tokio::test]
async fn upload_if_match_current_succeeds() {
    let (store, _dir) = adapter().await;
    conformance::upload_if_match_current_succeeds(&store).await;
}

#[tokio::test]
async fn upload_if_match_on_missing_fails() {
    let (store, _dir) = adapter().await;
    conformance::upload_if_match_on_missing_fails(&store).await;
}

#[tokio::test]
async fn open_read_if_none_match_current_is_not_modified() {
    let (store, _dir) = adapter().await;
    conformance::open_read_if_none_match_current_is_not_modified(&store).await;
}

#[tokio::test]
async fn open_read_if_modified_since_semantics() {
    let (store, _dir) = adapter().await;
    conformance::open_read_if_modified_since_semantics(&store).await;
}

#[tokio::test]
async fn upload_if_unmodified_since_violation_fails() {
    let (store, _dir) = adapter().await;
    conformance::upload_if_unmodified_since_violation_fails(&store).await;
}

#[tokio::test]
async fn delete_if_match_semantics() {
    let (store, _dir) = adapter().await;
    conformance::delete_if_match_semantics(&store).await;
}

#[tokio::test]
async fn lease_excludes_other_holders() {
    let (store, _dir) = adapter().await;
    conformance::lease_excludes_other_holders(&store).await;
}

#[tokio::test]
async fn lease_release_allows_reacquisition() {
    let (store, _dir) = adapter().await;
    conformance::lease_release_allows_reacquisition(&store).await;
}

#[tokio::test]
async fn acquire_lease_on_missing_is_not_found() {
    let (store, _dir) = adapter().await;
    conformance::acquire_lease_on_missing_is_not_found(&store).await;
}

#[tokio::test]
async fn listing_is_prefix_scoped_ordered_and_exhaustive() {
    let (store, _dir) = adapter().await;
    conformance::listing_is_prefix_scoped_ordered_and_exhaustive(&store).await;
}

#[tokio::test]
async fn listing_paginates_with_small_pages() {
    let (store, _dir) = adapter_with_page_size(3).await;
    conformance::listing_is_prefix_scoped_ordered_and_exhaustive(&store).await;
}

#[tokio::test]
async fn listing_entries_include_metadata() {
    let (store, _dir) = adapter().await;
    conformance::listing_entries_include_metadata(&store).await;
}

#[tokio::test]
async fn metadata_round_trips() {
    let (store, _dir) = adapter().await;
    conformance::metadata_round_trips(&store).await;
}

#[tokio::test]
async fn metadata_replaced_on_overwrite() {
    let (store, _dir) = adapter().await;
    conformance::metadata_replaced_on_overwrite(&store).await;
}

// ============================================================================
// Item store end-to-end over real files
// ============================================================================

fn key(name: &str) -> ItemKey {
    ItemKey::new(name).expect("test keys are valid")
}

#[tokio::test]
async fn item_store_round_trips_over_files() {
    let (adapter, _dir) = adapter().await;
    let store = ItemStore::new(Arc::new(adapter), StoreConfig::default());
    let key = key("greeting");

    let options =
        WriteOptions { content_type: Some("text/plain".into()), ..Default::default() };
    store.write(&key, Bytes::from("hello"), options).await.expect("write");

    let item = assert_found!(store.read(&key, ReadOptions::default()).await.expect("read"));
    assert_eq!(item.content, Bytes::from("hello"));
    assert_eq!(item.properties.content_type.as_deref(), Some("text/plain"));
}

#[tokio::test]
async fn expired_items_read_as_absent_and_sweep_reclaims_files() {
    let (adapter, dir) = adapter_with_page_size(2).await;
    let client = Arc::new(adapter);
    let store = ItemStore::new(client.clone(), StoreConfig::default());

    for i in 0..5 {
        let options = WriteOptions {
            expires_at: Some(if i % 2 == 0 { expired_since(5) } else { expires_in(3600) }),
            ..Default::default()
        };
        store.write(&key(&format!("jobs/{i}")), Bytes::from("v"), options).await.expect("write");
    }

    // Logically expired but physically present.
    assert!(client.exists("jobs/0").await.expect("exists"));
    assert_read_not_found!(store.read(&key("jobs/0"), ReadOptions::default()).await.expect("read"));

    // The read's opportunistic delete already reclaimed jobs/0; the sweep
    // picks up the remaining expired entries across several pages.
    let reclaimed = store.sweep_expired(SweepOptions::default()).await.expect("sweep");
    assert_eq!(reclaimed, 2);

    assert!(!dir.path().join("objects/jobs/0").exists());
    assert!(!dir.path().join("objects/jobs/2").exists());
    assert!(dir.path().join("objects/jobs/1").exists());

    let again = store.sweep_expired(SweepOptions::default()).await.expect("sweep again");
    assert_eq!(again, 0, "sweep is idempotent");
}

#[tokio::test]
async fn leased_writes_serialize_over_files() {
    let (adapter, dir) = adapter().await;
    let client = Arc::new(adapter);
    let config = StoreConfig::builder()
        .lease_duration(std::time::Duration::from_secs(15))
        .build()
        .expect("config");
    let store = ItemStore::new(client.clone(), config);
    let key = key("serialized");

    store.write(&key, Bytes::from("v1"), WriteOptions::default()).await.expect("create");
    store.write(&key, Bytes::from("v2"), WriteOptions::default()).await.expect("overwrite");

    // The overwrite's lease was released; no lease file remains.
    assert!(!dir.path().join("leases/serialized.json").exists());

    let item = assert_found!(store.read(&key, ReadOptions::default()).await.expect("read"));
    assert_eq!(item.content, Bytes::from("v2"));
}

#[tokio::test]
async fn state_survives_adapter_reopen() {
    let dir = tempfile::tempdir().expect("tempdir");

    let config = FsStoreConfig::builder().root(dir.path()).build().expect("config");
    let store =
        ItemStore::new(Arc::new(FsBlobStore::new(config).await.expect("adapter")), StoreConfig::default());
    let k = key("durable");
    let options = WriteOptions { expires_at: Some(expires_in(3600)), ..Default::default() };
    store.write(&k, Bytes::from("persisted"), options).await.expect("write");
    drop(store);

    // A fresh adapter over the same root sees the same items, expiry
    // metadata included.
    let config = FsStoreConfig::builder().root(dir.path()).build().expect("config");
    let reopened =
        ItemStore::new(Arc::new(FsBlobStore::new(config).await.expect("adapter")), StoreConfig::default());
    let item = assert_found!(reopened.read(&k, ReadOptions::default()).await.expect("read"));
    assert_eq!(item.content, Bytes::from("persisted"));
    assert!(item.properties.expires_at.is_some());
}
