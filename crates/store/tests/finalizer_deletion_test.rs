//! Integration tests for finalizer-aware deletion as seen through a watch.

#![allow(clippy::unwrap_used)]
#![allow(clippy::panic)]

use std::time::Duration;

use tether_core::{
    Kind, Object, ObjectMeta, Resource, StoreClient, WatchEvent, WatchSource,
};
use tether_store::{InMemoryStore, TracingStore, WriteOp};
use tokio::sync::broadcast;

#[derive(Debug, Clone, Default, PartialEq)]
struct VolumeSpec {
    size_gb: u32,
}

impl Kind for VolumeSpec {
    const KIND: &'static str = "Volume";
}

type Volume = Object<VolumeSpec>;

const CLEANUP: &str = "example.com/cleanup";

async fn next_event(rx: &mut broadcast::Receiver<WatchEvent<Volume>>) -> WatchEvent<Volume> {
    tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .unwrap()
        .unwrap()
}

#[tokio::test]
async fn should_hold_deletion_until_last_finalizer_is_removed() {
    let inner = InMemoryStore::<Volume>::new();
    let store = TracingStore::new("east", inner.clone());
    let mut rx = store.subscribe();

    let created = store
        .create(&Volume::new(
            ObjectMeta::namespaced("ns", "data").with_finalizer(CLEANUP),
            VolumeSpec { size_gb: 10 },
        ))
        .await
        .unwrap();
    assert!(matches!(next_event(&mut rx).await, WatchEvent::Added(_)));

    store.delete(&created).await.unwrap();
    let pending = match next_event(&mut rx).await {
        WatchEvent::Modified(obj) => obj,
        other => panic!("expected a modification, got {other:?}"),
    };
    assert!(pending.is_deletion_requested());
    assert_eq!(inner.len().await, 1);

    let mut released = pending;
    assert!(released.remove_finalizer(CLEANUP));
    store.update(&released).await.unwrap();

    assert!(matches!(next_event(&mut rx).await, WatchEvent::Deleted(_)));
    assert!(store.get(Some("ns"), "data").await.unwrap().is_none());

    let ops: Vec<WriteOp> = inner.writes().await.iter().map(|w| w.op).collect();
    assert_eq!(ops, vec![WriteOp::Create, WriteOp::Delete, WriteOp::Update]);
}

#[tokio::test]
async fn should_reject_stale_writer_after_deletion_request() {
    let store = InMemoryStore::<Volume>::new();
    let created = store
        .create(&Volume::new(
            ObjectMeta::namespaced("ns", "data").with_finalizer(CLEANUP),
            VolumeSpec { size_gb: 10 },
        ))
        .await
        .unwrap();
    store.delete(&created).await.unwrap();

    let mut stale = created;
    stale.spec.size_gb = 20;
    let result = store.update(&stale).await;

    assert!(result.is_err_and(|e| e.is_conflict()));
}

#[tokio::test]
async fn should_refuse_new_finalizers_while_deleting() {
    let store = InMemoryStore::<Volume>::new();
    let created = store
        .create(&Volume::new(
            ObjectMeta::namespaced("ns", "data").with_finalizer(CLEANUP),
            VolumeSpec { size_gb: 10 },
        ))
        .await
        .unwrap();
    store.delete(&created).await.unwrap();

    let mut pending = store.get(Some("ns"), "data").await.unwrap().unwrap();
    pending.add_finalizer("example.com/late");
    let result = store.update(&pending).await;

    assert!(result.is_err());
    let stored = store.get(Some("ns"), "data").await.unwrap().unwrap();
    assert_eq!(stored.finalizers(), [CLEANUP.to_string()]);
}
