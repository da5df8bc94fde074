//! Turning store changes into reconcile work items.
//!
//! Two registrations exist: one keys work by the changed object itself, the
//! other keys it by the parent named in the changed object's controlling
//! back-reference. Delivery and deduplication belong to the queue.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::meta::ObjectMeta;
use crate::reference::controller_reference;
use crate::resource::Resource;
use crate::selector::LabelSelector;
use crate::store::WatchSource;

/// Key naming one object to re-evaluate.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct WorkItem {
    /// Store the object lives in.
    pub store: String,
    pub namespace: Option<String>,
    pub name: String,
}

impl WorkItem {
    pub fn new(
        store: impl Into<String>,
        namespace: Option<impl Into<String>>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            store: store.into(),
            namespace: namespace.map(Into::into),
            name: name.into(),
        }
    }

    /// Work item for the object described by `meta` in `store`.
    pub fn for_object(store: impl Into<String>, meta: &ObjectMeta) -> Self {
        Self {
            store: store.into(),
            namespace: meta.namespace.clone(),
            name: meta.name.clone(),
        }
    }
}

impl std::fmt::Display for WorkItem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.namespace {
            Some(ns) => write!(f, "{}/{ns}/{}", self.store, self.name),
            None => write!(f, "{}/{}", self.store, self.name),
        }
    }
}

/// Destination for work items.
pub trait WorkQueue: Send + Sync {
    fn enqueue(&self, item: WorkItem);
}

impl WorkQueue for mpsc::UnboundedSender<WorkItem> {
    fn enqueue(&self, item: WorkItem) {
        if let Err(e) = self.send(item) {
            debug!(item = %e.0, "Work queue closed, dropping item");
        }
    }
}

/// Filters applied before a change is enqueued.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WatchOptions {
    /// Only objects in this namespace.
    pub namespace: Option<String>,
    /// Only objects whose labels match.
    pub selector: Option<LabelSelector>,
}

impl WatchOptions {
    /// Watch a single namespace.
    pub fn in_namespace(namespace: impl Into<String>) -> Self {
        Self {
            namespace: Some(namespace.into()),
            selector: None,
        }
    }

    /// Restrict to objects matching `selector`.
    #[must_use]
    pub fn with_selector(mut self, selector: LabelSelector) -> Self {
        self.selector = Some(selector);
        self
    }

    pub fn matches(&self, meta: &ObjectMeta) -> bool {
        let namespace_ok = self
            .namespace
            .as_ref()
            .is_none_or(|ns| meta.namespace.as_ref() == Some(ns));
        let selector_ok = self
            .selector
            .as_ref()
            .is_none_or(|s| s.matches(&meta.labels));
        namespace_ok && selector_ok
    }
}

/// Enqueue a work item keyed by the changed object's own identity.
pub fn watch_and_enqueue_by_own_identity<R: Resource>(
    store: impl Into<String>,
    source: &dyn WatchSource<R>,
    options: WatchOptions,
    queue: Arc<dyn WorkQueue>,
) -> JoinHandle<()> {
    let store = store.into();
    let receiver = source.subscribe();
    let item_store = store.clone();
    let to_item = move |meta: &ObjectMeta| {
        options
            .matches(meta)
            .then(|| WorkItem::for_object(item_store.clone(), meta))
    };
    tokio::spawn(pump(receiver, R::kind(), store, to_item, queue))
}

/// Enqueue a work item keyed by the parent named in the changed object's
/// controlling back-reference. Objects without one, or controlled by a
/// different kind than `owner_kind`, are skipped.
pub fn watch_and_enqueue_by_owner_identity<R: Resource>(
    store: impl Into<String>,
    source: &dyn WatchSource<R>,
    owner_kind: impl Into<String>,
    options: WatchOptions,
    queue: Arc<dyn WorkQueue>,
) -> JoinHandle<()> {
    let store = store.into();
    let owner_kind = owner_kind.into();
    let receiver = source.subscribe();
    let to_item = move |meta: &ObjectMeta| {
        if !options.matches(meta) {
            return None;
        }
        controller_reference(meta)
            .filter(|r| r.kind == owner_kind)
            .map(|r| WorkItem {
                store: r.store.clone(),
                namespace: r.namespace.clone(),
                name: r.name.clone(),
            })
    };
    tokio::spawn(pump(receiver, R::kind(), store, to_item, queue))
}

async fn pump<R, F>(
    mut receiver: broadcast::Receiver<crate::store::WatchEvent<R>>,
    kind: &'static str,
    store: String,
    to_item: F,
    queue: Arc<dyn WorkQueue>,
) where
    R: Resource,
    F: Fn(&ObjectMeta) -> Option<WorkItem> + Send + 'static,
{
    loop {
        match receiver.recv().await {
            Ok(event) => {
                if let Some(item) = to_item(event.object().meta()) {
                    debug!(kind, %store, %item, "Enqueueing work item");
                    queue.enqueue(item);
                }
            }
            Err(broadcast::error::RecvError::Lagged(missed)) => {
                warn!(kind, %store, missed, "Watch fell behind, changes were dropped");
            }
            Err(broadcast::error::RecvError::Closed) => {
                debug!(kind, %store, "Watch source closed");
                break;
            }
        }
    }
}
