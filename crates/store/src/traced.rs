//! A store client wrapper that logs every call.

use std::sync::Arc;

use async_trait::async_trait;
use tether_core::{LabelSelector, Resource, StoreClient, StoreError, WatchEvent, WatchSource};
use tokio::sync::broadcast;

type Result<T> = std::result::Result<T, StoreError>;

/// Adds tracing to any store client.
pub struct TracingStore<S> {
    inner: S,
    store: String,
}

impl<S> TracingStore<S> {
    /// Wrap `inner`, naming it `store` in log output.
    pub fn new(store: impl Into<String>, inner: S) -> Self {
        Self {
            inner,
            store: store.into(),
        }
    }

    pub const fn inner(&self) -> &S {
        &self.inner
    }
}

fn log_outcome<T>(store: &str, kind: &str, op: &'static str, result: &Result<T>) {
    match result {
        Ok(_) => tracing::trace!(store, kind, op, "Store call succeeded"),
        Err(e) => tracing::debug!(store, kind, op, error = %e, "Store call failed"),
    }
}

#[async_trait]
impl<R: Resource, S: StoreClient<R>> StoreClient<R> for TracingStore<S> {
    async fn get(&self, namespace: Option<&str>, name: &str) -> Result<Option<R>> {
        tracing::debug!(store = %self.store, kind = R::kind(), ?namespace, name, "Getting object");
        let result = self.inner.get(namespace, name).await;
        log_outcome(&self.store, R::kind(), "get", &result);
        result
    }

    async fn list(&self, namespace: Option<&str>, selector: &LabelSelector) -> Result<Vec<R>> {
        tracing::debug!(
            store = %self.store,
            kind = R::kind(),
            ?namespace,
            %selector,
            "Listing objects"
        );
        let result = self.inner.list(namespace, selector).await;
        if let Ok(ref items) = result {
            tracing::trace!(count = items.len(), "Listed objects");
        }
        log_outcome(&self.store, R::kind(), "list", &result);
        result
    }

    async fn create(&self, obj: &R) -> Result<R> {
        tracing::debug!(
            store = %self.store,
            kind = R::kind(),
            key = %obj.meta().key(),
            generate_name = ?obj.meta().generate_name,
            "Creating object"
        );
        let result = self.inner.create(obj).await;
        log_outcome(&self.store, R::kind(), "create", &result);
        result
    }

    async fn update(&self, obj: &R) -> Result<R> {
        tracing::debug!(
            store = %self.store,
            kind = R::kind(),
            key = %obj.meta().key(),
            version = obj.meta().resource_version,
            "Updating object"
        );
        let result = self.inner.update(obj).await;
        log_outcome(&self.store, R::kind(), "update", &result);
        result
    }

    async fn update_status(&self, obj: &R) -> Result<R> {
        tracing::debug!(
            store = %self.store,
            kind = R::kind(),
            key = %obj.meta().key(),
            version = obj.meta().resource_version,
            "Updating object status"
        );
        let result = self.inner.update_status(obj).await;
        log_outcome(&self.store, R::kind(), "update_status", &result);
        result
    }

    async fn delete(&self, obj: &R) -> Result<()> {
        tracing::debug!(
            store = %self.store,
            kind = R::kind(),
            key = %obj.meta().key(),
            "Deleting object"
        );
        let result = self.inner.delete(obj).await;
        log_outcome(&self.store, R::kind(), "delete", &result);
        result
    }

    fn with_identity(&self, identity: &str) -> Arc<dyn StoreClient<R>> {
        Arc::new(TracingStore::new(
            format!("{} as {identity}", self.store),
            self.inner.with_identity(identity),
        ))
    }
}

impl<R: Resource, S: WatchSource<R>> WatchSource<R> for TracingStore<S> {
    fn subscribe(&self) -> broadcast::Receiver<WatchEvent<R>> {
        self.inner.subscribe()
    }
}
