//! Store client and watch source contracts.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::broadcast;

use crate::error::Result;
use crate::resource::Resource;
use crate::selector::LabelSelector;

/// Typed access to one kind of object in one store.
///
/// Writes are optimistic: `update`, `update_status` and `delete` fail with
/// [`StoreError::Conflict`](crate::StoreError::Conflict) when the stored
/// version moved since `obj` was read. Spec/metadata and status are written
/// through separate paths.
#[async_trait]
pub trait StoreClient<R: Resource>: Send + Sync {
    /// Fetch one object. `Ok(None)` when it does not exist.
    async fn get(&self, namespace: Option<&str>, name: &str) -> Result<Option<R>>;

    /// List objects matching `selector`, in `namespace` or across all
    /// namespaces when `None`.
    async fn list(&self, namespace: Option<&str>, selector: &LabelSelector) -> Result<Vec<R>>;

    /// Create `obj`, assigning a name from `generate_name` when the name is empty.
    async fn create(&self, obj: &R) -> Result<R>;

    /// Write metadata and spec. The stored status is kept.
    async fn update(&self, obj: &R) -> Result<R>;

    /// Write status only.
    async fn update_status(&self, obj: &R) -> Result<R>;

    /// Request deletion of `obj`.
    async fn delete(&self, obj: &R) -> Result<()>;

    /// A client for the same store that performs writes as `identity`.
    fn with_identity(&self, identity: &str) -> Arc<dyn StoreClient<R>>;
}

/// A change observed in a store.
#[derive(Debug, Clone, PartialEq)]
pub enum WatchEvent<R> {
    Added(R),
    Modified(R),
    Deleted(R),
}

impl<R> WatchEvent<R> {
    /// The object the event is about.
    pub const fn object(&self) -> &R {
        match self {
            Self::Added(obj) | Self::Modified(obj) | Self::Deleted(obj) => obj,
        }
    }
}

/// Something that publishes changes to objects of one kind.
pub trait WatchSource<R: Resource>: Send + Sync {
    fn subscribe(&self) -> broadcast::Receiver<WatchEvent<R>>;
}

/// A named store: a typed client plus the watch source for the same objects.
pub struct StoreHandle<R: Resource> {
    name: String,
    client: Arc<dyn StoreClient<R>>,
    source: Arc<dyn WatchSource<R>>,
}

impl<R: Resource> StoreHandle<R> {
    /// Wrap a store that is both a client and a watch source.
    pub fn new<S>(name: impl Into<String>, store: Arc<S>) -> Self
    where
        S: StoreClient<R> + WatchSource<R> + 'static,
    {
        Self {
            name: name.into(),
            client: store.clone(),
            source: store,
        }
    }

    /// Assemble a handle from separately built parts.
    pub fn from_parts(
        name: impl Into<String>,
        client: Arc<dyn StoreClient<R>>,
        source: Arc<dyn WatchSource<R>>,
    ) -> Self {
        Self {
            name: name.into(),
            client,
            source,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn client(&self) -> &Arc<dyn StoreClient<R>> {
        &self.client
    }

    pub fn source(&self) -> &Arc<dyn WatchSource<R>> {
        &self.source
    }
}

impl<R: Resource> Clone for StoreHandle<R> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            client: Arc::clone(&self.client),
            source: Arc::clone(&self.source),
        }
    }
}

impl<R: Resource> std::fmt::Debug for StoreHandle<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreHandle")
            .field("name", &self.name)
            .field("kind", &R::kind())
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl<R: Resource, T: StoreClient<R> + ?Sized> StoreClient<R> for Arc<T> {
    async fn get(&self, namespace: Option<&str>, name: &str) -> Result<Option<R>> {
        (**self).get(namespace, name).await
    }

    async fn list(&self, namespace: Option<&str>, selector: &LabelSelector) -> Result<Vec<R>> {
        (**self).list(namespace, selector).await
    }

    async fn create(&self, obj: &R) -> Result<R> {
        (**self).create(obj).await
    }

    async fn update(&self, obj: &R) -> Result<R> {
        (**self).update(obj).await
    }

    async fn update_status(&self, obj: &R) -> Result<R> {
        (**self).update_status(obj).await
    }

    async fn delete(&self, obj: &R) -> Result<()> {
        (**self).delete(obj).await
    }

    fn with_identity(&self, identity: &str) -> Arc<dyn StoreClient<R>> {
        (**self).with_identity(identity)
    }
}

impl<R: Resource, T: WatchSource<R> + ?Sized> WatchSource<R> for Arc<T> {
    fn subscribe(&self) -> broadcast::Receiver<WatchEvent<R>> {
        (**self).subscribe()
    }
}
