//! Single-object reconciler: keeps fields of an existing object up to date.
//!
//! No finalizers, children or deletion handling. Not-found and conflict
//! handling match the GC reconciler.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use tether_core::{Resource, StoreClient, StoreHandle, WorkItem};
use tracing::{debug, info};

use crate::applier::DecoratorApplier;
use crate::error::{Error, Result};
use crate::reconciler::Reconcile;
use crate::types::DecoratorAction;

/// Applies a [`DecoratorApplier`] to objects in one or more stores.
pub struct DecoratorReconciler<R: Resource, A> {
    applier: A,
    clients: BTreeMap<String, Arc<dyn StoreClient<R>>>,
}

impl<R, A> DecoratorReconciler<R, A>
where
    R: Resource,
    A: DecoratorApplier<R>,
{
    pub fn new(applier: A) -> Self {
        Self {
            applier,
            clients: BTreeMap::new(),
        }
    }

    /// Serve objects in `store`.
    #[must_use]
    pub fn with_store(mut self, store: &StoreHandle<R>) -> Self {
        self.clients
            .insert(store.name().to_owned(), Arc::clone(store.client()));
        self
    }

    fn describe(item: &WorkItem) -> String {
        crate::describe::object(R::kind(), &item.name, item.namespace.as_deref(), &item.store)
    }
}

#[async_trait]
impl<R, A> Reconcile for DecoratorReconciler<R, A>
where
    R: Resource,
    A: DecoratorApplier<R>,
{
    type Outcome = DecoratorAction;

    async fn reconcile(&self, item: &WorkItem) -> Result<DecoratorAction> {
        let Some(client) = self.clients.get(&item.store) else {
            debug!(%item, "No such store, ignoring work item");
            return Ok(DecoratorAction::Ignored);
        };

        let fetched = client
            .get(item.namespace.as_deref(), &item.name)
            .await
            .map_err(|e| Error::store("get", Self::describe(item), e))?;
        let Some(mut obj) = fetched else {
            debug!(%item, "Object not found");
            return Ok(DecoratorAction::ObjectAbsent);
        };

        let needs_update = self
            .applier
            .needs_update(&obj)
            .map_err(|e| Error::applier("determine whether to update", Self::describe(item), e))?;
        if !needs_update {
            debug!(%item, "Object in sync");
            return Ok(DecoratorAction::InSync);
        }

        self.applier
            .mutate(&mut obj)
            .map_err(|e| Error::applier("mutate", Self::describe(item), e))?;

        match client.update(&obj).await {
            Ok(_) => {
                info!(%item, "Updated object");
                Ok(DecoratorAction::Updated)
            }
            Err(e) if e.is_conflict() => {
                debug!(%item, error = %e, "Write conflict, awaiting redelivery");
                Ok(DecoratorAction::WriteConflict)
            }
            Err(e) => Err(Error::store("update", Self::describe(item), e)),
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use tether_core::{Kind, Object, ObjectMeta, StoreError};
    use tether_store::{InMemoryStore, WriteOp};

    use super::*;
    use crate::applier::ApplierError;

    #[derive(Debug, Clone, Default, PartialEq)]
    struct PodSpec {
        image: String,
    }

    impl Kind for PodSpec {
        const KIND: &'static str = "Pod";
    }

    type Pod = Object<PodSpec>;

    /// Marks every pod as seen.
    struct MarkSeen;

    impl DecoratorApplier<Pod> for MarkSeen {
        fn needs_update(&self, obj: &Pod) -> std::result::Result<bool, ApplierError> {
            Ok(!obj.meta.annotations.contains_key("example.com/seen"))
        }

        fn mutate(&self, obj: &mut Pod) -> std::result::Result<(), ApplierError> {
            obj.meta
                .annotations
                .insert("example.com/seen".to_string(), "true".to_string());
            Ok(())
        }
    }

    fn setup() -> (InMemoryStore<Pod>, DecoratorReconciler<Pod, MarkSeen>) {
        let store = InMemoryStore::<Pod>::new();
        let handle = StoreHandle::new("east", Arc::new(store.clone()));
        (store, DecoratorReconciler::new(MarkSeen).with_store(&handle))
    }

    fn item() -> WorkItem {
        WorkItem::new("east", Some("ns"), "pod")
    }

    async fn create_pod(store: &InMemoryStore<Pod>) {
        store
            .create(&Pod::new(ObjectMeta::namespaced("ns", "pod"), PodSpec::default()))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn should_decorate_then_settle() {
        let (store, reconciler) = setup();
        create_pod(&store).await;

        let first = reconciler.reconcile(&item()).await.unwrap();
        store.clear_writes().await;
        let second = reconciler.reconcile(&item()).await.unwrap();

        assert_eq!(first, DecoratorAction::Updated);
        assert_eq!(second, DecoratorAction::InSync);
        assert!(store.writes().await.is_empty());
        let pod = store.get(Some("ns"), "pod").await.unwrap().unwrap();
        assert_eq!(
            pod.meta.annotations.get("example.com/seen").map(String::as_str),
            Some("true")
        );
    }

    #[tokio::test]
    async fn should_ignore_missing_object_and_unknown_store() {
        let (_store, reconciler) = setup();

        let absent = reconciler.reconcile(&item()).await.unwrap();
        let ignored = reconciler
            .reconcile(&WorkItem::new("west", Some("ns"), "pod"))
            .await
            .unwrap();

        assert_eq!(absent, DecoratorAction::ObjectAbsent);
        assert_eq!(ignored, DecoratorAction::Ignored);
    }

    #[tokio::test]
    async fn should_treat_conflict_as_benign() {
        let (store, reconciler) = setup();
        create_pod(&store).await;
        store
            .fail_next(WriteOp::Update, StoreError::conflict("Pod", "ns/pod", "stale"))
            .await;

        let action = reconciler.reconcile(&item()).await.unwrap();

        assert_eq!(action, DecoratorAction::WriteConflict);
    }

    #[tokio::test]
    async fn should_surface_store_failures() {
        let (store, reconciler) = setup();
        create_pod(&store).await;
        store
            .fail_next(WriteOp::Update, StoreError::unavailable("down"))
            .await;

        let err = reconciler.reconcile(&item()).await.unwrap_err();

        assert!(err.to_string().contains("cannot update Pod pod in namespace ns in store east"));
    }
}
