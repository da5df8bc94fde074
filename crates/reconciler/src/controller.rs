//! Wiring reconcilers to store watches.
//!
//! A controller builds its reconciler and registers the watches that feed
//! its work queue. Draining the queue, retries and worker pools belong to
//! the caller.

use std::sync::Arc;

use tether_core::{
    Resource, StoreHandle, WatchOptions, WorkQueue, watch_and_enqueue_by_own_identity,
    watch_and_enqueue_by_owner_identity,
};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::applier::{Applier, DecoratorApplier};
use crate::decorator::DecoratorReconciler;
use crate::describe;
use crate::error::{Error, Result};
use crate::reconciler::{GcReconciler, GcReconcilerBuilder};

fn stop(watches: &mut Vec<JoinHandle<()>>) {
    for watch in watches.drain(..) {
        watch.abort();
    }
}

/// A running GC reconciler's watches.
///
/// Parent changes enqueue the parent. Child changes enqueue the parent named
/// in the child's controlling back-reference. Watches stop on drop.
pub struct GcController<P: Resource, C: Resource, A> {
    reconciler: Arc<GcReconciler<P, C, A>>,
    watches: Vec<JoinHandle<()>>,
}

impl<P, C, A> GcController<P, C, A>
where
    P: Resource,
    C: Resource,
    A: Applier<P, C>,
{
    /// Build the reconciler and start watching every configured store.
    ///
    /// `parent_options` filters parent changes. Child watches are scoped to
    /// the configured child namespace. Must be called within a tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns the builder's error when the reconciler cannot be built.
    pub fn start(
        builder: GcReconcilerBuilder<P, C, A>,
        queue: Arc<dyn WorkQueue>,
        parent_options: WatchOptions,
    ) -> Result<Self> {
        let parent_stores: Vec<StoreHandle<P>> = builder.parent_stores().to_vec();
        let child_stores: Vec<StoreHandle<C>> = builder.child_stores().to_vec();
        let child_options = WatchOptions {
            namespace: builder.config().child_namespace.clone(),
            selector: None,
        };
        let reconciler = Arc::new(builder.build()?);

        let capacity = parent_stores.len().saturating_add(child_stores.len());
        let mut watches = Vec::with_capacity(capacity);
        for store in &parent_stores {
            debug!(
                watch = %describe::parent_resource(P::kind(), store.name()),
                "Watching parents"
            );
            watches.push(watch_and_enqueue_by_own_identity(
                store.name(),
                &**store.source(),
                parent_options.clone(),
                Arc::clone(&queue),
            ));
        }
        for store in &child_stores {
            debug!(
                watch = %describe::child_resource(
                    C::kind(),
                    child_options.namespace.as_deref(),
                    store.name(),
                ),
                "Watching children"
            );
            watches.push(watch_and_enqueue_by_owner_identity(
                store.name(),
                &**store.source(),
                P::kind(),
                child_options.clone(),
                Arc::clone(&queue),
            ));
        }

        info!(
            parent_kind = P::kind(),
            child_kind = C::kind(),
            parent_stores = parent_stores.len(),
            child_stores = child_stores.len(),
            "GC controller started"
        );

        Ok(Self {
            reconciler,
            watches,
        })
    }

    pub const fn reconciler(&self) -> &Arc<GcReconciler<P, C, A>> {
        &self.reconciler
    }

    /// Stop all watches.
    pub fn shutdown(mut self) {
        stop(&mut self.watches);
    }
}

impl<P: Resource, C: Resource, A> Drop for GcController<P, C, A> {
    fn drop(&mut self) {
        stop(&mut self.watches);
    }
}

/// A running decorator reconciler's watches.
pub struct DecoratorController<R: Resource, A> {
    reconciler: Arc<DecoratorReconciler<R, A>>,
    watches: Vec<JoinHandle<()>>,
}

impl<R, A> DecoratorController<R, A>
where
    R: Resource,
    A: DecoratorApplier<R>,
{
    /// Build a decorator over `stores` and watch each of them.
    ///
    /// Must be called within a tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] when `stores` is empty.
    pub fn start(
        applier: A,
        stores: &[StoreHandle<R>],
        queue: Arc<dyn WorkQueue>,
        options: WatchOptions,
    ) -> Result<Self> {
        if stores.is_empty() {
            return Err(Error::invalid_config("at least one store is required"));
        }

        let reconciler = stores
            .iter()
            .fold(DecoratorReconciler::new(applier), |r, store| r.with_store(store));
        let watches = stores
            .iter()
            .map(|store| {
                watch_and_enqueue_by_own_identity(
                    store.name(),
                    &**store.source(),
                    options.clone(),
                    Arc::clone(&queue),
                )
            })
            .collect();

        info!(kind = R::kind(), stores = stores.len(), "Decorator controller started");

        Ok(Self {
            reconciler: Arc::new(reconciler),
            watches,
        })
    }

    pub const fn reconciler(&self) -> &Arc<DecoratorReconciler<R, A>> {
        &self.reconciler
    }

    /// Stop all watches.
    pub fn shutdown(mut self) {
        stop(&mut self.watches);
    }
}

impl<R: Resource, A> Drop for DecoratorController<R, A> {
    fn drop(&mut self) {
        stop(&mut self.watches);
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use std::time::Duration;

    use tether_core::{Kind, Object, ObjectMeta, StoreClient, WorkItem};
    use tether_store::InMemoryStore;
    use tokio::sync::mpsc;

    use super::*;
    use crate::applier::ApplierError;
    use crate::config::GcConfig;
    use crate::reconciler::Reconcile;
    use crate::types::GcAction;

    #[derive(Debug, Clone, Default)]
    struct SourceSpec;

    impl Kind for SourceSpec {
        const KIND: &'static str = "Source";
    }

    #[derive(Debug, Clone, Default)]
    struct MirrorSpec;

    impl Kind for MirrorSpec {
        const KIND: &'static str = "Mirror";
    }

    type Source = Object<SourceSpec>;
    type Mirror = Object<MirrorSpec>;

    struct MirrorApplier;

    impl Applier<Source, Mirror> for MirrorApplier {
        fn make_child(&self, _: &Source, _: &mut Mirror) -> std::result::Result<(), ApplierError> {
            Ok(())
        }

        fn needs_update(
            &self,
            _: &Source,
            _: &Mirror,
            _: Option<&Mirror>,
        ) -> std::result::Result<bool, ApplierError> {
            Ok(false)
        }

        fn mutate(
            &self,
            _: &Source,
            _: &mut Mirror,
            _: Option<&Mirror>,
        ) -> std::result::Result<(), ApplierError> {
            Ok(())
        }
    }

    async fn next_item(rx: &mut mpsc::UnboundedReceiver<WorkItem>) -> WorkItem {
        tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .unwrap()
            .unwrap()
    }

    #[tokio::test]
    async fn should_enqueue_parent_for_parent_and_child_changes() {
        let parents = InMemoryStore::<Source>::new_arc();
        let children = InMemoryStore::<Mirror>::new_arc();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let builder = GcReconcilerBuilder::<Source, Mirror, _>::new(MirrorApplier)
            .with_parent_store(StoreHandle::new("east", Arc::clone(&parents)))
            .with_child_store(StoreHandle::new("east", Arc::clone(&children)))
            .with_config(GcConfig::single_store());

        let controller =
            GcController::start(builder, Arc::new(tx), WatchOptions::default()).unwrap();
        parents
            .create(&Source::new(ObjectMeta::namespaced("ns", "p"), SourceSpec))
            .await
            .unwrap();

        let expected = WorkItem::new("east", Some("ns"), "p");
        let item = next_item(&mut rx).await;
        assert_eq!(item, expected);

        // Finalizer added, then the child is created.
        let reconciler = controller.reconciler();
        assert_eq!(reconciler.reconcile(&item).await.unwrap().action, GcAction::FinalizerAdded);
        assert_eq!(next_item(&mut rx).await, expected);
        assert_eq!(reconciler.reconcile(&item).await.unwrap().action, GcAction::ChildCreated);

        // The child's creation is routed back to the parent.
        assert_eq!(next_item(&mut rx).await, expected);

        controller.shutdown();
    }

    #[tokio::test]
    async fn should_fail_to_start_without_stores() {
        let (tx, _rx) = mpsc::unbounded_channel::<WorkItem>();
        let builder = GcReconcilerBuilder::<Source, Mirror, _>::new(MirrorApplier);

        let result = GcController::start(builder, Arc::new(tx), WatchOptions::default());

        assert!(matches!(result, Err(Error::InvalidConfig { .. })));
    }

    struct Noop;

    impl DecoratorApplier<Source> for Noop {
        fn needs_update(&self, _: &Source) -> std::result::Result<bool, ApplierError> {
            Ok(false)
        }

        fn mutate(&self, _: &mut Source) -> std::result::Result<(), ApplierError> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn should_watch_decorated_store() {
        let store = InMemoryStore::<Source>::new_arc();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let controller = DecoratorController::<Source, _>::start(
            Noop,
            &[StoreHandle::new("east", Arc::clone(&store))],
            Arc::new(tx),
            WatchOptions::in_namespace("ns"),
        )
        .unwrap();

        store
            .create(&Source::new(ObjectMeta::namespaced("other", "skip"), SourceSpec))
            .await
            .unwrap();
        store
            .create(&Source::new(ObjectMeta::namespaced("ns", "keep"), SourceSpec))
            .await
            .unwrap();

        assert_eq!(next_item(&mut rx).await, WorkItem::new("east", Some("ns"), "keep"));
        controller.shutdown();
    }
}
