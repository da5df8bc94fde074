//! The garbage-collecting parent/child reconciler.
//!
//! Each pass re-reads the parent and its child and takes exactly one
//! lifecycle step:
//!
//! | parent   | finalizer | child   | step                  |
//! |----------|-----------|---------|-----------------------|
//! | absent   |           |         | nothing               |
//! | live     | no        |         | add finalizer         |
//! | live     | yes       | absent  | create child          |
//! | live     | yes       | present | update child if stale |
//! | deleting |           | present | delete child          |
//! | deleting | yes       | absent  | remove finalizer      |
//! | deleting | no        | absent  | nothing               |
//!
//! Optimistic-concurrency conflicts end the pass successfully; the change
//! that caused them triggers another pass.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use itertools::Itertools;
use tether_core::{
    LabelSelector, ObjectMeta, ParentReference, ReferenceError, Resource, StoreClient, StoreHandle,
    WorkItem, controller_reference, set_controller_reference,
};
use tracing::{debug, info, warn};

use crate::applier::Applier;
use crate::config::GcConfig;
use crate::describe;
use crate::error::{Error, Result};
use crate::selector::{
    Impersonator, MakeSelector, StorePair, default_selector, generated_name_prefix,
};
use crate::types::{GcAction, ReconcileOutcome};

/// Something that processes one work item per call.
#[async_trait]
pub trait Reconcile: Send + Sync {
    type Outcome: Send;

    /// Run one pass for `item`.
    async fn reconcile(&self, item: &WorkItem) -> Result<Self::Outcome>;
}

/// Run one pass, failing with [`Error::DeadlineExceeded`] if it takes longer
/// than `deadline`.
///
/// # Errors
///
/// Returns the pass's own error, or `DeadlineExceeded` on expiry.
pub async fn reconcile_with_deadline<R>(
    reconciler: &R,
    item: &WorkItem,
    deadline: Duration,
) -> Result<R::Outcome>
where
    R: Reconcile + ?Sized,
{
    tokio::time::timeout(deadline, reconciler.reconcile(item))
        .await
        .map_err(|_| Error::deadline_exceeded(item.to_string(), deadline))?
}

/// Keeps one child per parent in sync and deletes it before the parent goes.
///
/// Holds only construction-time clients; every pass is independent.
pub struct GcReconciler<P: Resource, C: Resource, A> {
    applier: A,
    parent_clients: BTreeMap<String, Arc<dyn StoreClient<P>>>,
    child_clients: BTreeMap<String, Arc<dyn StoreClient<C>>>,
    /// Keyed by (parent store, child store).
    child_writers: BTreeMap<(String, String), Arc<dyn StoreClient<C>>>,
    config: GcConfig,
    make_selector: MakeSelector<P>,
}

/// Stores and selector resolved for one pass.
struct Pass<'a, P: Resource, C: Resource> {
    parent_store: &'a str,
    parent_client: &'a dyn StoreClient<P>,
    child_store: &'a str,
    child_writer: &'a dyn StoreClient<C>,
    selector: &'a LabelSelector,
}

impl<P, C, A> GcReconciler<P, C, A>
where
    P: Resource,
    C: Resource,
    A: Applier<P, C>,
{
    /// Start building a reconciler around `applier`.
    pub fn builder(applier: A) -> GcReconcilerBuilder<P, C, A> {
        GcReconcilerBuilder::new(applier)
    }

    pub const fn config(&self) -> &GcConfig {
        &self.config
    }

    pub const fn applier(&self) -> &A {
        &self.applier
    }

    /// Names of the parent stores served.
    pub fn parent_stores(&self) -> impl Iterator<Item = &str> {
        self.parent_clients.keys().map(String::as_str)
    }

    /// Names of the child stores served.
    pub fn child_stores(&self) -> impl Iterator<Item = &str> {
        self.child_clients.keys().map(String::as_str)
    }

    async fn reconcile_parent(&self, item: &WorkItem) -> Result<ReconcileOutcome> {
        let Some(parent_client) = self.parent_clients.get(&item.store) else {
            debug!(%item, "No such parent store, ignoring work item");
            return Ok(ReconcileOutcome::new(GcAction::Ignored));
        };
        let parent_store = item.store.as_str();

        let fetched = parent_client
            .get(item.namespace.as_deref(), &item.name)
            .await
            .map_err(|e| {
                let object = describe::parent_object(
                    P::kind(),
                    &item.name,
                    item.namespace.as_deref(),
                    parent_store,
                );
                Error::store("get", object, e)
            })?;
        let Some(mut parent) = fetched else {
            debug!(%item, "Parent not found");
            return Ok(ReconcileOutcome::new(GcAction::ParentAbsent));
        };
        parent.meta_mut().store = Some(item.store.clone());

        let child_store = self.child_store_for(&parent, parent_store)?;
        let child_client = self
            .child_clients
            .get(&child_store)
            .ok_or_else(|| Error::unknown_store("child", child_store.as_str()))?;
        let child_writer = self
            .child_writers
            .get(&(item.store.clone(), child_store.clone()))
            .ok_or_else(|| Error::unknown_store("child", child_store.as_str()))?;

        let stores = StorePair {
            parent: parent_store,
            child: &child_store,
        };
        let selector = (self.make_selector)(&parent, stores);
        let pass = Pass {
            parent_store,
            parent_client: &**parent_client,
            child_store: &child_store,
            child_writer: &**child_writer,
            selector: &selector,
        };

        let child = match self.find_child(&**child_client, &pass).await {
            Ok(child) => {
                self.verify_owner(&parent, &child, &pass)?;
                Some(child)
            }
            Err(e) if e.is_child_not_found() => None,
            Err(e) => {
                if e.is_duplicate_child() {
                    warn!(%item, error = %e, "Selector matches more than one child");
                }
                return Err(e);
            }
        };

        let mut outcome = ReconcileOutcome::new(GcAction::WriteConflict);
        let Some(parent) = self
            .derive_parent(parent, child.as_ref(), &pass, &mut outcome)
            .await?
        else {
            return Ok(outcome);
        };

        outcome.action = self.step(parent, child, &pass).await?;
        Ok(outcome)
    }

    fn child_store_for(&self, parent: &P, parent_store: &str) -> Result<String> {
        let store = self.applier.child_store_for(parent).map_err(|e| {
            Error::applier(
                "determine child store of",
                describe_parent(parent, parent_store),
                e,
            )
        })?;
        Ok(store.unwrap_or_else(|| parent_store.to_owned()))
    }

    /// The single child matching the pass's selector.
    async fn find_child(&self, client: &dyn StoreClient<C>, pass: &Pass<'_, P, C>) -> Result<C> {
        let namespace = self.config.child_namespace.as_deref();
        let resource = || describe::child_resource(C::kind(), namespace, pass.child_store);

        let children = client.list(namespace, pass.selector).await.map_err(|e| {
            Error::store(
                "list",
                format!("{} with label selector {}", resource(), pass.selector),
                e,
            )
        })?;

        let count = children.len();
        let mut children = children.into_iter();
        match (children.next(), children.next()) {
            (None, _) => Err(Error::child_not_found(resource(), pass.selector.to_string())),
            (Some(mut child), None) => {
                child.meta_mut().store = Some(pass.child_store.to_owned());
                Ok(child)
            }
            (Some(_), Some(_)) => Err(Error::duplicate_child(
                resource(),
                pass.selector.to_string(),
                count,
            )),
        }
    }

    /// Fail if `child` is controlled by some other parent.
    fn verify_owner(&self, parent: &P, child: &C, pass: &Pass<'_, P, C>) -> Result<()> {
        let Some(existing) = controller_reference(child.meta()) else {
            return Ok(());
        };
        let ours = ParentReference::controller_of(parent, pass.parent_store);
        if existing.refers_to_same_parent(&ours) {
            return Ok(());
        }
        Err(Error::adoption(
            describe_child(child, pass.child_store),
            ReferenceError::already_owned(
                child.meta().key().to_string(),
                existing.to_string(),
                ours.to_string(),
            ),
        ))
    }

    /// Let the applier derive parent spec and status from the child, and
    /// write what changed. `None` when a write hit a conflict.
    async fn derive_parent(
        &self,
        mut parent: P,
        child: Option<&C>,
        pass: &Pass<'_, P, C>,
        outcome: &mut ReconcileOutcome,
    ) -> Result<Option<P>> {
        let saved = parent.meta().clone();
        let change = self
            .applier
            .mutate_parent(&mut parent, child)
            .map_err(|e| {
                Error::applier(
                    "derive state of",
                    describe_parent(&parent, pass.parent_store),
                    e,
                )
            })?;
        parent.meta_mut().restore_core_fields(&saved);

        if change.spec {
            let result = pass.parent_client.update(&parent).await;
            let Some(mut updated) =
                tolerate_conflict(result, "update", || describe_parent(&parent, pass.parent_store))?
            else {
                return Ok(None);
            };
            // The store keeps its own status on spec writes.
            updated.take_status(&parent);
            updated.meta_mut().store = Some(pass.parent_store.to_owned());
            parent = updated;
            outcome.parent_updated = true;
            info!(parent = %parent.meta().key(), store = pass.parent_store, "Updated parent");
        }

        if change.status && self.config.parent_status_updates {
            let result = pass.parent_client.update_status(&parent).await;
            let Some(mut updated) = tolerate_conflict(result, "update status of", || {
                describe_parent(&parent, pass.parent_store)
            })?
            else {
                return Ok(None);
            };
            updated.meta_mut().store = Some(pass.parent_store.to_owned());
            parent = updated;
            outcome.parent_status_updated = true;
            info!(
                parent = %parent.meta().key(),
                store = pass.parent_store,
                "Updated parent status"
            );
        } else if change.status {
            debug!(
                parent = %parent.meta().key(),
                "Parent status updates disabled, discarding derived status"
            );
        }

        Ok(Some(parent))
    }

    /// Take the one lifecycle step the current state calls for.
    async fn step(&self, parent: P, child: Option<C>, pass: &Pass<'_, P, C>) -> Result<GcAction> {
        let finalizer = self.config.finalizer.as_str();

        if parent.is_deletion_requested() {
            return match child {
                Some(child) => self.delete_child(&child, pass).await,
                None if parent.has_finalizer(finalizer) => {
                    self.remove_finalizer(parent, pass).await
                }
                None => Ok(GcAction::Released),
            };
        }

        if !parent.has_finalizer(finalizer) {
            return self.add_finalizer(parent, pass).await;
        }

        match child {
            None => self.create_child(&parent, pass).await,
            Some(child) => self.sync_child(&parent, child, pass).await,
        }
    }

    async fn add_finalizer(&self, mut parent: P, pass: &Pass<'_, P, C>) -> Result<GcAction> {
        parent.add_finalizer(&self.config.finalizer);
        let result = pass.parent_client.update(&parent).await;
        let written = tolerate_conflict(result, "add finalizer to", || {
            describe_parent(&parent, pass.parent_store)
        })?;
        Ok(match written {
            Some(_) => {
                info!(parent = %parent.meta().key(), store = pass.parent_store, "Added finalizer");
                GcAction::FinalizerAdded
            }
            None => GcAction::WriteConflict,
        })
    }

    async fn remove_finalizer(&self, mut parent: P, pass: &Pass<'_, P, C>) -> Result<GcAction> {
        parent.remove_finalizer(&self.config.finalizer);
        let result = pass.parent_client.update(&parent).await;
        let written = tolerate_conflict(result, "remove finalizer from", || {
            describe_parent(&parent, pass.parent_store)
        })?;
        Ok(match written {
            Some(_) => {
                info!(
                    parent = %parent.meta().key(),
                    store = pass.parent_store,
                    "Removed finalizer"
                );
                GcAction::FinalizerRemoved
            }
            None => GcAction::WriteConflict,
        })
    }

    async fn create_child(&self, parent: &P, pass: &Pass<'_, P, C>) -> Result<GcAction> {
        let expected = self.make_expected_child(parent, pass)?;
        match pass.child_writer.create(&expected).await {
            Ok(created) => {
                info!(
                    parent = %parent.meta().key(),
                    child = %created.meta().key(),
                    store = pass.child_store,
                    "Created child"
                );
                Ok(GcAction::ChildCreated)
            }
            Err(e) if e.is_already_exists() => {
                debug!(parent = %parent.meta().key(), error = %e, "Child created concurrently");
                Ok(GcAction::ChildCreateRaced)
            }
            Err(e) => Err(Error::store(
                "create",
                describe_child(&expected, pass.child_store),
                e,
            )),
        }
    }

    async fn sync_child(
        &self,
        parent: &P,
        mut child: C,
        pass: &Pass<'_, P, C>,
    ) -> Result<GcAction> {
        let expected = if self.config.make_expected_child_when_found {
            Some(self.make_expected_child(parent, pass)?)
        } else {
            None
        };
        let object = describe_child(&child, pass.child_store);

        let needs_update = self
            .applier
            .needs_update(parent, &child, expected.as_ref())
            .map_err(|e| Error::applier("determine whether to update", object.clone(), e))?;
        if !needs_update {
            debug!(child = %child.meta().key(), store = pass.child_store, "Child in sync");
            return Ok(GcAction::ChildInSync);
        }

        let saved = child.meta().clone();
        self.applier
            .mutate(parent, &mut child, expected.as_ref())
            .map_err(|e| Error::applier("mutate", object.clone(), e))?;
        child.meta_mut().restore_core_fields(&saved);

        if controller_reference(child.meta()).is_none() {
            debug!(child = %child.meta().key(), "Adopting child without a controller reference");
            set_controller_reference(
                child.meta_mut(),
                ParentReference::controller_of(parent, pass.parent_store),
            )
            .map_err(|e| Error::adoption(object.clone(), e))?;
        }

        let result = pass.child_writer.update(&child).await;
        Ok(match tolerate_conflict(result, "update", || object)? {
            Some(_) => {
                info!(child = %child.meta().key(), store = pass.child_store, "Updated child");
                GcAction::ChildUpdated
            }
            None => GcAction::WriteConflict,
        })
    }

    async fn delete_child(&self, child: &C, pass: &Pass<'_, P, C>) -> Result<GcAction> {
        match pass.child_writer.delete(child).await {
            Ok(()) => {
                info!(child = %child.meta().key(), store = pass.child_store, "Deleted child");
                Ok(GcAction::ChildDeleted)
            }
            Err(e) if e.is_not_found() => {
                debug!(child = %child.meta().key(), "Child already gone");
                Ok(GcAction::ChildDeleted)
            }
            Err(e) if e.is_conflict() => {
                debug!(
                    child = %child.meta().key(),
                    error = %e,
                    "Write conflict, awaiting redelivery"
                );
                Ok(GcAction::WriteConflict)
            }
            Err(e) => Err(Error::store(
                "delete",
                describe_child(child, pass.child_store),
                e,
            )),
        }
    }

    /// A fresh child for `parent`: the applier's domain fields plus the
    /// placement, labels, name prefix and back-reference owned here.
    fn make_expected_child(&self, parent: &P, pass: &Pass<'_, P, C>) -> Result<C> {
        let mut child = C::default();
        self.applier
            .make_child(parent, &mut child)
            .map_err(|e| {
                Error::applier(
                    "make child from",
                    describe_parent(parent, pass.parent_store),
                    e,
                )
            })?;

        let namespace = self
            .config
            .child_namespace
            .clone()
            .or_else(|| parent.namespace().map(ToOwned::to_owned));
        let mut meta = ObjectMeta {
            namespace,
            generate_name: Some(generated_name_prefix(parent)),
            annotations: std::mem::take(&mut child.meta_mut().annotations),
            store: Some(pass.child_store.to_owned()),
            ..ObjectMeta::default()
        };
        if self.config.copy_labels {
            meta.labels.clone_from(parent.labels());
        }
        meta.labels.extend(pass.selector.to_labels());

        set_controller_reference(
            &mut meta,
            ParentReference::controller_of(parent, pass.parent_store),
        )
        .map_err(|e| Error::adoption(describe_parent(parent, pass.parent_store), e))?;

        *child.meta_mut() = meta;
        Ok(child)
    }
}

#[async_trait]
impl<P, C, A> Reconcile for GcReconciler<P, C, A>
where
    P: Resource,
    C: Resource,
    A: Applier<P, C>,
{
    type Outcome = ReconcileOutcome;

    async fn reconcile(&self, item: &WorkItem) -> Result<ReconcileOutcome> {
        debug!(%item, "Reconciling");
        let outcome = self.reconcile_parent(item).await?;
        info!(%item, outcome = %outcome.description(), "Reconciled");
        Ok(outcome)
    }
}

/// Map a write result: conflicts become `Ok(None)`, other failures are
/// wrapped with the object's description.
fn tolerate_conflict<T>(
    result: tether_core::Result<T>,
    action: &str,
    object: impl FnOnce() -> String,
) -> Result<Option<T>> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(e) if e.is_conflict() => {
            debug!(action, error = %e, "Write conflict, awaiting redelivery");
            Ok(None)
        }
        Err(e) => Err(Error::store(action, object(), e)),
    }
}

fn describe_parent<P: Resource>(parent: &P, store: &str) -> String {
    describe::parent_object(P::kind(), parent.name(), parent.namespace(), store)
}

fn describe_child<C: Resource>(child: &C, store: &str) -> String {
    let name = if child.name().is_empty() {
        child.meta().generate_name.as_deref().unwrap_or_default()
    } else {
        child.name()
    };
    describe::child_object(C::kind(), name, child.namespace(), store)
}

/// Builder for [`GcReconciler`].
pub struct GcReconcilerBuilder<P: Resource, C: Resource, A> {
    applier: A,
    parent_stores: Vec<StoreHandle<P>>,
    child_stores: Vec<StoreHandle<C>>,
    config: GcConfig,
    make_selector: Option<MakeSelector<P>>,
    impersonator: Option<Impersonator>,
}

impl<P, C, A> GcReconcilerBuilder<P, C, A>
where
    P: Resource,
    C: Resource,
    A: Applier<P, C>,
{
    pub fn new(applier: A) -> Self {
        Self {
            applier,
            parent_stores: Vec::new(),
            child_stores: Vec::new(),
            config: GcConfig::default(),
            make_selector: None,
            impersonator: None,
        }
    }

    /// Serve parents in `store`.
    #[must_use]
    pub fn with_parent_store(mut self, store: StoreHandle<P>) -> Self {
        self.parent_stores.push(store);
        self
    }

    /// Allow children in `store`.
    #[must_use]
    pub fn with_child_store(mut self, store: StoreHandle<C>) -> Self {
        self.child_stores.push(store);
        self
    }

    /// Set the configuration.
    #[must_use]
    pub fn with_config(mut self, config: GcConfig) -> Self {
        self.config = config;
        self
    }

    /// Replace the default parent-name/namespace/store selector.
    #[must_use]
    pub fn with_selector<F>(mut self, make_selector: F) -> Self
    where
        F: Fn(&P, StorePair<'_>) -> LabelSelector + Send + Sync + 'static,
    {
        self.make_selector = Some(Arc::new(make_selector));
        self
    }

    /// Write children as the identity returned for the parent's store.
    #[must_use]
    pub fn with_impersonator<F>(mut self, impersonator: F) -> Self
    where
        F: Fn(&str) -> String + Send + Sync + 'static,
    {
        self.impersonator = Some(Arc::new(impersonator));
        self
    }

    pub fn parent_stores(&self) -> &[StoreHandle<P>] {
        &self.parent_stores
    }

    pub fn child_stores(&self) -> &[StoreHandle<C>] {
        &self.child_stores
    }

    pub const fn config(&self) -> &GcConfig {
        &self.config
    }

    /// Build the reconciler.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] when the configuration is invalid, a
    /// store role has no stores, or a store name repeats within a role.
    pub fn build(self) -> Result<GcReconciler<P, C, A>> {
        self.config.validate()?;

        let parent_clients = clients_by_name("parent", &self.parent_stores)?;
        let child_clients = clients_by_name("child", &self.child_stores)?;

        let child_writers = self
            .parent_stores
            .iter()
            .cartesian_product(&self.child_stores)
            .map(|(parent, child)| {
                let writer = match &self.impersonator {
                    Some(identity_for) => {
                        child.client().with_identity(&identity_for(parent.name()))
                    }
                    None => Arc::clone(child.client()),
                };
                ((parent.name().to_owned(), child.name().to_owned()), writer)
            })
            .collect();

        let make_selector: MakeSelector<P> = match self.make_selector {
            Some(make_selector) => make_selector,
            None => Arc::new(default_selector::<P>),
        };

        Ok(GcReconciler {
            applier: self.applier,
            parent_clients,
            child_clients,
            child_writers,
            config: self.config,
            make_selector,
        })
    }
}

fn clients_by_name<R: Resource>(
    role: &str,
    stores: &[StoreHandle<R>],
) -> Result<BTreeMap<String, Arc<dyn StoreClient<R>>>> {
    if stores.is_empty() {
        return Err(Error::invalid_config(format!(
            "at least one {role} store is required"
        )));
    }
    let mut clients = BTreeMap::new();
    for store in stores {
        if clients
            .insert(store.name().to_owned(), Arc::clone(store.client()))
            .is_some()
        {
            return Err(Error::invalid_config(format!(
                "{role} store '{}' is configured twice",
                store.name()
            )));
        }
    }
    Ok(clients)
}
