//! Finalizer-guarded parent/child reconciliation.
//!
//! A [`GcReconciler`] keeps exactly one child object derived from each parent
//! object, possibly in a different store, and deletes the child before the
//! parent is allowed to disappear.
//!
//! # Key Concepts
//!
//! ## Level-triggered passes
//!
//! Every pass re-reads the parent and its child and takes one step. Passes
//! are idempotent and safe under duplicate, delayed or reordered work items.
//!
//! ## Lifecycle
//!
//! 1. A live parent gets the lifecycle finalizer
//! 2. The child is created, labelled with the parent's selector and stamped
//!    with a back-reference
//! 3. The child is kept in sync while the parent lives
//! 4. Once deletion is requested the child is deleted
//! 5. With the child gone the finalizer is removed and the store finishes
//!    deleting the parent
//!
//! ## Integrations
//!
//! An [`Applier`] supplies domain behaviour: building the child, deciding if
//! it drifted, fixing it and deriving parent state from it. The
//! [`DecoratorReconciler`] is the single-object variant.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use tether_core::{StoreHandle, WatchOptions};
//! use tether_reconciler::{GcConfig, GcController, GcReconcilerBuilder, reconcile_with_deadline};
//!
//! let builder = GcReconcilerBuilder::new(MyApplier)
//!     .with_parent_store(StoreHandle::new("east", east))
//!     .with_child_store(StoreHandle::new("west", west))
//!     .with_config(GcConfig::default().child_namespace("copies"))
//!     .with_impersonator(|store| format!("tether:{store}"));
//!
//! let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
//! let controller = GcController::start(builder, Arc::new(tx), WatchOptions::default())?;
//! while let Some(item) = rx.recv().await {
//!     reconcile_with_deadline(&**controller.reconciler(), &item, deadline).await?;
//! }
//! ```

#![forbid(clippy::unwrap_used)]
#![forbid(clippy::expect_used)]
#![forbid(clippy::panic)]

pub mod applier;
pub mod config;
pub mod controller;
pub mod decorator;
pub mod describe;
pub mod error;
pub mod reconciler;
pub mod selector;
pub mod types;

pub use applier::{Applier, ApplierError, DecoratorApplier, ParentChange};
pub use config::GcConfig;
pub use controller::{DecoratorController, GcController};
pub use decorator::DecoratorReconciler;
pub use error::{Error, Result};
pub use reconciler::{GcReconciler, GcReconcilerBuilder, Reconcile, reconcile_with_deadline};
pub use selector::{
    Impersonator, LABEL_PARENT_NAME, LABEL_PARENT_NAMESPACE, LABEL_PARENT_STORE, MakeSelector,
    StorePair, default_selector, generated_name_prefix,
};
pub use types::{DecoratorAction, GcAction, ReconcileOutcome};
