//! Parent/child garbage-collecting reconciliation across resource stores.
//!
//! - [`tether_core`]: object metadata, selectors, back-references and store contracts
//! - [`tether_store`]: the in-memory store and its tracing wrapper
//! - [`tether_reconciler`]: the GC reconciler, its controller and the decorator variant

pub use tether_core;
pub use tether_reconciler;
pub use tether_store;

pub use tether_reconciler::{
    Applier, DecoratorApplier, GcConfig, GcController, GcReconciler, GcReconcilerBuilder,
    Reconcile,
};
