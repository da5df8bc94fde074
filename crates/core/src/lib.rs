//! Core contracts for parent/child reconciliation.
//!
//! - **Metadata**: identity, labels, finalizers and deletion state of an object
//! - **Resources**: the capability set the reconciler relies on
//! - **Selectors**: label predicates used to discover children
//! - **Back-references**: parent identity stamped onto children
//! - **Stores**: typed client and watch contracts, named store handles
//! - **Watches**: turning store changes into work items

#![forbid(clippy::unwrap_used)]
#![forbid(clippy::expect_used)]
#![forbid(clippy::panic)]

pub mod error;
pub mod meta;
pub mod reference;
pub mod resource;
pub mod selector;
pub mod store;
pub mod watch;

pub use error::{ReferenceError, Result, StoreError};
pub use meta::{ObjectKey, ObjectMeta, Uid};
pub use reference::{ParentReference, controller_reference, set_controller_reference};
pub use resource::{Kind, NoStatus, Object, Resource};
pub use selector::LabelSelector;
pub use store::{StoreClient, StoreHandle, WatchEvent, WatchSource};
pub use watch::{
    WatchOptions, WorkItem, WorkQueue, watch_and_enqueue_by_owner_identity,
    watch_and_enqueue_by_own_identity,
};
