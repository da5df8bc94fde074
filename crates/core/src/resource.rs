//! The capability set the reconciler needs from an object.

use std::collections::BTreeMap;
use std::fmt::Debug;

use serde::{Deserialize, Serialize};

use crate::meta::{ObjectMeta, Uid};

/// Metadata access for a stored object.
///
/// The reconciler never looks past metadata; domain fields stay opaque to it
/// and are only touched by integration callbacks.
pub trait Resource: Clone + Debug + Default + Send + Sync + 'static {
    /// Kind name used in descriptions and back-references.
    fn kind() -> &'static str;

    fn meta(&self) -> &ObjectMeta;

    fn meta_mut(&mut self) -> &mut ObjectMeta;

    /// Replace this object's status with the status of `other`.
    ///
    /// Stores use this to keep the spec and status write paths apart.
    /// Kinds without a status leave the default no-op.
    fn take_status(&mut self, _other: &Self) {}

    fn name(&self) -> &str {
        &self.meta().name
    }

    fn namespace(&self) -> Option<&str> {
        self.meta().namespace.as_deref()
    }

    fn uid(&self) -> Option<Uid> {
        self.meta().uid
    }

    fn labels(&self) -> &BTreeMap<String, String> {
        &self.meta().labels
    }

    fn finalizers(&self) -> &[String] {
        &self.meta().finalizers
    }

    fn has_finalizer(&self, finalizer: &str) -> bool {
        self.meta().has_finalizer(finalizer)
    }

    fn is_deletion_requested(&self) -> bool {
        self.meta().is_deletion_requested()
    }

    /// Returns `false` when the finalizer was already present.
    fn add_finalizer(&mut self, finalizer: &str) -> bool {
        self.meta_mut().add_finalizer(finalizer)
    }

    /// Returns `false` when the finalizer was absent.
    fn remove_finalizer(&mut self, finalizer: &str) -> bool {
        self.meta_mut().remove_finalizer(finalizer)
    }
}

/// Marker for the spec half of an [`Object`], naming its kind.
pub trait Kind {
    const KIND: &'static str;
}

/// Placeholder status for kinds that have none.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NoStatus;

/// A generic object: metadata, a domain spec and an optional status.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Object<S, T = NoStatus> {
    pub meta: ObjectMeta,
    pub spec: S,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<T>,
}

impl<S: Default, T> Default for Object<S, T> {
    fn default() -> Self {
        Self::new(ObjectMeta::default(), S::default())
    }
}

impl<S, T> Object<S, T> {
    /// Create an object with no status.
    pub const fn new(meta: ObjectMeta, spec: S) -> Self {
        Self {
            meta,
            spec,
            status: None,
        }
    }

    /// Attach a status.
    #[must_use]
    pub fn with_status(mut self, status: T) -> Self {
        self.status = Some(status);
        self
    }
}

impl<S, T> Resource for Object<S, T>
where
    S: Kind + Clone + Debug + Default + Send + Sync + 'static,
    T: Clone + Debug + Send + Sync + 'static,
{
    fn kind() -> &'static str {
        S::KIND
    }

    fn meta(&self) -> &ObjectMeta {
        &self.meta
    }

    fn meta_mut(&mut self) -> &mut ObjectMeta {
        &mut self.meta
    }

    fn take_status(&mut self, other: &Self) {
        self.status.clone_from(&other.status);
    }
}
