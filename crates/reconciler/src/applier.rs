//! Integration-supplied behaviour plugged into the reconcilers.

use tether_core::Resource;
use thiserror::Error;

/// Failure reported by an applier callback.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{reason}")]
pub struct ApplierError {
    pub reason: String,
}

impl ApplierError {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

/// Which halves of the parent an applier changed in [`Applier::mutate_parent`].
///
/// Spec and status are separate optimistic-concurrency domains and are
/// written separately.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ParentChange {
    pub spec: bool,
    pub status: bool,
}

impl ParentChange {
    /// Nothing changed.
    pub const NONE: Self = Self {
        spec: false,
        status: false,
    };

    pub const fn spec() -> Self {
        Self {
            spec: true,
            status: false,
        }
    }

    pub const fn status() -> Self {
        Self {
            spec: false,
            status: true,
        }
    }

    pub const fn both() -> Self {
        Self {
            spec: true,
            status: true,
        }
    }

    pub const fn any(self) -> bool {
        self.spec || self.status
    }
}

/// Builds and maintains the child derived from a parent.
///
/// Callbacks touch domain fields only. Name, namespace, labels, finalizers
/// and back-references are owned by the reconciler and overwritten after
/// each callback returns.
pub trait Applier<P: Resource, C: Resource>: Send + Sync {
    /// Name of the store the child of `parent` lives in.
    ///
    /// `Ok(None)` places the child in the parent's own store.
    fn child_store_for(&self, _parent: &P) -> Result<Option<String>, ApplierError> {
        Ok(None)
    }

    /// Populate the domain fields of a fresh `child`.
    fn make_child(&self, parent: &P, child: &mut C) -> Result<(), ApplierError>;

    /// Whether `child` has drifted from what `parent` requires.
    ///
    /// `expected` is a freshly built child when the reconciler is configured
    /// to compute one for found children.
    fn needs_update(
        &self,
        parent: &P,
        child: &C,
        expected: Option<&C>,
    ) -> Result<bool, ApplierError>;

    /// Bring `child` back in line with `parent`.
    fn mutate(&self, parent: &P, child: &mut C, expected: Option<&C>) -> Result<(), ApplierError>;

    /// Derive parent state from the child, if found.
    fn mutate_parent(
        &self,
        _parent: &mut P,
        _child: Option<&C>,
    ) -> Result<ParentChange, ApplierError> {
        Ok(ParentChange::NONE)
    }
}

/// Maintains fields of a single existing object in place.
pub trait DecoratorApplier<R: Resource>: Send + Sync {
    fn needs_update(&self, obj: &R) -> Result<bool, ApplierError>;

    fn mutate(&self, obj: &mut R) -> Result<(), ApplierError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parent_change_any() {
        assert!(!ParentChange::NONE.any());
        assert!(ParentChange::spec().any());
        assert!(ParentChange::status().any());
        assert_eq!(ParentChange::default(), ParentChange::NONE);
        assert_eq!(
            ParentChange::both(),
            ParentChange {
                spec: true,
                status: true
            }
        );
    }

    #[test]
    fn test_applier_error_display() {
        assert_eq!(ApplierError::new("bad input").to_string(), "bad input");
    }
}
