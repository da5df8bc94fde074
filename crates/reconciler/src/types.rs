//! Outcomes reported by reconcile passes.

use serde::{Deserialize, Serialize};

/// What a GC reconcile pass did about the parent's lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GcAction {
    /// The work item names a parent store this reconciler does not serve.
    Ignored,
    /// The parent no longer exists.
    ParentAbsent,
    /// The lifecycle finalizer was added to a live parent.
    FinalizerAdded,
    /// A child was created.
    ChildCreated,
    /// Child creation lost a race with a concurrent creator.
    ChildCreateRaced,
    /// The child had drifted and was written.
    ChildUpdated,
    /// The child matched what the parent requires.
    ChildInSync,
    /// The child of a deleting parent was deleted.
    ChildDeleted,
    /// The lifecycle finalizer was removed from a deleting parent.
    FinalizerRemoved,
    /// The parent is deleting and nothing is owed.
    Released,
    /// A write lost an optimistic-concurrency race; a fresh event will follow.
    WriteConflict,
}

impl GcAction {
    /// Whether the pass wrote to a store as part of the lifecycle step.
    pub const fn wrote(self) -> bool {
        matches!(
            self,
            Self::FinalizerAdded
                | Self::ChildCreated
                | Self::ChildUpdated
                | Self::ChildDeleted
                | Self::FinalizerRemoved
        )
    }

    pub const fn description(self) -> &'static str {
        match self {
            Self::Ignored => "ignored work for an unknown store",
            Self::ParentAbsent => "parent absent",
            Self::FinalizerAdded => "added finalizer",
            Self::ChildCreated => "created child",
            Self::ChildCreateRaced => "child already created concurrently",
            Self::ChildUpdated => "updated child",
            Self::ChildInSync => "child in sync",
            Self::ChildDeleted => "deleted child",
            Self::FinalizerRemoved => "removed finalizer",
            Self::Released => "parent released",
            Self::WriteConflict => "write conflict, awaiting redelivery",
        }
    }
}

impl std::fmt::Display for GcAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.description())
    }
}

/// Result of one GC reconcile pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconcileOutcome {
    pub action: GcAction,
    /// The parent's spec was written with applier-derived changes.
    pub parent_updated: bool,
    /// The parent's status was written with applier-derived changes.
    pub parent_status_updated: bool,
}

impl ReconcileOutcome {
    pub const fn new(action: GcAction) -> Self {
        Self {
            action,
            parent_updated: false,
            parent_status_updated: false,
        }
    }

    /// Whether the pass issued any successful write.
    pub const fn wrote(&self) -> bool {
        self.action.wrote() || self.parent_updated || self.parent_status_updated
    }

    pub fn description(&self) -> String {
        let mut text = self.action.description().to_string();
        if self.parent_updated {
            text.push_str(", updated parent");
        }
        if self.parent_status_updated {
            text.push_str(", updated parent status");
        }
        text
    }
}

/// What a decorator pass did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecoratorAction {
    Ignored,
    ObjectAbsent,
    InSync,
    Updated,
    WriteConflict,
}
