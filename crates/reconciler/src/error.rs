//! Error types for the reconciler crate.

use std::path::PathBuf;
use std::time::Duration;

use tether_core::{ReferenceError, StoreError};
use thiserror::Error;

use crate::applier::ApplierError;

/// Result type alias for reconciler operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Reconciler error types.
#[derive(Debug, Clone, Error)]
pub enum Error {
    /// No child matched the parent's selector.
    ///
    /// Drives the "create child" branch; never returned from a pass.
    #[error("{resource} not found with label selector {selector}")]
    ChildNotFound { resource: String, selector: String },

    /// More than one child matched the parent's selector.
    #[error("duplicate {resource} found with label selector {selector} ({count} matches)")]
    DuplicateChild {
        resource: String,
        selector: String,
        count: usize,
    },

    /// A store call failed for a reason other than a benign conflict.
    #[error("cannot {action} {object}: {source}")]
    Store {
        action: String,
        object: String,
        #[source]
        source: StoreError,
    },

    /// An applier callback failed.
    #[error("cannot {action} {object}: {source}")]
    Applier {
        action: String,
        object: String,
        #[source]
        source: ApplierError,
    },

    /// A child is controlled by a different parent.
    #[error("cannot claim {object}: {source}")]
    Adoption {
        object: String,
        #[source]
        source: ReferenceError,
    },

    /// A store name that the reconciler has no client for.
    #[error("no {role} store named '{store}' is configured")]
    UnknownStore { role: &'static str, store: String },

    /// The pass ran past its deadline.
    #[error("reconciling {item} exceeded its {deadline:?} deadline")]
    DeadlineExceeded { item: String, deadline: Duration },

    /// Invalid configuration.
    #[error("invalid configuration: {reason}")]
    InvalidConfig { reason: String },

    /// A configuration file could not be read or parsed.
    #[error("failed to load configuration from '{path}': {reason}")]
    ConfigFile { path: PathBuf, reason: String },
}

impl Error {
    /// Create a child not found error.
    pub fn child_not_found(resource: impl Into<String>, selector: impl Into<String>) -> Self {
        Self::ChildNotFound {
            resource: resource.into(),
            selector: selector.into(),
        }
    }

    /// Create a duplicate child error.
    pub fn duplicate_child(
        resource: impl Into<String>,
        selector: impl Into<String>,
        count: usize,
    ) -> Self {
        Self::DuplicateChild {
            resource: resource.into(),
            selector: selector.into(),
            count,
        }
    }

    /// Wrap a store error with the action and object it concerned.
    pub fn store(action: impl Into<String>, object: impl Into<String>, source: StoreError) -> Self {
        Self::Store {
            action: action.into(),
            object: object.into(),
            source,
        }
    }

    /// Wrap an applier error with the action and object it concerned.
    pub fn applier(
        action: impl Into<String>,
        object: impl Into<String>,
        source: ApplierError,
    ) -> Self {
        Self::Applier {
            action: action.into(),
            object: object.into(),
            source,
        }
    }

    /// Create an adoption conflict error.
    pub fn adoption(object: impl Into<String>, source: ReferenceError) -> Self {
        Self::Adoption {
            object: object.into(),
            source,
        }
    }

    /// Create an unknown store error.
    pub fn unknown_store(role: &'static str, store: impl Into<String>) -> Self {
        Self::UnknownStore {
            role,
            store: store.into(),
        }
    }

    /// Create a deadline exceeded error.
    pub fn deadline_exceeded(item: impl Into<String>, deadline: Duration) -> Self {
        Self::DeadlineExceeded {
            item: item.into(),
            deadline,
        }
    }

    /// Create an invalid config error.
    pub fn invalid_config(reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            reason: reason.into(),
        }
    }

    /// Create a config file error.
    pub fn config_file(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::ConfigFile {
            path: path.into(),
            reason: reason.into(),
        }
    }

    pub const fn is_child_not_found(&self) -> bool {
        matches!(self, Self::ChildNotFound { .. })
    }

    pub const fn is_duplicate_child(&self) -> bool {
        matches!(self, Self::DuplicateChild { .. })
    }

    /// The underlying store error, if this error wraps one.
    pub const fn store_error(&self) -> Option<&StoreError> {
        match self {
            Self::Store { source, .. } => Some(source),
            _ => None,
        }
    }
}
