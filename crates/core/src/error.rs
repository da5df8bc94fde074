//! Store and back-reference error types.
//!
//! Every condition a caller branches on is a distinct variant; callers match
//! on kind, never on message text.

use thiserror::Error;

/// Result type alias for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;

/// Errors reported by a store client.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("{kind} '{key}' not found")]
    NotFound { kind: String, key: String },

    #[error("{kind} '{key}' already exists")]
    AlreadyExists { kind: String, key: String },

    /// The stored version changed since the object was read.
    #[error("conflict writing {kind} '{key}': {reason}")]
    Conflict {
        kind: String,
        key: String,
        reason: String,
    },

    #[error("identity '{identity}' may not {operation} {kind} '{key}'")]
    Forbidden {
        identity: String,
        operation: String,
        kind: String,
        key: String,
    },

    #[error("invalid {kind}: {reason}")]
    Invalid { kind: String, reason: String },

    #[error("store unavailable: {reason}")]
    Unavailable { reason: String },
}

impl StoreError {
    /// Create a not found error.
    pub fn not_found(kind: impl Into<String>, key: impl Into<String>) -> Self {
        Self::NotFound {
            kind: kind.into(),
            key: key.into(),
        }
    }

    /// Create an already exists error.
    pub fn already_exists(kind: impl Into<String>, key: impl Into<String>) -> Self {
        Self::AlreadyExists {
            kind: kind.into(),
            key: key.into(),
        }
    }

    /// Create an optimistic-concurrency conflict error.
    pub fn conflict(
        kind: impl Into<String>,
        key: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::Conflict {
            kind: kind.into(),
            key: key.into(),
            reason: reason.into(),
        }
    }

    /// Create a forbidden error.
    pub fn forbidden(
        identity: impl Into<String>,
        operation: impl Into<String>,
        kind: impl Into<String>,
        key: impl Into<String>,
    ) -> Self {
        Self::Forbidden {
            identity: identity.into(),
            operation: operation.into(),
            kind: kind.into(),
            key: key.into(),
        }
    }

    /// Create an invalid object error.
    pub fn invalid(kind: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Invalid {
            kind: kind.into(),
            reason: reason.into(),
        }
    }

    /// Create an unavailable error.
    pub fn unavailable(reason: impl Into<String>) -> Self {
        Self::Unavailable {
            reason: reason.into(),
        }
    }

    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    pub const fn is_already_exists(&self) -> bool {
        matches!(self, Self::AlreadyExists { .. })
    }

    pub const fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }
}

/// Errors stamping a back-reference.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ReferenceError {
    /// The object is already controlled by a different parent.
    #[error("object '{object}' is already controlled by {existing}, cannot adopt for {requested}")]
    AlreadyOwned {
        object: String,
        existing: String,
        requested: String,
    },
}

impl ReferenceError {
    /// Create an adoption conflict error.
    pub fn already_owned(
        object: impl Into<String>,
        existing: impl Into<String>,
        requested: impl Into<String>,
    ) -> Self {
        Self::AlreadyOwned {
            object: object.into(),
            existing: existing.into(),
            requested: requested.into(),
        }
    }
}
