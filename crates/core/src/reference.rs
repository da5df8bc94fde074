//! Back-references from a child object to the parent that owns it.
//!
//! A back-reference records the parent's kind, store, namespace, name and
//! uid. At most one back-reference per child may be the controlling one;
//! stamping a second controller is an adoption conflict.

use serde::{Deserialize, Serialize};

use crate::error::ReferenceError;
use crate::meta::{ObjectMeta, Uid};
use crate::resource::Resource;

/// Identity of a parent object, stamped onto its children.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ParentReference {
    pub kind: String,
    pub store: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uid: Option<Uid>,
    #[serde(default)]
    pub controller: bool,
}

impl ParentReference {
    /// Build a controlling back-reference to `parent`, which lives in `store`.
    pub fn controller_of<P: Resource>(parent: &P, store: impl Into<String>) -> Self {
        let meta = parent.meta();
        Self {
            kind: P::kind().to_owned(),
            store: store.into(),
            namespace: meta.namespace.clone(),
            name: meta.name.clone(),
            uid: meta.uid,
            controller: true,
        }
    }

    /// Whether both references name the same parent object.
    ///
    /// Namespace and name are not compared: uid and store identify the object.
    pub fn refers_to_same_parent(&self, other: &Self) -> bool {
        self.kind == other.kind && self.store == other.store && self.uid == other.uid
    }
}

impl std::fmt::Display for ParentReference {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.namespace {
            Some(ns) => write!(f, "{} {ns}/{} in store {}", self.kind, self.name, self.store),
            None => write!(f, "{} {} in store {}", self.kind, self.name, self.store),
        }
    }
}

/// The controlling back-reference of an object, if any.
pub fn controller_reference(meta: &ObjectMeta) -> Option<&ParentReference> {
    meta.owner_references.iter().find(|r| r.controller)
}

/// Stamp `reference` onto `meta` as its controlling back-reference.
///
/// Re-stamping the same parent refreshes the stored reference. Stamping a
/// different parent over an existing controller fails.
///
/// # Errors
///
/// Returns [`ReferenceError::AlreadyOwned`] when `meta` is already controlled
/// by another parent.
pub fn set_controller_reference(
    meta: &mut ObjectMeta,
    reference: ParentReference,
) -> Result<(), ReferenceError> {
    let reference = ParentReference {
        controller: true,
        ..reference
    };

    if let Some(existing) = controller_reference(meta) {
        if !existing.refers_to_same_parent(&reference) {
            return Err(ReferenceError::already_owned(
                meta.key().to_string(),
                existing.to_string(),
                reference.to_string(),
            ));
        }
    }

    meta.owner_references
        .retain(|r| !r.refers_to_same_parent(&reference));
    meta.owner_references.push(reference);
    Ok(())
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    fn parent_ref(name: &str, uid: Uid) -> ParentReference {
        ParentReference {
            kind: "Source".to_string(),
            store: "east".to_string(),
            namespace: Some("ns".to_string()),
            name: name.to_string(),
            uid: Some(uid),
            controller: true,
        }
    }

    #[test]
    fn test_stamp_and_read_back() {
        let mut meta = ObjectMeta::namespaced("ns", "child");
        let reference = parent_ref("p", Uid::new());

        set_controller_reference(&mut meta, reference.clone()).unwrap();

        assert_eq!(controller_reference(&meta), Some(&reference));
    }

    #[test]
    fn should_reject_second_controller() {
        let mut meta = ObjectMeta::namespaced("ns", "child");
        set_controller_reference(&mut meta, parent_ref("p", Uid::new())).unwrap();

        let result = set_controller_reference(&mut meta, parent_ref("q", Uid::new()));

        assert!(matches!(result, Err(ReferenceError::AlreadyOwned { .. })));
        assert_eq!(meta.owner_references.len(), 1);
    }

    #[test]
    fn should_allow_restamping_same_parent() {
        let uid = Uid::new();
        let mut meta = ObjectMeta::namespaced("ns", "child");
        set_controller_reference(&mut meta, parent_ref("p", uid)).unwrap();

        let result = set_controller_reference(&mut meta, parent_ref("p", uid));

        assert!(result.is_ok());
        assert_eq!(meta.owner_references.len(), 1);
    }

    #[test]
    fn should_treat_recreated_parent_as_different_owner() {
        let mut meta = ObjectMeta::namespaced("ns", "child");
        set_controller_reference(&mut meta, parent_ref("p", Uid::new())).unwrap();

        let result = set_controller_reference(&mut meta, parent_ref("p", Uid::new()));

        assert!(result.is_err());
    }

    #[test]
    fn test_non_controller_references_are_ignored() {
        let mut meta = ObjectMeta::namespaced("ns", "child");
        meta.owner_references.push(ParentReference {
            controller: false,
            ..parent_ref("other", Uid::new())
        });

        assert!(controller_reference(&meta).is_none());
        assert!(set_controller_reference(&mut meta, parent_ref("p", Uid::new())).is_ok());
        assert_eq!(meta.owner_references.len(), 2);
    }

    #[test]
    fn test_cluster_scoped_reference_omits_namespace() {
        let reference = ParentReference {
            namespace: None,
            uid: None,
            ..parent_ref("p", Uid::new())
        };

        let json = serde_json::to_value(&reference).unwrap();

        assert!(json.get("namespace").is_none());
        assert!(json.get("uid").is_none());
        assert_eq!(json["controller"], serde_json::Value::Bool(true));
        assert_eq!(reference.to_string(), "Source p in store east");
    }
}
