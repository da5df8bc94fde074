//! Child selection: the labels tying a child to its parent and the
//! generated-name prefix.

use std::sync::Arc;

use itertools::Itertools;
use tether_core::{LabelSelector, Resource};

/// Label holding the parent's name.
pub const LABEL_PARENT_NAME: &str = "tether.dev/parent-name";
/// Label holding the parent's namespace, empty for cluster-scoped parents.
pub const LABEL_PARENT_NAMESPACE: &str = "tether.dev/parent-namespace";
/// Label holding the parent's store, set only when it differs from the child's.
pub const LABEL_PARENT_STORE: &str = "tether.dev/parent-store";

/// The parent's store and the child's store for one reconcile pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StorePair<'a> {
    pub parent: &'a str,
    pub child: &'a str,
}

impl StorePair<'_> {
    pub fn is_cross_store(&self) -> bool {
        self.parent != self.child
    }
}

/// Computes the selector that matches exactly the children of a parent.
pub type MakeSelector<P> = Arc<dyn Fn(&P, StorePair<'_>) -> LabelSelector + Send + Sync>;

/// Maps a parent store name to the identity child writes are performed as.
pub type Impersonator = Arc<dyn Fn(&str) -> String + Send + Sync>;

/// Selector built from the parent's name and namespace, plus its store when
/// the child lives elsewhere.
pub fn default_selector<P: Resource>(parent: &P, stores: StorePair<'_>) -> LabelSelector {
    let selector = LabelSelector::new()
        .with(LABEL_PARENT_NAME, parent.name())
        .with(LABEL_PARENT_NAMESPACE, parent.namespace().unwrap_or_default());

    if stores.is_cross_store() {
        selector.with(LABEL_PARENT_STORE, stores.parent)
    } else {
        selector
    }
}

/// Human-readable prefix for the child's store-assigned name.
///
/// Only a prefix: `foo-bar/baz` and `foo/bar-baz` share one, so uniqueness
/// comes from the store's random suffix.
pub fn generated_name_prefix<P: Resource>(parent: &P) -> String {
    let mut parts = parent
        .namespace()
        .filter(|ns| !ns.is_empty())
        .into_iter()
        .chain(std::iter::once(parent.name()));
    format!("{}-", parts.join("-"))
}

#[cfg(test)]
mod tests {
    use tether_core::{Kind, Object, ObjectMeta};

    use super::*;

    #[derive(Debug, Clone, Default)]
    struct SourceSpec;

    impl Kind for SourceSpec {
        const KIND: &'static str = "Source";
    }

    type Source = Object<SourceSpec>;

    const SAME: StorePair<'static> = StorePair {
        parent: "east",
        child: "east",
    };

    #[test]
    fn test_default_selector_same_store() {
        let parent = Source::new(ObjectMeta::namespaced("ns", "p"), SourceSpec);

        let selector = default_selector(&parent, SAME);

        assert_eq!(selector.len(), 2);
        assert_eq!(selector.get(LABEL_PARENT_NAME), Some("p"));
        assert_eq!(selector.get(LABEL_PARENT_NAMESPACE), Some("ns"));
        assert!(selector.get(LABEL_PARENT_STORE).is_none());
    }

    #[test]
    fn should_add_store_label_across_stores() {
        let parent = Source::new(ObjectMeta::namespaced("ns", "p"), SourceSpec);

        let selector = default_selector(
            &parent,
            StorePair {
                parent: "east",
                child: "west",
            },
        );

        assert_eq!(selector.get(LABEL_PARENT_STORE), Some("east"));
    }

    #[test]
    fn should_use_empty_namespace_for_cluster_scoped_parent() {
        let parent = Source::new(ObjectMeta::cluster_scoped("p"), SourceSpec);

        let selector = default_selector(&parent, SAME);

        assert_eq!(selector.get(LABEL_PARENT_NAMESPACE), Some(""));
    }

    #[test]
    fn test_generated_name_prefix() {
        let namespaced = Source::new(ObjectMeta::namespaced("ns", "P"), SourceSpec);
        let cluster = Source::new(ObjectMeta::cluster_scoped("P"), SourceSpec);

        assert_eq!(generated_name_prefix(&namespaced), "ns-P-");
        assert_eq!(generated_name_prefix(&cluster), "P-");
    }
}
