//! Shared fixtures for reconciler integration tests.

#![allow(dead_code)]
#![allow(clippy::unwrap_used)]

use std::sync::Arc;

use tether_core::{Kind, Object, ObjectMeta, StoreClient, StoreHandle, WorkItem};
use tether_reconciler::{Applier, ApplierError, GcConfig, GcReconciler, ParentChange};
use tether_store::InMemoryStore;

pub const FINALIZER: &str = "tether.dev/foreground-deletion";

/// A configuration source whose derived child carries its settings.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProfileSpec {
    pub settings: Vec<String>,
    /// Store the derived copy should live in; `None` keeps it beside the parent.
    pub target: Option<String>,
}

impl Kind for ProfileSpec {
    const KIND: &'static str = "Profile";
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProfileStatus {
    pub copied: bool,
}

pub type Profile = Object<ProfileSpec, ProfileStatus>;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProfileCopySpec {
    pub settings: Vec<String>,
}

impl Kind for ProfileCopySpec {
    const KIND: &'static str = "ProfileCopy";
}

pub type ProfileCopy = Object<ProfileCopySpec>;

/// Copies settings and reports whether the copy exists.
pub struct CopyApplier;

impl Applier<Profile, ProfileCopy> for CopyApplier {
    fn child_store_for(&self, parent: &Profile) -> Result<Option<String>, ApplierError> {
        Ok(parent.spec.target.clone())
    }

    fn make_child(&self, parent: &Profile, child: &mut ProfileCopy) -> Result<(), ApplierError> {
        child.spec.settings.clone_from(&parent.spec.settings);
        Ok(())
    }

    fn needs_update(
        &self,
        parent: &Profile,
        child: &ProfileCopy,
        _expected: Option<&ProfileCopy>,
    ) -> Result<bool, ApplierError> {
        Ok(child.spec.settings != parent.spec.settings)
    }

    fn mutate(
        &self,
        parent: &Profile,
        child: &mut ProfileCopy,
        _expected: Option<&ProfileCopy>,
    ) -> Result<(), ApplierError> {
        child.spec.settings.clone_from(&parent.spec.settings);
        Ok(())
    }

    fn mutate_parent(
        &self,
        parent: &mut Profile,
        child: Option<&ProfileCopy>,
    ) -> Result<ParentChange, ApplierError> {
        let status = ProfileStatus {
            copied: child.is_some(),
        };
        if parent.status.as_ref() == Some(&status) {
            return Ok(ParentChange::NONE);
        }
        parent.status = Some(status);
        Ok(ParentChange::status())
    }
}

/// One store holding both kinds under the name `local`.
pub struct SingleStore {
    pub profiles: InMemoryStore<Profile>,
    pub copies: InMemoryStore<ProfileCopy>,
    pub reconciler: GcReconciler<Profile, ProfileCopy, CopyApplier>,
}

impl SingleStore {
    pub fn new() -> Self {
        Self::with_config(GcConfig::single_store())
    }

    pub fn with_config(config: GcConfig) -> Self {
        let profiles = InMemoryStore::<Profile>::new();
        let copies = InMemoryStore::<ProfileCopy>::new();
        let reconciler = GcReconciler::<Profile, ProfileCopy, _>::builder(CopyApplier)
            .with_parent_store(StoreHandle::new("local", Arc::new(profiles.clone())))
            .with_child_store(StoreHandle::new("local", Arc::new(copies.clone())))
            .with_config(config)
            .build()
            .unwrap();
        Self {
            profiles,
            copies,
            reconciler,
        }
    }

    pub async fn write_count(&self) -> usize {
        self.profiles.writes().await.len() + self.copies.writes().await.len()
    }

    pub async fn clear_writes(&self) {
        self.profiles.clear_writes().await;
        self.copies.clear_writes().await;
    }

    pub async fn profile(&self, namespace: &str, name: &str) -> Option<Profile> {
        self.profiles.get(Some(namespace), name).await.unwrap()
    }
}

pub fn profile(namespace: &str, name: &str, settings: &[&str]) -> Profile {
    Profile::new(
        ObjectMeta::namespaced(namespace, name),
        ProfileSpec {
            settings: settings.iter().map(ToString::to_string).collect(),
            target: None,
        },
    )
}

pub fn item(store: &str, namespace: &str, name: &str) -> WorkItem {
    WorkItem::new(store, Some(namespace), name)
}

/// Install a fmt subscriber honouring `RUST_LOG`. Safe to call repeatedly.
pub fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_test_writer()
        .try_init()
        .ok();
}

/// A profile that already carries the lifecycle finalizer.
pub fn finalized_profile(namespace: &str, name: &str, settings: &[&str]) -> Profile {
    let mut parent = profile(namespace, name, settings);
    parent.meta = parent.meta.with_finalizer(FINALIZER);
    parent
}
