//! Configuration for the GC reconciler.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Serialisable reconciler settings.
///
/// Options that are functions (selector override, write impersonation) are
/// set on [`GcReconcilerBuilder`](crate::GcReconcilerBuilder) instead.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GcConfig {
    /// Sentinel added to the parent's finalizer list while a child may exist.
    #[serde(default = "default_finalizer")]
    pub finalizer: String,

    /// Fixed namespace for children. `None` places each child in its parent's
    /// namespace and discovers children across all namespaces.
    #[serde(default)]
    pub child_namespace: Option<String>,

    /// Copy the parent's labels onto the child. Selector labels win on clashes.
    #[serde(default)]
    pub copy_labels: bool,

    /// Build an expected child even when one is found and hand it to the
    /// applier's `needs_update` and `mutate`.
    #[serde(default)]
    pub make_expected_child_when_found: bool,

    /// Write parent status derived by the applier's `mutate_parent`.
    #[serde(default = "default_parent_status_updates")]
    pub parent_status_updates: bool,
}

impl Default for GcConfig {
    fn default() -> Self {
        Self {
            finalizer: default_finalizer(),
            child_namespace: None,
            copy_labels: false,
            make_expected_child_when_found: false,
            parent_status_updates: default_parent_status_updates(),
        }
    }
}

impl GcConfig {
    /// Preset for a parent and child sharing one store.
    ///
    /// Derived parent status is not written.
    pub fn single_store() -> Self {
        Self {
            parent_status_updates: false,
            ..Self::default()
        }
    }

    /// Set the finalizer.
    #[must_use]
    pub fn finalizer(mut self, finalizer: impl Into<String>) -> Self {
        self.finalizer = finalizer.into();
        self
    }

    /// Place every child in `namespace`.
    #[must_use]
    pub fn child_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.child_namespace = Some(namespace.into());
        self
    }

    /// Copy parent labels onto children.
    #[must_use]
    pub const fn copy_labels(mut self) -> Self {
        self.copy_labels = true;
        self
    }

    /// Compute an expected child for found children too.
    #[must_use]
    pub const fn make_expected_child_when_found(mut self) -> Self {
        self.make_expected_child_when_found = true;
        self
    }

    /// Enable or disable writing derived parent status.
    #[must_use]
    pub const fn parent_status_updates(mut self, enabled: bool) -> Self {
        self.parent_status_updates = enabled;
        self
    }

    /// Check the settings are usable.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] for a blank finalizer or child namespace.
    pub fn validate(&self) -> Result<()> {
        if self.finalizer.trim().is_empty() {
            return Err(Error::invalid_config("finalizer must not be empty"));
        }
        if self.finalizer.chars().any(char::is_whitespace) {
            return Err(Error::invalid_config(format!(
                "finalizer '{}' must not contain whitespace",
                self.finalizer
            )));
        }
        if self
            .child_namespace
            .as_deref()
            .is_some_and(|ns| ns.trim().is_empty())
        {
            return Err(Error::invalid_config("child namespace must not be blank"));
        }
        Ok(())
    }

    /// Load and validate configuration from a JSON (`.json`) or TOML file.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConfigFile`] when the file cannot be read or parsed,
    /// and [`Error::InvalidConfig`] when it parses but fails validation.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content =
            std::fs::read_to_string(path).map_err(|e| Error::config_file(path, e.to_string()))?;

        let config: Self = if path.extension().is_some_and(|e| e == "json") {
            serde_json::from_str(&content).map_err(|e| Error::config_file(path, e.to_string()))?
        } else {
            toml::from_str(&content).map_err(|e| Error::config_file(path, e.to_string()))?
        };

        config.validate()?;
        Ok(config)
    }
}

fn default_finalizer() -> String {
    "tether.dev/foreground-deletion".to_string()
}

const fn default_parent_status_updates() -> bool {
    true
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use std::io::Write;

    use super::*;

    #[test]
    fn test_defaults() {
        let config = GcConfig::default();
        assert_eq!(config.finalizer, "tether.dev/foreground-deletion");
        assert!(config.child_namespace.is_none());
        assert!(config.parent_status_updates);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_single_store_preset() {
        let config = GcConfig::single_store();
        assert!(!config.parent_status_updates);
        assert_eq!(config.finalizer, GcConfig::default().finalizer);
    }

    #[test]
    fn test_builder() {
        let config = GcConfig::default()
            .finalizer("example.com/cleanup")
            .child_namespace("copies")
            .copy_labels()
            .make_expected_child_when_found()
            .parent_status_updates(false);

        assert_eq!(config.finalizer, "example.com/cleanup");
        assert_eq!(config.child_namespace.as_deref(), Some("copies"));
        assert!(config.copy_labels);
        assert!(config.make_expected_child_when_found);
        assert!(!config.parent_status_updates);
    }

    #[test]
    fn should_reject_blank_finalizer() {
        let err = GcConfig::default().finalizer("  ").validate().unwrap_err();
        assert!(matches!(err, Error::InvalidConfig { .. }));
    }

    #[test]
    fn should_reject_blank_child_namespace() {
        let result = GcConfig::default().child_namespace("").validate();
        assert!(result.is_err());
    }

    #[test]
    fn should_load_toml_with_defaults() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "child_namespace = \"copies\"\ncopy_labels = true").unwrap();

        let config = GcConfig::from_file(file.path()).unwrap();

        assert_eq!(config.child_namespace.as_deref(), Some("copies"));
        assert!(config.copy_labels);
        assert_eq!(config.finalizer, "tether.dev/foreground-deletion");
        assert!(config.parent_status_updates);
    }

    #[test]
    fn should_load_json() {
        let mut file = tempfile::Builder::new().suffix(".json").tempfile().unwrap();
        writeln!(
            file,
            r#"{{"finalizer": "example.com/gc", "parent_status_updates": false}}"#
        )
        .unwrap();

        let config = GcConfig::from_file(file.path()).unwrap();

        assert_eq!(config.finalizer, "example.com/gc");
        assert!(!config.parent_status_updates);
    }

    #[test]
    fn should_report_unparseable_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "copy_labels = \"sometimes\"").unwrap();

        let err = GcConfig::from_file(file.path()).unwrap_err();

        assert!(matches!(err, Error::ConfigFile { .. }));
    }

    #[test]
    fn should_validate_loaded_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "finalizer = \"\"").unwrap();

        let err = GcConfig::from_file(file.path()).unwrap_err();

        assert!(matches!(err, Error::InvalidConfig { .. }));
    }
}
