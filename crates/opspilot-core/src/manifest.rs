// crates/opspilot-core/src/manifest.rs
// ============================================================================
// Module: OpsPilot Module Manifest
// Description: Immutable metadata describing a pluggable module.
// Purpose: Give the kernel and plugin discovery a common description of
// what a module is before it is ever constructed.
// Dependencies: crate::identifiers, serde
// ============================================================================

//! ## Overview
//! A [`ModuleManifest`] is data, not behavior: it is read by the dependency
//! resolver (for `dependencies`), by the kernel (for `id` and `config_schema`),
//! and by plugin discovery (for validating an on-disk `manifest.json` against
//! the instance a factory produces).

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;

use crate::identifiers::ModuleId;

/// Closed set of module categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ModuleCategory {
    /// Produces events from an external data source.
    Connector,
    /// Produces `incident.created` from upstream signals.
    Detector,
    /// Attaches derived data to incidents.
    Enricher,
    /// Delivers outbound notifications.
    Notifier,
    /// Executes approved actions.
    Action,
    /// Hosts an external tool integration.
    ToolHost,
    /// Extends the operator-facing console.
    UiExtension,
}

/// Immutable metadata describing a module, independent of any running
/// instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModuleManifest {
    /// Unique id of form `<category>.<name>`.
    pub id: ModuleId,
    /// Semantic version string.
    pub version: String,
    /// Declared category.
    pub category: ModuleCategory,
    /// Free-form description.
    pub description: Option<String>,
    /// Ids of modules this module depends on.
    pub dependencies: Vec<ModuleId>,
    /// JSON Schema the module's configuration section must satisfy.
    pub config_schema: Option<Value>,
}

impl ModuleManifest {
    /// Builds a manifest with no dependencies and no config schema.
    #[must_use]
    pub fn new(id: impl Into<ModuleId>, version: impl Into<String>, category: ModuleCategory) -> Self {
        Self {
            id: id.into(),
            version: version.into(),
            category,
            description: None,
            dependencies: Vec::new(),
            config_schema: None,
        }
    }

    /// Attaches a description, consuming and returning `self`.
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Attaches a dependency list, consuming and returning `self`.
    #[must_use]
    pub fn with_dependencies(mut self, dependencies: Vec<ModuleId>) -> Self {
        self.dependencies = dependencies;
        self
    }

    /// Attaches a configuration schema, consuming and returning `self`.
    #[must_use]
    pub fn with_config_schema(mut self, schema: Value) -> Self {
        self.config_schema = Some(schema);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::ModuleCategory;
    use super::ModuleManifest;
    use crate::identifiers::ModuleId;

    #[test]
    fn builder_methods_compose() {
        let manifest = ModuleManifest::new("detector.threshold.cpu", "1.0.0", ModuleCategory::Detector)
            .with_description("cpu threshold detector")
            .with_dependencies(vec![ModuleId::new("connector.journald")]);
        assert_eq!(manifest.id.as_str(), "detector.threshold.cpu");
        assert_eq!(manifest.dependencies.len(), 1);
        assert!(manifest.config_schema.is_none());
    }
}
