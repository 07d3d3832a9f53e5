// crates/opspilot-kernel/src/discovery.rs
// ============================================================================
// Module: Plugin Discovery
// Description: Manifest-driven resolution of on-disk plugin directories
// against a statically known set of module constructors.
// Purpose: Turn a directory of `manifest.json` files into constructed
// modules, without introducing dynamic code loading.
// Dependencies: opspilot-core, serde_json, tokio::fs
// ============================================================================

//! ## Overview
//! The source this runtime is modeled on resolves a plugin's exported
//! constructor by dynamically importing its entry file. Dynamic loading of
//! native code needs `unsafe` (`dlopen`/`libloading`), which this workspace's
//! lints forbid outright. [`discover_plugins`] keeps every other part of the
//! algorithm — manifest validation, entry-path containment, first-registered-
//! wins duplicate handling, instance/disk id cross-check — and replaces
//! "import the entry and find its exported constructor" with "look the
//! manifest id up in a constructor [`PluginRegistry`] supplied by the
//! composition root". A plugin directory without a matching registry entry
//! is reported as a discovery error rather than aborting the whole scan.

use std::collections::HashMap;
use std::collections::HashSet;
use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;

use opspilot_core::Module;
use opspilot_core::ModuleCategory;
use opspilot_core::ModuleId;
use serde::Deserialize;

/// A constructor a plugin's manifest id resolves to.
pub type ModuleFactory = Arc<dyn Fn() -> Arc<dyn Module> + Send + Sync>;

/// The statically known set of constructors plugin manifests may resolve
/// against, keyed by module id.
#[derive(Clone, Default)]
pub struct PluginRegistry {
    factories: HashMap<String, ModuleFactory>,
}

impl PluginRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `factory` under `id`, replacing any prior entry for it.
    pub fn register(&mut self, id: impl Into<String>, factory: ModuleFactory) {
        self.factories.insert(id.into(), factory);
    }

    fn get(&self, id: &str) -> Option<&ModuleFactory> {
        self.factories.get(id)
    }
}

/// On-disk `manifest.json` shape.
#[derive(Debug, Deserialize)]
#[allow(dead_code, reason = "name/version/category/dependencies are validated by deserialization and schema shape, not read again after that")]
struct DiskManifest {
    id: String,
    name: String,
    version: String,
    category: ModuleCategory,
    entry: Option<String>,
    #[serde(default)]
    dependencies: Vec<String>,
}

/// One plugin directory successfully resolved to a constructed module.
pub struct DiscoveredModule {
    /// The plugin directory this module was discovered from.
    pub source_dir: PathBuf,
    /// The constructed module instance.
    pub module: Arc<dyn Module>,
}

/// A non-fatal problem encountered while scanning a plugin directory.
#[derive(Debug, thiserror::Error)]
pub enum DiscoveryError {
    /// The directory's `manifest.json` could not be read.
    #[error("{path}: could not read manifest.json: {message}")]
    Unreadable {
        /// Plugin directory.
        path: PathBuf,
        /// Underlying I/O or parse message.
        message: String,
    },
    /// The manifest's `entry` path resolves outside the plugin directory.
    #[error("{path}: entry path escapes the plugin directory")]
    EntryEscapesDirectory {
        /// Plugin directory.
        path: PathBuf,
    },
    /// No registered constructor matches the manifest id.
    #[error("{path}: no constructor registered for module id {module_id}")]
    ConstructorNotFound {
        /// Plugin directory.
        path: PathBuf,
        /// Manifest id that had no matching registry entry.
        module_id: String,
    },
    /// The constructed instance's manifest id disagrees with the on-disk one.
    #[error("{path}: constructed instance id {instance_id} does not match manifest id {disk_id}")]
    ManifestMismatch {
        /// Plugin directory.
        path: PathBuf,
        /// Id declared in `manifest.json`.
        disk_id: String,
        /// Id the constructed instance actually reports.
        instance_id: String,
    },
    /// A module id collided with one already registered; the earlier
    /// registration is kept.
    #[error("{path}: module id {module_id} is already registered, ignoring this plugin")]
    Duplicate {
        /// Plugin directory.
        path: PathBuf,
        /// The colliding module id.
        module_id: String,
    },
}

/// Scans `root`'s immediate subdirectories for `manifest.json` files and
/// resolves each against `registry`, skipping ids already present in
/// `existing_ids`.
///
/// Returns every successfully constructed module alongside the list of
/// per-plugin errors; a failure in one plugin directory never aborts the
/// scan.
pub async fn discover_plugins(root: &Path, registry: &PluginRegistry, existing_ids: &HashSet<ModuleId>) -> (Vec<DiscoveredModule>, Vec<DiscoveryError>) {
    let mut discovered = Vec::new();
    let mut errors = Vec::new();
    let mut seen: HashSet<String> = existing_ids.iter().map(|id| id.as_str().to_string()).collect();

    let mut entries = match tokio::fs::read_dir(root).await {
        Ok(entries) => entries,
        Err(err) => {
            errors.push(DiscoveryError::Unreadable {
                path: root.to_path_buf(),
                message: err.to_string(),
            });
            return (discovered, errors);
        }
    };

    let mut plugin_dirs = Vec::new();
    loop {
        match entries.next_entry().await {
            Ok(Some(entry)) => {
                let path = entry.path();
                if path.is_dir() {
                    plugin_dirs.push(path);
                }
            }
            Ok(None) => break,
            Err(err) => {
                errors.push(DiscoveryError::Unreadable {
                    path: root.to_path_buf(),
                    message: err.to_string(),
                });
                break;
            }
        }
    }
    plugin_dirs.sort();

    for plugin_dir in plugin_dirs {
        match resolve_one(&plugin_dir, registry, &mut seen) {
            Ok(module) => discovered.push(module),
            Err(err) => errors.push(err),
        }
    }

    (discovered, errors)
}

fn resolve_one(plugin_dir: &Path, registry: &PluginRegistry, seen: &mut HashSet<String>) -> Result<DiscoveredModule, DiscoveryError> {
    let manifest_path = plugin_dir.join("manifest.json");
    let raw = std::fs::read_to_string(&manifest_path).map_err(|err| DiscoveryError::Unreadable {
        path: plugin_dir.to_path_buf(),
        message: err.to_string(),
    })?;
    let manifest: DiskManifest = serde_json::from_str(&raw).map_err(|err| DiscoveryError::Unreadable {
        path: plugin_dir.to_path_buf(),
        message: err.to_string(),
    })?;

    if let Some(entry) = &manifest.entry {
        let candidate = plugin_dir.join(entry);
        let canonical_dir = std::fs::canonicalize(plugin_dir).unwrap_or_else(|_| plugin_dir.to_path_buf());
        let canonical_entry = std::fs::canonicalize(&candidate).unwrap_or(candidate);
        if !canonical_entry.starts_with(&canonical_dir) {
            return Err(DiscoveryError::EntryEscapesDirectory { path: plugin_dir.to_path_buf() });
        }
    }

    if seen.contains(&manifest.id) {
        return Err(DiscoveryError::Duplicate {
            path: plugin_dir.to_path_buf(),
            module_id: manifest.id,
        });
    }

    let factory = registry.get(&manifest.id).ok_or_else(|| DiscoveryError::ConstructorNotFound {
        path: plugin_dir.to_path_buf(),
        module_id: manifest.id.clone(),
    })?;
    let instance = factory();
    if instance.manifest().id.as_str() != manifest.id {
        return Err(DiscoveryError::ManifestMismatch {
            path: plugin_dir.to_path_buf(),
            disk_id: manifest.id,
            instance_id: instance.manifest().id.as_str().to_string(),
        });
    }

    seen.insert(manifest.id.clone());
    Ok(DiscoveredModule { source_dir: plugin_dir.to_path_buf(), module: instance })
}
