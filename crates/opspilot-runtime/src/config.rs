// crates/opspilot-runtime/src/config.rs
// ============================================================================
// Module: Runtime Configuration Model
// Description: The root config shape loaded at startup: system identity,
// per-module enablement, storage engine choice, logging sinks, optional
// auth and plugin directory.
// Purpose: One typed, validated entry point for every knob the composition
// root needs before it can build the kernel.
// Dependencies: serde, serde_json, toml
// ============================================================================

//! ## Overview
//! A typed model deserialized with `serde`, loaded from TOML, with unknown
//! top-level keys rejected (`#[serde(deny_unknown_fields)]`) rather than
//! silently ignored. Per-module settings are a nested, opaque [`toml::Value`]
//! rather than a flattened one, so they round-trip through TOML without
//! depending on `#[serde(flatten)]`'s interaction with a generic value type.
//! The kernel validates each module's settings against its own declared
//! schema during `initialize_all`, after this crate converts them to JSON.

use std::collections::BTreeMap;
use std::path::Path;
use std::path::PathBuf;

use opspilot_core::ConfigError;
use serde::Deserialize;
use serde_json::Value;

/// Deployment environment, informs logging verbosity defaults and nothing
/// else — this runtime has no environment-conditional code paths beyond
/// what operators express directly through `logging`/`storage`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    /// Local development.
    Development,
    /// Pre-production staging.
    Staging,
    /// Live production traffic.
    Production,
}

/// `system` section: process identity and optional listen port.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SystemConfig {
    /// Human-readable deployment name, carried into audit entries' context.
    pub name: String,
    /// Deployment environment.
    pub environment: Environment,
    /// Listen port for the external surface, when one is hosted.
    pub port: Option<u16>,
}

/// One module's `enabled` flag plus whatever arbitrary config the module
/// itself declares a schema for.
#[derive(Debug, Clone, Deserialize)]
pub struct ModuleEntry {
    /// Whether the composition root constructs and registers this module.
    pub enabled: bool,
    /// Module-specific configuration, validated against its own schema by
    /// the kernel at `initialize_all` time. Absent is equivalent to an empty
    /// table.
    #[serde(default)]
    pub settings: Option<toml::Value>,
}

/// Storage engine selection. `Database` is accepted for
/// parsing fidelity with the configuration surface but has no backing
/// implementation in this workspace; bootstrap rejects it explicitly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageEngine {
    /// In-memory, non-persistent backend.
    Memory,
    /// JSON-file-backed filesystem backend.
    File,
    /// Embedded SQLite backend.
    Sqlite,
    /// Generic client-server database backend (unsupported by this workspace).
    Database,
}

/// `storage` section.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StorageConfig {
    /// Which backend to construct.
    pub engine: StorageEngine,
    /// Backend-specific options (file root path, sqlite file path, …).
    #[serde(default)]
    pub options: Value,
}

/// Minimum severity a configured logger sink emits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfiguredLogLevel {
    /// Fine-grained diagnostic detail.
    Debug,
    /// Routine operational information.
    Info,
    /// An unexpected but non-fatal condition.
    Warn,
    /// A failure that aborted the current operation.
    Error,
}

/// Output line format for the configured logger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable `LEVEL [module] message (k=v, ...)` lines.
    Text,
    /// One JSON object per line.
    Json,
}

/// Destination for logged lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogOutput {
    /// Standard error, the default sink.
    Stderr,
    /// A rotating file on disk, sized by `max_file_size` and kept to
    /// `max_files` backups.
    File,
}

/// `logging` section.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
pub struct LoggingConfig {
    /// Minimum level emitted; lines below this are dropped.
    pub level: ConfiguredLogLevel,
    /// Line format.
    pub format: LogFormat,
    /// Sink.
    pub output: LogOutput,
    /// Required when `output` is `file`.
    pub file_path: Option<PathBuf>,
    /// Bytes at which the active log file is rotated. Defaults to 10 MiB.
    pub max_file_size: Option<u64>,
    /// Number of rotated backups kept. Defaults to 5.
    pub max_files: Option<u32>,
}

/// `auth` section: bearer/API-key material for the external surface.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
pub struct AuthConfig {
    /// Shared secret the bearer token HMAC is verified against.
    pub token_secret: String,
    /// Issuer every verified token's claims must match.
    pub issuer: String,
    /// Static API key accepted as an alternative to a bearer token.
    pub api_key: Option<String>,
    /// Paths that skip authentication (exact or `*`-suffixed prefix).
    #[serde(default)]
    pub public_paths: Vec<String>,
}

/// Root configuration shape. Unknown top-level keys are
/// rejected.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
pub struct RuntimeConfig {
    /// Process identity and listen port.
    pub system: SystemConfig,
    /// Per-module enablement and settings, keyed by module id.
    pub modules: BTreeMap<String, ModuleEntry>,
    /// Storage backend selection. Defaults to an in-memory backend when
    /// omitted.
    pub storage: Option<StorageConfig>,
    /// Logging sink configuration. Defaults to a text stderr sink at `info`
    /// when omitted.
    pub logging: Option<LoggingConfig>,
    /// External-surface authentication. Required only if the deployment
    /// hosts the external surface.
    pub auth: Option<AuthConfig>,
    /// Directory scanned for plugin manifests at boot, beyond the builtin
    /// module registry.
    pub plugins_dir: Option<PathBuf>,
}

impl RuntimeConfig {
    /// Parses `text` as TOML into a [`RuntimeConfig`].
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] if `text` is not valid TOML or does
    /// not match the root shape (including unknown top-level keys).
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        toml::from_str(text).map_err(|err| ConfigError::Parse(Box::new(err)))
    }

    /// Reads and parses the config file at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] if the file cannot be read or its
    /// contents fail to parse.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = tokio::fs::read_to_string(path).await.map_err(|err| ConfigError::Parse(Box::new(err)))?;
        Self::from_toml_str(&text)
    }

    /// Builds the `{modules: {id: settings}}` [`Value`] the kernel's
    /// `initialize_all` reads per-module sections from, restricted to
    /// enabled modules. Each module's TOML settings table is re-serialized
    /// to JSON, since the kernel's schema validation speaks
    /// [`serde_json::Value`].
    #[must_use]
    pub fn kernel_config_value(&self) -> Value {
        let modules: serde_json::Map<String, Value> = self
            .modules
            .iter()
            .filter(|(_, entry)| entry.enabled)
            .map(|(id, entry)| {
                let settings = entry
                    .settings
                    .clone()
                    .and_then(|toml_value| serde_json::to_value(toml_value).ok())
                    .unwrap_or_else(|| Value::Object(serde_json::Map::new()));
                (id.clone(), settings)
            })
            .collect();
        serde_json::json!({ "modules": modules })
    }
}

#[cfg(test)]
mod tests {
    #![allow(
        clippy::panic,
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::panic_in_result_fn,
        clippy::unwrap_in_result,
        reason = "Test-only panic-based assertions are permitted."
    )]

    use super::Environment;
    use super::LogFormat;
    use super::LogOutput;
    use super::RuntimeConfig;
    use super::StorageEngine;

    const MINIMAL: &str = r#"
        [system]
        name = "opspilot-dev"
        environment = "development"

        [modules."detector.threshold.cpu"]
        enabled = true

        [modules."detector.threshold.cpu".settings]
        rules = []
    "#;

    #[test]
    fn parses_the_minimal_shape() {
        let config = RuntimeConfig::from_toml_str(MINIMAL).expect("valid minimal config");
        assert_eq!(config.system.name, "opspilot-dev");
        assert_eq!(config.system.environment, Environment::Development);
        assert!(config.modules["detector.threshold.cpu"].enabled);
        assert!(config.storage.is_none());
    }

    #[test]
    fn rejects_unknown_top_level_keys() {
        let text = format!("{MINIMAL}\n[bogus]\nkey = 1\n");
        assert!(RuntimeConfig::from_toml_str(&text).is_err());
    }

    #[test]
    fn disabled_modules_are_excluded_from_the_kernel_config_value() {
        let text = format!(
            "{MINIMAL}\n[modules.\"enricher.correlator.main\"]\nenabled = false\n\n[modules.\"enricher.correlator.main\".settings]\nsimilarityThreshold = 0.4\ntimeWindowMs = 60000\nstormThreshold = 3\ngroupTtlMs = 120000\n"
        );
        let config = RuntimeConfig::from_toml_str(&text).expect("valid config");
        let value = config.kernel_config_value();
        let modules = value.get("modules").expect("modules key present");
        assert!(modules.get("detector.threshold.cpu").is_some());
        assert!(modules.get("enricher.correlator.main").is_none());
    }

    #[test]
    fn module_settings_are_converted_from_toml_to_json() {
        let config = RuntimeConfig::from_toml_str(MINIMAL).expect("valid minimal config");
        let value = config.kernel_config_value();
        let settings = value.get("modules").and_then(|modules| modules.get("detector.threshold.cpu")).expect("module settings present");
        assert!(settings.get("rules").is_some());
    }

    #[test]
    fn a_module_without_a_settings_table_gets_an_empty_object() {
        let text = format!("{MINIMAL}\n[modules.\"enricher.correlator.main\"]\nenabled = true\n");
        let config = RuntimeConfig::from_toml_str(&text).expect("valid config");
        let value = config.kernel_config_value();
        let settings = value.get("modules").and_then(|modules| modules.get("enricher.correlator.main")).expect("module present");
        assert_eq!(settings, &serde_json::json!({}));
    }

    #[test]
    fn parses_storage_and_logging_sections() {
        let text = format!(
            "{MINIMAL}\n[storage]\nengine = \"sqlite\"\n[storage.options]\npath = \"/tmp/opspilot.sqlite3\"\n[logging]\nlevel = \"warn\"\nformat = \"json\"\noutput = \"stderr\"\n"
        );
        let config = RuntimeConfig::from_toml_str(&text).expect("valid config");
        assert_eq!(config.storage.expect("storage section present").engine, StorageEngine::Sqlite);
        let logging = config.logging.expect("logging section present");
        assert_eq!(logging.format, LogFormat::Json);
        assert_eq!(logging.output, LogOutput::Stderr);
    }

    #[test]
    fn camel_case_keys_are_accepted_for_logging_and_plugins_dir() {
        let text = format!(
            "{MINIMAL}\npluginsDir = \"/etc/opspilot/plugins\"\n[logging]\nlevel = \"warn\"\nformat = \"json\"\noutput = \"file\"\nfilePath = \"/var/log/opspilot.log\"\nmaxFileSize = 1048576\nmaxFiles = 3\n"
        );
        let config = RuntimeConfig::from_toml_str(&text).expect("valid config");
        assert_eq!(config.plugins_dir, Some(std::path::PathBuf::from("/etc/opspilot/plugins")));
        let logging = config.logging.expect("logging section present");
        assert_eq!(logging.file_path, Some(std::path::PathBuf::from("/var/log/opspilot.log")));
        assert_eq!(logging.max_file_size, Some(1_048_576));
        assert_eq!(logging.max_files, Some(3));
    }
}
