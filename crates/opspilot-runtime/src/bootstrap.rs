// crates/opspilot-runtime/src/bootstrap.rs
// ============================================================================
// Module: Composition Root
// Description: Builds every collaborator the runtime needs from a parsed
// RuntimeConfig, registers builtin and plugin-discovered modules with the
// kernel, and drives startup and shutdown.
// Purpose: The single place that wires storage, bus, audit, approval gate,
// and kernel together, wiring every collaborator through explicit
// constructor arguments rather than back-references between them.
// Dependencies: opspilot-core, opspilot-storage, opspilot-audit,
// opspilot-bus, opspilot-gate, opspilot-kernel
// ============================================================================

//! ## Overview
//! [`bootstrap`] turns a [`RuntimeConfig`] into a running [`Kernel`]:
//! storage backend, clock, logger, bus, audit log, and approval gate are
//! built first; the kernel is constructed over them; every enabled module
//! in `modules` is resolved (builtin registry first, then plugin discovery
//! under `pluginsDir`) and registered; finally `initialize_all` and
//! `start_all` run in that order. [`Bootstrapped::run`] then awaits a
//! shutdown signal and tears the kernel back down in reverse order.

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;

use opspilot_audit::StorageAuditLog;
use opspilot_bus::InProcessBus;
use opspilot_core::AuditLog;
use opspilot_core::Clock;
use opspilot_core::ConfigError;
use opspilot_core::EventBus;
use opspilot_core::Logger;
use opspilot_core::ModuleId;
use opspilot_core::RuntimeError;
use opspilot_core::StorageBackend;
use opspilot_core::SystemClock;
use opspilot_gate::StorageApprovalGate;
use opspilot_kernel::discover_plugins;
use opspilot_kernel::Kernel;
use opspilot_kernel::KernelBootError;
use opspilot_kernel::PluginRegistry;
use opspilot_security::ApiKeyVerifier;
use opspilot_security::Authenticator;
use opspilot_security::PublicPathMatcher;
use opspilot_security::ReadinessReport;
use opspilot_security::TokenVerifier;
use opspilot_storage::FilesystemBackend;
use opspilot_storage::MemoryBackend;
use opspilot_storage::NamespacedView;
use opspilot_storage::SqliteBackend;
use serde::Deserialize;

use crate::config::AuthConfig;
use crate::config::RuntimeConfig;
use crate::config::StorageEngine;
use crate::logging;
use crate::registry::construct_builtin;
use crate::signals::wait_for_shutdown_signal;

/// Module id the approval gate publishes `action.proposed`/`action.approved`
/// under.
const GATE_MODULE_ID: &str = "kernel.gate";

/// Everything the composition root built, ready to start serving.
pub struct Bootstrapped {
    /// The running kernel, owning every registered module's lifecycle.
    pub kernel: Arc<Kernel>,
    /// Shared logger, for the external surface to log through as well.
    pub logger: Arc<dyn Logger>,
    /// Request authenticator for the external surface, built from the
    /// optional `auth` config section. `None` when no `auth` section is
    /// configured, in which case the external surface (out of this
    /// workspace's scope) must not be hosted.
    pub authenticator: Option<Authenticator>,
}

impl Bootstrapped {
    /// Rolls up every registered module's self-reported health into a
    /// single readiness verdict.
    pub async fn readiness(&self) -> ReadinessReport {
        let modules: std::collections::BTreeMap<ModuleId, opspilot_core::Health> = self.kernel.health_all().await.into_iter().collect();
        opspilot_security::aggregate(modules)
    }

    /// Awaits a shutdown signal, then stops and destroys every module in
    /// reverse dependency order.
    pub async fn run(self) {
        wait_for_shutdown_signal().await;
        self.kernel.stop_all().await;
        self.kernel.destroy_all().await;
    }
}

/// Builds the [`Authenticator`] `config.auth` describes, if present.
fn build_authenticator(config: Option<&AuthConfig>) -> Option<Authenticator> {
    let config = config?;
    let token_verifier = TokenVerifier::new(config.token_secret.as_bytes().to_vec(), config.issuer.clone());
    let api_key_verifier = config.api_key.as_deref().map(ApiKeyVerifier::new);
    let public_paths = PublicPathMatcher::new(config.public_paths.clone());
    Some(Authenticator::new(token_verifier, api_key_verifier, public_paths))
}

/// `storage.options` shape for the `file` and `sqlite` engines: both take a
/// filesystem path.
#[derive(Deserialize)]
struct PathOptions {
    /// Root directory (`file`) or database file (`sqlite`).
    path: PathBuf,
}

/// Builds the storage backend `config.storage` describes, defaulting to an
/// in-memory backend when the section is omitted.
///
/// # Errors
///
/// Returns [`ConfigError::Invalid`] if `engine` is `database` (no backend
/// implements it in this workspace), `options.path` is missing for `file`/
/// `sqlite`, or the chosen backend fails to open.
async fn build_storage(config: &RuntimeConfig) -> Result<Arc<dyn StorageBackend>, ConfigError> {
    let Some(storage) = &config.storage else {
        return Ok(Arc::new(MemoryBackend::new()));
    };

    match storage.engine {
        StorageEngine::Memory => Ok(Arc::new(MemoryBackend::new())),
        StorageEngine::File => {
            let options: PathOptions = serde_json::from_value(storage.options.clone())
                .map_err(|err| ConfigError::Invalid { key: "storage.options".to_string(), message: err.to_string() })?;
            let backend = FilesystemBackend::new(options.path).await.map_err(|err| ConfigError::Invalid { key: "storage".to_string(), message: err.to_string() })?;
            Ok(Arc::new(backend))
        }
        StorageEngine::Sqlite => {
            let options: PathOptions = serde_json::from_value(storage.options.clone())
                .map_err(|err| ConfigError::Invalid { key: "storage.options".to_string(), message: err.to_string() })?;
            let backend = SqliteBackend::open(options.path).await.map_err(|err| ConfigError::Invalid { key: "storage".to_string(), message: err.to_string() })?;
            Ok(Arc::new(backend))
        }
        StorageEngine::Database => Err(ConfigError::Invalid {
            key: "storage.engine".to_string(),
            message: "the \"database\" storage engine is accepted for configuration compatibility but has no backing implementation".to_string(),
        }),
    }
}

/// Resolves `kernel_boot_error` into the cross-cutting [`RuntimeError`]
/// taxonomy, since [`KernelBootError`] is kernel-crate-local.
fn map_kernel_boot_error(kernel_boot_error: KernelBootError) -> RuntimeError {
    match kernel_boot_error {
        KernelBootError::Dependency(err) => RuntimeError::Dependency(err),
        KernelBootError::Module(err) => RuntimeError::Module(err),
    }
}

/// Builds every collaborator, registers and starts every enabled module,
/// and returns the running system.
///
/// # Errors
///
/// Returns [`RuntimeError::Config`] for an unsupported storage engine or a
/// module resolution failure, [`RuntimeError::Dependency`] for an invalid
/// dependency graph, or [`RuntimeError::Module`] if a module fails to
/// initialize or start.
pub async fn bootstrap(config: &RuntimeConfig) -> Result<Bootstrapped, RuntimeError> {
    let storage = build_storage(config).await?;
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let logger = logging::build_logger(config.logging.as_ref())?;
    let bus: Arc<dyn EventBus> = Arc::new(InProcessBus::new(Arc::clone(&logger)));

    let system_storage: Arc<dyn StorageBackend> = Arc::new(NamespacedView::system(Arc::clone(&storage)));
    let audit: Arc<dyn AuditLog> = Arc::new(StorageAuditLog::new(Arc::clone(&system_storage), Arc::clone(&clock)));
    let approval_gate = Arc::new(StorageApprovalGate::new(Arc::clone(&system_storage), Arc::clone(&audit), Arc::clone(&bus), Arc::clone(&clock), ModuleId::new(GATE_MODULE_ID)));

    let kernel = Arc::new(Kernel::new(storage, bus, approval_gate, Arc::clone(&logger), clock));

    register_modules(&kernel, config, &logger).await?;

    kernel.initialize_all(&config.kernel_config_value()).await.map_err(map_kernel_boot_error)?;
    kernel.start_all().await.map_err(map_kernel_boot_error)?;

    let authenticator = build_authenticator(config.auth.as_ref());
    Ok(Bootstrapped { kernel, logger, authenticator })
}

/// Registers every enabled module in `config.modules`: builtin ids resolve
/// directly; anything else is looked up among plugins discovered under
/// `config.plugins_dir`, if configured. Discovery errors are logged, not
/// fatal: discovery failures are logged and the remaining builtin modules
/// still start.
async fn register_modules(kernel: &Kernel, config: &RuntimeConfig, logger: &Arc<dyn Logger>) -> Result<(), RuntimeError> {
    let mut remaining: Vec<ModuleId> = Vec::new();
    for (id, entry) in &config.modules {
        if !entry.enabled {
            continue;
        }
        let module_id = ModuleId::new(id.clone());
        if let Some(module) = construct_builtin(&module_id) {
            kernel.register(module).await.map_err(RuntimeError::Module)?;
        } else {
            remaining.push(module_id);
        }
    }

    if remaining.is_empty() {
        return Ok(());
    }

    let Some(plugins_dir) = &config.plugins_dir else {
        let ids = remaining.iter().map(ModuleId::as_str).collect::<Vec<_>>().join(", ");
        return Err(RuntimeError::Config(ConfigError::Invalid {
            key: "modules".to_string(),
            message: format!("no builtin constructor for {ids} and no pluginsDir configured to discover them from"),
        }));
    };

    let registered_ids: HashSet<ModuleId> = kernel.ids().await.into_iter().collect();
    let (discovered, discovery_errors) = discover_plugins(plugins_dir, &PluginRegistry::new(), &registered_ids).await;
    for error in &discovery_errors {
        logger.log(opspilot_core::LogLevel::Warn, "opspilot-runtime", "plugin discovery error", &[opspilot_core::Field::new("error", error)]);
    }

    let discovered_ids: std::collections::HashMap<ModuleId, Arc<dyn opspilot_core::Module>> =
        discovered.into_iter().map(|item| (item.module.manifest().id.clone(), item.module)).collect();

    for module_id in remaining {
        let Some(module) = discovered_ids.get(&module_id) else {
            return Err(RuntimeError::Config(ConfigError::Invalid {
                key: "modules".to_string(),
                message: format!("no builtin or discovered plugin provides module id {module_id}"),
            }));
        };
        kernel.register(Arc::clone(module)).await.map_err(RuntimeError::Module)?;
    }
    Ok(())
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

    use std::collections::BTreeMap;

    use serde_json::json;

    use super::build_storage;
    use crate::config::Environment;
    use crate::config::ModuleEntry;
    use crate::config::RuntimeConfig;
    use crate::config::StorageConfig;
    use crate::config::StorageEngine;
    use crate::config::SystemConfig;

    fn base_config() -> RuntimeConfig {
        RuntimeConfig {
            system: SystemConfig { name: "test".to_string(), environment: Environment::Development, port: None },
            modules: BTreeMap::new(),
            storage: None,
            logging: None,
            auth: None,
            plugins_dir: None,
        }
    }

    #[tokio::test]
    async fn defaults_to_an_in_memory_backend_when_storage_is_omitted() {
        let config = base_config();
        let backend = build_storage(&config).await.expect("memory backend always succeeds");
        backend.set("probe", "k", json!("v")).await.expect("memory backend is writable");
    }

    #[tokio::test]
    async fn rejects_the_unsupported_database_engine() {
        let mut config = base_config();
        config.storage = Some(StorageConfig { engine: StorageEngine::Database, options: json!({}) });
        let err = build_storage(&config).await.expect_err("database engine has no backend");
        assert!(err.to_string().contains("database"));
    }

    #[tokio::test]
    async fn builds_a_filesystem_backend_from_a_path_option() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let mut config = base_config();
        config.storage = Some(StorageConfig { engine: StorageEngine::File, options: json!({ "path": tmp.path() }) });
        build_storage(&config).await.expect("filesystem backend opens under a writable temp dir");
    }

    #[test]
    fn module_entry_carries_arbitrary_settings_alongside_enabled() {
        let entry: ModuleEntry = toml::from_str("enabled = true\n[settings]\nrules = []\n").expect("valid module entry");
        assert!(entry.enabled);
        let settings = entry.settings.expect("settings table present");
        let table = settings.as_table().expect("settings is a table");
        assert!(table.contains_key("rules"));
    }

    #[test]
    fn module_entry_settings_default_to_absent_when_omitted() {
        let entry: ModuleEntry = toml::from_str("enabled = false\n").expect("valid module entry");
        assert!(!entry.enabled);
        assert!(entry.settings.is_none());
    }
}
