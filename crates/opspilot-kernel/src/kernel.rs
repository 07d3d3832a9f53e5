// crates/opspilot-kernel/src/kernel.rs
// ============================================================================
// Module: Module Kernel
// Description: Owns the lifecycle table and drives every module through
// register -> initialize -> start -> stop -> destroy in dependency order.
// Purpose: The composition root's single point of control over module
// lifecycles.
// Dependencies: opspilot-core, opspilot-storage, jsonschema, tokio
// ============================================================================

//! ## Overview
//! [`Kernel`] holds `{id -> {module, state, last error}}` and is the only
//! thing that ever calls `initialize`/`start`/`stop`/`destroy` on a module.
//! Every transition publishes a best-effort `module.lifecycle` event; a
//! publish failure is swallowed by the bus itself (handler isolation), never
//! raised here. `start_all` and `stop_all` walk the dependency order computed
//! by [`crate::resolver::resolve_order`], forward for starting, reversed for
//! stopping.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use opspilot_core::ApprovalGate;
use opspilot_core::Clock;
use opspilot_core::DependencyError;
use opspilot_core::Event;
use opspilot_core::EventBus;
use opspilot_core::EventEnvelope;
use opspilot_core::Health;
use opspilot_core::Logger;
use opspilot_core::Module;
use opspilot_core::ModuleContext;
use opspilot_core::ModuleError;
use opspilot_core::ModuleId;
use opspilot_core::ModuleManifest;
use opspilot_core::ModuleState;
use opspilot_core::PrefixedLogger;
use opspilot_core::StorageBackend;
use opspilot_core::cancellation::CancellationToken;
use opspilot_core::event::ModuleLifecycle;
use opspilot_storage::NamespacedView;
use serde_json::Value;
use tokio::sync::Mutex;

use crate::resolver::resolve_order;

struct Entry {
    module: Arc<dyn Module>,
    state: ModuleState,
    last_error: Option<String>,
    cancellation: CancellationToken,
}

/// Owns the lifecycle table and drives modules through their lifecycle in
/// dependency order.
pub struct Kernel {
    entries: Mutex<BTreeMap<ModuleId, Entry>>,
    storage: Arc<dyn StorageBackend>,
    bus: Arc<dyn EventBus>,
    approval_gate: Arc<dyn ApprovalGate>,
    logger: Arc<dyn Logger>,
    clock: Arc<dyn Clock>,
    stop_timeout: Duration,
    kernel_module_id: ModuleId,
}

impl Kernel {
    /// Creates a kernel over the given shared collaborators.
    #[must_use]
    pub fn new(storage: Arc<dyn StorageBackend>, bus: Arc<dyn EventBus>, approval_gate: Arc<dyn ApprovalGate>, logger: Arc<dyn Logger>, clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: Mutex::new(BTreeMap::new()),
            storage,
            bus,
            approval_gate,
            logger,
            clock,
            stop_timeout: Duration::from_secs(5),
            kernel_module_id: ModuleId::new("kernel"),
        }
    }

    /// Overrides the default 5 second stop timeout, consuming and returning
    /// `self`.
    #[must_use]
    pub fn with_stop_timeout(mut self, timeout: Duration) -> Self {
        self.stop_timeout = timeout;
        self
    }

    /// Records `module` in the `registered` state.
    ///
    /// # Errors
    ///
    /// Returns [`ModuleError::DuplicateId`] if the manifest id is already
    /// registered.
    pub async fn register(&self, module: Arc<dyn Module>) -> Result<(), ModuleError> {
        let id = module.manifest().id.clone();
        let mut entries = self.entries.lock().await;
        if entries.contains_key(&id) {
            return Err(ModuleError::DuplicateId(id));
        }
        entries.insert(
            id,
            Entry {
                module,
                state: ModuleState::Registered,
                last_error: None,
                cancellation: CancellationToken::new(),
            },
        );
        Ok(())
    }

    /// Returns the ids of every registered module.
    pub async fn ids(&self) -> Vec<ModuleId> {
        self.entries.lock().await.keys().cloned().collect()
    }

    /// Returns the current lifecycle state of `id`.
    ///
    /// # Errors
    ///
    /// Returns [`ModuleError::NotFound`] if `id` is not registered.
    pub async fn current_state(&self, id: &ModuleId) -> Result<ModuleState, ModuleError> {
        self.entries.lock().await.get(id).map(|e| e.state).ok_or_else(|| ModuleError::NotFound(id.clone()))
    }

    /// Returns the message recorded the last time `id` transitioned into
    /// [`ModuleState::Error`], if any.
    ///
    /// # Errors
    ///
    /// Returns [`ModuleError::NotFound`] if `id` is not registered.
    pub async fn last_error(&self, id: &ModuleId) -> Result<Option<String>, ModuleError> {
        self.entries.lock().await.get(id).map(|e| e.last_error.clone()).ok_or_else(|| ModuleError::NotFound(id.clone()))
    }

    /// Returns a shared handle to the module registered under `id`.
    ///
    /// # Errors
    ///
    /// Returns [`ModuleError::NotFound`] if `id` is not registered.
    pub async fn handle(&self, id: &ModuleId) -> Result<Arc<dyn Module>, ModuleError> {
        self.entries.lock().await.get(id).map(|e| Arc::clone(&e.module)).ok_or_else(|| ModuleError::NotFound(id.clone()))
    }

    /// Queries the current health of every registered module.
    pub async fn health_all(&self) -> Vec<(ModuleId, Health)> {
        let modules: Vec<(ModuleId, Arc<dyn Module>)> = {
            let entries = self.entries.lock().await;
            entries.iter().map(|(id, entry)| (id.clone(), Arc::clone(&entry.module))).collect()
        };
        let mut reports = Vec::with_capacity(modules.len());
        for (id, module) in modules {
            reports.push((id, module.health().await));
        }
        reports
    }

    async fn manifests(&self) -> Vec<ModuleManifest> {
        let entries = self.entries.lock().await;
        entries.values().map(|e| e.module.manifest().clone()).collect()
    }

    async fn set_state(&self, id: &ModuleId, state: ModuleState, error: Option<String>) {
        {
            let mut entries = self.entries.lock().await;
            if let Some(entry) = entries.get_mut(id) {
                entry.state = state;
                entry.last_error = error.clone();
            }
        }
        self.bus
            .publish(EventEnvelope::new(
                Event::ModuleLifecycle(ModuleLifecycle {
                    module_id: id.clone(),
                    state: state.as_str().to_string(),
                    error,
                }),
                self.kernel_module_id.clone(),
                self.clock.now_millis(),
            ))
            .await;
    }

    fn module_config_section(config: &Value, id: &ModuleId) -> Value {
        config.get("modules").and_then(|modules| modules.get(id.as_str())).cloned().unwrap_or_else(|| Value::Object(serde_json::Map::new()))
    }

    fn validate_config(manifest: &ModuleManifest, config: &Value) -> Result<(), String> {
        let Some(schema) = &manifest.config_schema else {
            return Ok(());
        };
        let validator = jsonschema::validator_for(schema).map_err(|err| format!("invalid config schema: {err}"))?;
        let errors: Vec<String> = validator.iter_errors(config).map(|err| err.to_string()).collect();
        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors.join("; "))
        }
    }

    /// Resolves dependency order, then initializes every registered module
    /// in that order: extracts its config section, validates it against the
    /// manifest's schema if present, builds its context, and calls
    /// `initialize`.
    ///
    /// # Errors
    ///
    /// Returns [`DependencyError`] if the dependency graph is invalid, or
    /// [`ModuleError::Lifecycle`] if a module's `initialize` fails.
    pub async fn initialize_all(&self, config: &Value) -> Result<(), KernelBootError> {
        let manifests = self.manifests().await;
        let order = resolve_order(&manifests).map_err(KernelBootError::Dependency)?;
        let manifest_by_id: BTreeMap<ModuleId, ModuleManifest> = manifests.into_iter().map(|m| (m.id.clone(), m)).collect();

        for id in &order {
            let Some(manifest) = manifest_by_id.get(id) else {
                continue;
            };
            let module_config = Self::module_config_section(config, id);
            if let Err(message) = Self::validate_config(manifest, &module_config) {
                self.set_state(id, ModuleState::Error, Some(message.clone())).await;
                return Err(KernelBootError::Module(ModuleError::Lifecycle {
                    module_id: id.clone(),
                    operation: "initialize".into(),
                    message,
                    cause: None,
                }));
            }

            let cancellation = {
                let entries = self.entries.lock().await;
                entries.get(id).map(|e| e.cancellation.clone()).unwrap_or_default()
            };
            let namespaced_storage = Arc::new(NamespacedView::new(Arc::clone(&self.storage), id.as_str().to_string()));
            let context = ModuleContext {
                module_id: id.clone(),
                config: module_config,
                bus: Arc::clone(&self.bus),
                storage: namespaced_storage,
                logger: PrefixedLogger::new(Arc::clone(&self.logger), id.clone()),
                approval_gate: Arc::clone(&self.approval_gate),
                clock: Arc::clone(&self.clock),
                cancellation,
            };

            self.set_state(id, ModuleState::Initializing, None).await;
            let module = self.handle(id).await.map_err(KernelBootError::Module)?;
            match module.initialize(context).await {
                Ok(()) => self.set_state(id, ModuleState::Initialized, None).await,
                Err(err) => {
                    self.set_state(id, ModuleState::Error, Some(err.to_string())).await;
                    return Err(KernelBootError::Module(err));
                }
            }
        }
        Ok(())
    }

    /// Starts every module whose state is `initialized`, in dependency
    /// order. On failure, already-started modules are stopped in reverse
    /// order before the error is returned.
    ///
    /// # Errors
    ///
    /// Returns [`ModuleError::Lifecycle`] if a module's `start` fails.
    pub async fn start_all(&self) -> Result<(), KernelBootError> {
        let manifests = self.manifests().await;
        let order = resolve_order(&manifests).map_err(KernelBootError::Dependency)?;
        let mut started = Vec::new();

        for id in &order {
            if self.current_state(id).await.map_err(KernelBootError::Module)? != ModuleState::Initialized {
                continue;
            }
            self.set_state(id, ModuleState::Starting, None).await;
            let module = self.handle(id).await.map_err(KernelBootError::Module)?;
            match module.start().await {
                Ok(()) => {
                    self.set_state(id, ModuleState::Running, None).await;
                    started.push(id.clone());
                }
                Err(err) => {
                    self.set_state(id, ModuleState::Error, Some(err.to_string())).await;
                    for already_running in started.iter().rev() {
                        self.stop_one(already_running).await;
                    }
                    return Err(KernelBootError::Module(err));
                }
            }
        }
        Ok(())
    }

    async fn stop_one(&self, id: &ModuleId) {
        let Ok(module) = self.handle(id).await else {
            return;
        };
        self.set_state(id, ModuleState::Stopping, None).await;
        let cancellation = {
            let entries = self.entries.lock().await;
            entries.get(id).map(|e| e.cancellation.clone())
        };
        if let Some(cancellation) = cancellation {
            cancellation.cancel();
        }
        let outcome = tokio::time::timeout(self.stop_timeout, module.stop()).await;
        match outcome {
            Ok(Ok(())) => self.set_state(id, ModuleState::Stopped, None).await,
            Ok(Err(err)) => {
                self.logger.log(opspilot_core::LogLevel::Warn, "kernel", "module stop failed, forcing stopped", &[opspilot_core::Field::new("module_id", id), opspilot_core::Field::new("error", err)]);
                self.set_state(id, ModuleState::Stopped, None).await;
            }
            Err(_timed_out) => {
                self.logger.log(opspilot_core::LogLevel::Warn, "kernel", "module stop timed out, resources treated as leaked", &[opspilot_core::Field::new("module_id", id)]);
                self.set_state(id, ModuleState::Stopped, None).await;
            }
        }
    }

    /// Stops every `running` module in reverse dependency order. Failing or
    /// timed-out stops are logged, not raised; the module is forced to
    /// `stopped` regardless so shutdown can proceed.
    pub async fn stop_all(&self) {
        let manifests = self.manifests().await;
        let Ok(order) = resolve_order(&manifests) else {
            return;
        };
        for id in order.iter().rev() {
            if self.current_state(id).await.ok() == Some(ModuleState::Running) {
                self.stop_one(id).await;
            }
        }
    }

    /// Destroys every `stopped` module in reverse dependency order, with the
    /// same fault-tolerant policy as [`Kernel::stop_all`].
    pub async fn destroy_all(&self) {
        let manifests = self.manifests().await;
        let Ok(order) = resolve_order(&manifests) else {
            return;
        };
        for id in order.iter().rev() {
            if self.current_state(id).await.ok() != Some(ModuleState::Stopped) {
                continue;
            }
            let Ok(module) = self.handle(id).await else {
                continue;
            };
            if let Err(err) = module.destroy().await {
                self.logger.log(opspilot_core::LogLevel::Warn, "kernel", "module destroy failed", &[opspilot_core::Field::new("module_id", id), opspilot_core::Field::new("error", err)]);
            }
            self.set_state(id, ModuleState::Destroyed, None).await;
        }
    }
}

/// Error surfaced by [`Kernel::initialize_all`] and [`Kernel::start_all`].
#[derive(Debug, thiserror::Error)]
pub enum KernelBootError {
    /// The dependency graph could not be ordered.
    #[error(transparent)]
    Dependency(DependencyError),
    /// A module lifecycle operation failed.
    #[error(transparent)]
    Module(ModuleError),
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

    use std::sync::atomic::AtomicUsize;
    use std::sync::atomic::Ordering;
    use std::sync::Arc;

    use async_trait::async_trait;
    use opspilot_audit::StorageAuditLog;
    use opspilot_bus::InProcessBus;
    use opspilot_core::Health;
    use opspilot_core::Module;
    use opspilot_core::ModuleCategory;
    use opspilot_core::ModuleContext;
    use opspilot_core::ModuleError;
    use opspilot_core::ModuleManifest;
    use opspilot_core::ModuleState;
    use opspilot_core::StderrLogger;
    use opspilot_core::StorageBackend;
    use opspilot_core::TestClock;
    use opspilot_gate::StorageApprovalGate;
    use opspilot_storage::MemoryBackend;
    use serde_json::json;

    use super::Kernel;

    struct RecordingModule {
        manifest: ModuleManifest,
        starts: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl Module for RecordingModule {
        fn manifest(&self) -> &ModuleManifest {
            &self.manifest
        }

        async fn initialize(&self, _context: ModuleContext) -> Result<(), ModuleError> {
            Ok(())
        }

        async fn start(&self) -> Result<(), ModuleError> {
            self.starts.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn stop(&self) -> Result<(), ModuleError> {
            Ok(())
        }

        async fn destroy(&self) -> Result<(), ModuleError> {
            Ok(())
        }

        async fn health(&self) -> Health {
            Health::healthy(0)
        }
    }

    fn make_kernel() -> Kernel {
        let storage: Arc<dyn StorageBackend> = Arc::new(MemoryBackend::new());
        let clock = Arc::new(TestClock::new(0));
        let bus: Arc<dyn opspilot_core::EventBus> = Arc::new(InProcessBus::new(Arc::new(StderrLogger)));
        let audit = Arc::new(StorageAuditLog::new(Arc::clone(&storage), Arc::clone(&clock) as Arc<dyn opspilot_core::Clock>));
        let gate = Arc::new(StorageApprovalGate::new(Arc::clone(&storage), audit, Arc::clone(&bus), Arc::clone(&clock) as Arc<dyn opspilot_core::Clock>, opspilot_core::ModuleId::new("kernel.gate")));
        Kernel::new(storage, bus, gate, Arc::new(StderrLogger), clock)
    }

    #[tokio::test]
    async fn duplicate_registration_is_an_error() {
        let kernel = make_kernel();
        let starts = Arc::new(AtomicUsize::new(0));
        let manifest = ModuleManifest::new("detector.a", "1.0.0", ModuleCategory::Detector);
        let module = Arc::new(RecordingModule { manifest, starts });
        kernel.register(module.clone()).await.expect("first registration");
        let err = kernel.register(module).await.expect_err("duplicate should fail");
        assert!(matches!(err, ModuleError::DuplicateId(_)));
    }

    #[tokio::test]
    async fn modules_start_only_after_dependencies_are_running() {
        let kernel = make_kernel();
        let starts = Arc::new(AtomicUsize::new(0));
        let dep = Arc::new(RecordingModule {
            manifest: ModuleManifest::new("connector.b", "1.0.0", ModuleCategory::Connector),
            starts: Arc::clone(&starts),
        });
        let dependent = Arc::new(RecordingModule {
            manifest: ModuleManifest::new("detector.a", "1.0.0", ModuleCategory::Detector).with_dependencies(vec!["connector.b".into()]),
            starts,
        });
        kernel.register(dep).await.expect("register dep");
        kernel.register(dependent).await.expect("register dependent");
        kernel.initialize_all(&json!({})).await.expect("initialize");
        kernel.start_all().await.expect("start");
        assert_eq!(kernel.current_state(&"connector.b".into()).await.expect("state"), ModuleState::Running);
        assert_eq!(kernel.current_state(&"detector.a".into()).await.expect("state"), ModuleState::Running);
    }

    #[tokio::test]
    async fn stop_all_visits_reverse_dependency_order() {
        let kernel = make_kernel();
        let starts = Arc::new(AtomicUsize::new(0));
        let dep = Arc::new(RecordingModule {
            manifest: ModuleManifest::new("connector.b", "1.0.0", ModuleCategory::Connector),
            starts: Arc::clone(&starts),
        });
        let dependent = Arc::new(RecordingModule {
            manifest: ModuleManifest::new("detector.a", "1.0.0", ModuleCategory::Detector).with_dependencies(vec!["connector.b".into()]),
            starts,
        });
        kernel.register(dep).await.expect("register dep");
        kernel.register(dependent).await.expect("register dependent");
        kernel.initialize_all(&json!({})).await.expect("initialize");
        kernel.start_all().await.expect("start");
        kernel.stop_all().await;
        assert_eq!(kernel.current_state(&"connector.b".into()).await.expect("state"), ModuleState::Stopped);
        assert_eq!(kernel.current_state(&"detector.a".into()).await.expect("state"), ModuleState::Stopped);
    }
}
