// crates/opspilot-core/src/module.rs
// ============================================================================
// Module: OpsPilot Module Lifecycle
// Description: Module state machine, health report shape, the per-module
// context, and the module contract the kernel drives.
// Purpose: Define what every pluggable module is and how the kernel talks
// to it, independent of any particular module implementation.
// Dependencies: async-trait, crate::{approval, bus, cancellation, clock,
// error, identifiers, logger, manifest, storage}, serde_json
// ============================================================================

//! ## Overview
//! [`ModuleState`] enumerates the lifecycle the kernel drives every module
//! through. [`ModuleContext`] is the one handle a module receives at
//! `initialize`: its own id, a validated config view, a bus handle, a
//! namespaced storage view, a prefixed logger, an approval gate handle, a
//! clock, and a cancellation token. Modules reach the rest of the runtime
//! only through this handle — there are no mutable globals.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::approval::ApprovalGate;
use crate::bus::EventBus;
use crate::cancellation::CancellationToken;
use crate::clock::Clock;
use crate::identifiers::ModuleId;
use crate::logger::PrefixedLogger;
use crate::manifest::ModuleManifest;
use crate::storage::StorageBackend;

/// Lifecycle state of a registered module.
///
/// Transitions are driven by the kernel only. Any state may move to
/// [`ModuleState::Error`]; otherwise the traversed states are a prefix of
/// `registered, initializing, initialized, starting, running, stopping,
/// stopped, destroyed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModuleState {
    /// Recorded in the lifecycle table, not yet initialized.
    Registered,
    /// `initialize` is in flight.
    Initializing,
    /// `initialize` completed successfully.
    Initialized,
    /// `start` is in flight.
    Starting,
    /// `start` completed successfully; the module is live.
    Running,
    /// `stop` is in flight.
    Stopping,
    /// `stop` completed.
    Stopped,
    /// `destroy` completed; the module will not be used again.
    Destroyed,
    /// A lifecycle operation failed.
    Error,
}

impl ModuleState {
    /// Returns the wire-level name used in `module.lifecycle` events.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            ModuleState::Registered => "registered",
            ModuleState::Initializing => "initializing",
            ModuleState::Initialized => "initialized",
            ModuleState::Starting => "starting",
            ModuleState::Running => "running",
            ModuleState::Stopping => "stopping",
            ModuleState::Stopped => "stopped",
            ModuleState::Destroyed => "destroyed",
            ModuleState::Error => "error",
        }
    }
}

/// Health status reported by a module.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum HealthStatus {
    /// Operating normally. Ordered lowest so aggregation can take a max.
    Healthy,
    /// Impaired but still serving.
    Degraded,
    /// Not serving.
    Unhealthy,
}

impl HealthStatus {
    /// Returns the wire-level name used in health reports.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            HealthStatus::Healthy => "healthy",
            HealthStatus::Degraded => "degraded",
            HealthStatus::Unhealthy => "unhealthy",
        }
    }
}

/// A module's self-reported health at a point in time.
#[derive(Debug, Clone)]
pub struct Health {
    /// Current status.
    pub status: HealthStatus,
    /// Optional human-readable message.
    pub message: Option<String>,
    /// Optional structured details.
    pub details: Option<Value>,
    /// Unix milliseconds when this report was produced.
    pub checked_at: i64,
}

impl Health {
    /// Builds a healthy report with no message or details.
    #[must_use]
    pub fn healthy(checked_at: i64) -> Self {
        Self {
            status: HealthStatus::Healthy,
            message: None,
            details: None,
            checked_at,
        }
    }

    /// Builds an unhealthy report carrying `message`.
    #[must_use]
    pub fn unhealthy(message: impl Into<String>, checked_at: i64) -> Self {
        Self {
            status: HealthStatus::Unhealthy,
            message: Some(message.into()),
            details: None,
            checked_at,
        }
    }
}

/// The per-module scoped handle injected at `initialize`.
///
/// Modules access the rest of the runtime only through this handle; there
/// is no other way to reach storage, the bus, or the approval gate.
#[derive(Clone)]
pub struct ModuleContext {
    /// This module's own id.
    pub module_id: ModuleId,
    /// This module's validated configuration section.
    pub config: Value,
    /// Handle to the event bus.
    pub bus: Arc<dyn EventBus>,
    /// Namespaced storage view, prefixed with this module's id.
    pub storage: Arc<dyn StorageBackend>,
    /// Logger pre-tagged with this module's id.
    pub logger: PrefixedLogger,
    /// Handle to the approval gate.
    pub approval_gate: Arc<dyn ApprovalGate>,
    /// Shared clock, the sole source of "now" for this module.
    pub clock: Arc<dyn Clock>,
    /// Cancellation signal raised by the kernel on `stop`.
    pub cancellation: CancellationToken,
}

impl ModuleContext {
    /// Returns the current time in unix milliseconds via the shared clock.
    #[must_use]
    pub fn now_millis(&self) -> i64 {
        self.clock.now_millis()
    }
}

/// The contract every pluggable module implements.
///
/// Operations are treated as potentially blocking; the kernel awaits each
/// before advancing to the next. Any operation may fail.
#[async_trait]
pub trait Module: Send + Sync {
    /// Returns this module's immutable manifest.
    fn manifest(&self) -> &ModuleManifest;

    /// Initializes the module with its scoped context.
    async fn initialize(&self, context: ModuleContext) -> Result<(), crate::error::ModuleError>;

    /// Starts the module. Only called once `initialize` has succeeded and
    /// every dependency is already `running`.
    async fn start(&self) -> Result<(), crate::error::ModuleError>;

    /// Stops the module. Must honor the cancellation token delivered via
    /// the context and return promptly once cancellation is signalled.
    async fn stop(&self) -> Result<(), crate::error::ModuleError>;

    /// Releases all retained resources unconditionally.
    async fn destroy(&self) -> Result<(), crate::error::ModuleError>;

    /// Reports current health.
    async fn health(&self) -> Health;
}

#[cfg(test)]
mod tests {
    use super::HealthStatus;
    use super::ModuleState;

    #[test]
    fn module_state_wire_names() {
        assert_eq!(ModuleState::Running.as_str(), "running");
        assert_eq!(ModuleState::Error.as_str(), "error");
    }

    #[test]
    fn health_status_orders_healthy_lowest() {
        assert!(HealthStatus::Healthy < HealthStatus::Degraded);
        assert!(HealthStatus::Degraded < HealthStatus::Unhealthy);
    }
}
