// crates/opspilot-core/src/error.rs
// ============================================================================
// Module: OpsPilot Error Taxonomy
// Description: Typed failure kinds carrying cause chains.
// Purpose: Give every core component a distinct, programmatically matchable
// error type instead of one grab-bag error.
// Dependencies: crate::identifiers, thiserror
// ============================================================================

//! ## Overview
//! Following a per-interface error enum convention (`StoreError`,
//! `DispatchError`, `EvidenceError`, …), each core seam gets its own
//! `thiserror` enum. The six cross-cutting kinds (configuration, module,
//! dependency, security, storage, generic runtime) live here since they are
//! referenced from multiple crates.

use std::error::Error as StdError;

use thiserror::Error;

use crate::identifiers::ModuleId;

/// Boxed cause used to preserve error chains across crate boundaries.
pub type Cause = Box<dyn StdError + Send + Sync + 'static>;

/// Configuration error, fatal at startup.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A required configuration key was missing.
    #[error("missing configuration key: {0}")]
    Missing(String),
    /// A configuration value failed schema validation.
    #[error("invalid configuration for {key}: {message}")]
    Invalid {
        /// Dotted key path that failed validation.
        key: String,
        /// Human-readable validation message.
        message: String,
    },
    /// The configuration contained a top-level key the schema does not recognize.
    #[error("unknown configuration key: {0}")]
    UnknownKey(String),
    /// The configuration could not be parsed.
    #[error("configuration parse error: {0}")]
    Parse(#[source] Cause),
}

/// Module lifecycle error, carries the offending module id.
#[derive(Debug, Error)]
pub enum ModuleError {
    /// A module id was registered more than once.
    #[error("module already registered: {0}")]
    DuplicateId(ModuleId),
    /// A module was not found in the lifecycle table.
    #[error("module not found: {0}")]
    NotFound(ModuleId),
    /// A module lifecycle operation was invoked from an invalid state.
    #[error("module {module_id} cannot transition from {from} via {operation}")]
    InvalidTransition {
        /// Module id that rejected the transition.
        module_id: ModuleId,
        /// State the module was in when the operation was attempted.
        from: String,
        /// Lifecycle operation that was attempted.
        operation: String,
    },
    /// A module's `initialize`, `start`, `stop`, or `destroy` failed.
    #[error("module {module_id} failed during {operation}: {message}")]
    Lifecycle {
        /// Module id that failed.
        module_id: ModuleId,
        /// Lifecycle operation that failed.
        operation: String,
        /// Human-readable failure message.
        message: String,
        /// Optional underlying cause.
        #[source]
        cause: Option<Cause>,
    },
}

/// Dependency resolution error.
#[derive(Debug, Error)]
pub enum DependencyError {
    /// A module declared a dependency on an id that was never registered.
    #[error("module {module_id} depends on missing module {dependency}")]
    Missing {
        /// Module with the unresolved dependency.
        module_id: ModuleId,
        /// Dependency id that was not found.
        dependency: ModuleId,
    },
    /// A module declared a dependency on itself.
    #[error("module {0} depends on itself")]
    SelfLoop(ModuleId),
    /// The dependency graph contains a cycle.
    #[error("dependency cycle among modules: {}", join_ids(.0))]
    Cycle(Vec<ModuleId>),
}

/// Formats a list of module ids for the cycle error message.
fn join_ids(ids: &[ModuleId]) -> String {
    ids.iter().map(ModuleId::as_str).collect::<Vec<_>>().join(", ")
}

/// Security gate / approval state machine error.
#[derive(Debug, Error)]
pub enum SecurityError {
    /// An approval request referenced by id does not exist.
    #[error("approval request not found: {0}")]
    RequestNotFound(String),
    /// An approval state transition was attempted from an invalid state.
    #[error("approval request {request_id} is {state}, cannot {operation}")]
    InvalidState {
        /// Request id that rejected the transition.
        request_id: String,
        /// Current status of the request.
        state: String,
        /// Operation that was attempted.
        operation: String,
    },
    /// Bearer token verification failed.
    #[error("bearer token rejected: {0}")]
    TokenRejected(String),
    /// API key verification failed.
    #[error("api key rejected")]
    ApiKeyRejected,
    /// An audit write failed during a security-critical operation.
    #[error("audit write failed, operation aborted: {0}")]
    AuditFailed(#[source] Cause),
}

/// Storage backend error.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Backend I/O failure (disk, filesystem, database connection).
    #[error("storage io error: {0}")]
    Io(#[source] Cause),
    /// Stored data failed to (de)serialize.
    #[error("storage serialization error: {0}")]
    Serialization(#[source] Cause),
    /// The requested collection or key name is invalid.
    #[error("invalid storage path: {0}")]
    InvalidPath(String),
    /// A namespaced view attempted to cross its namespace boundary.
    #[error("namespace violation: collection {0} is outside the caller's namespace")]
    NamespaceViolation(String),
}

/// Generic runtime error for conditions not covered by the other kinds.
#[derive(Debug, Error)]
pub enum RuntimeError {
    /// Wraps a configuration error encountered at runtime.
    #[error(transparent)]
    Config(#[from] ConfigError),
    /// Wraps a module error encountered at runtime.
    #[error(transparent)]
    Module(#[from] ModuleError),
    /// Wraps a dependency error encountered at runtime.
    #[error(transparent)]
    Dependency(#[from] DependencyError),
    /// Wraps a security error encountered at runtime.
    #[error(transparent)]
    Security(#[from] SecurityError),
    /// Wraps a storage error encountered at runtime.
    #[error(transparent)]
    Storage(#[from] StorageError),
    /// An otherwise-unclassified fatal condition.
    #[error("runtime error: {0}")]
    Other(String),
}

#[cfg(test)]
mod tests {
    use super::DependencyError;
    use crate::identifiers::ModuleId;

    #[test]
    fn cycle_error_message_lists_ids() {
        let err = DependencyError::Cycle(vec![ModuleId::new("a"), ModuleId::new("b")]);
        assert_eq!(err.to_string(), "dependency cycle among modules: a, b");
    }
}
