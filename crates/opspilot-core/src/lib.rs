// crates/opspilot-core/src/lib.rs
// ============================================================================
// Crate: opspilot-core
// Description: Shared identifiers, error taxonomy, event vocabulary, module
// lifecycle types, and the storage/bus/audit/approval contracts every other
// OpsPilot crate builds against.
// Purpose: Give the rest of the workspace a dependency-free common language
// so storage, audit, bus, gate, and kernel can depend on *interfaces*
// without depending on each other.
// ============================================================================

//! # opspilot-core
//!
//! The runtime substrate's shared vocabulary: identifiers, the typed event
//! envelope, the module manifest and lifecycle contract, and the
//! storage/bus/audit/approval-gate traits concrete crates implement. Nothing
//! in this crate talks to disk, a socket, or a clock other than through the
//! abstractions it defines.

pub mod approval;
pub mod audit;
pub mod bus;
pub mod cancellation;
pub mod clock;
pub mod error;
pub mod event;
pub mod identifiers;
pub mod logger;
pub mod manifest;
pub mod module;
pub mod storage;

pub use approval::ApprovalGate;
pub use approval::ApprovalRequest;
pub use approval::ApprovalRequestInput;
pub use approval::ApprovalToken;
pub use approval::RequestStatus;
pub use audit::AuditEntry;
pub use audit::AuditEntryInput;
pub use audit::AuditFilter;
pub use audit::AuditLog;
pub use bus::EventBus;
pub use bus::EventHandler;
pub use bus::SubscriptionId;
pub use cancellation::CancellationToken;
pub use clock::Clock;
pub use clock::SystemClock;
pub use clock::TestClock;
pub use error::ConfigError;
pub use error::DependencyError;
pub use error::ModuleError;
pub use error::RuntimeError;
pub use error::SecurityError;
pub use error::StorageError;
pub use event::ActionApproved;
pub use event::ActionExecuted;
pub use event::ActionProposed;
pub use event::ActionResult;
pub use event::EnrichmentCompleted;
pub use event::Event;
pub use event::EventEnvelope;
pub use event::IncidentCreated;
pub use event::IncidentStorm;
pub use event::IncidentUpdated;
pub use event::LogIngested;
pub use event::ModuleLifecycle;
pub use event::Severity;
pub use identifiers::AuditId;
pub use identifiers::CorrelationId;
pub use identifiers::GroupId;
pub use identifiers::IncidentId;
pub use identifiers::ModuleId;
pub use identifiers::RequestId;
pub use identifiers::RuleId;
pub use identifiers::TokenId;
pub use logger::CapturingLogger;
pub use logger::Field;
pub use logger::LogLevel;
pub use logger::Logger;
pub use logger::PrefixedLogger;
pub use logger::StderrLogger;
pub use manifest::ModuleCategory;
pub use manifest::ModuleManifest;
pub use module::Health;
pub use module::HealthStatus;
pub use module::Module;
pub use module::ModuleContext;
pub use module::ModuleState;
pub use storage::ListOptions;
pub use storage::StorageBackend;
