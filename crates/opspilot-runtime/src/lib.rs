// crates/opspilot-runtime/src/lib.rs
// ============================================================================
// Crate: opspilot-runtime
// Description: Configuration model, logging sinks, builtin module registry,
// composition root, and shutdown signal handling.
// Purpose: The one crate that knows how to turn a config file into a
// running, gracefully stoppable system.
// Dependencies: every other opspilot-* crate
// ============================================================================

//! # opspilot-runtime
//!
//! [`bootstrap`] is the composition root: it builds storage, clock, logger,
//! bus, audit log, and approval gate from a [`RuntimeConfig`], registers
//! every enabled module (builtin first, then plugin discovery), and starts
//! the kernel. The returned [`Bootstrapped`] value's `run` method awaits a
//! shutdown signal and tears the kernel back down.

pub mod bootstrap;
pub mod config;
pub mod logging;
pub mod registry;
pub mod signals;

pub use bootstrap::bootstrap;
pub use bootstrap::Bootstrapped;
pub use config::RuntimeConfig;
pub use registry::construct_builtin;
pub use signals::wait_for_shutdown_signal;
