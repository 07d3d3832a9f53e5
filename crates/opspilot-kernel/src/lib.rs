// crates/opspilot-kernel/src/lib.rs
// ============================================================================
// Crate: opspilot-kernel
// Description: Dependency resolution, module lifecycle driving, and plugin
// discovery — the runtime's composition machinery.
// Purpose: Turn a set of registered module manifests into a running,
// dependency-ordered system, and a directory of plugin manifests into
// constructed module instances.
// Dependencies: opspilot-core, opspilot-storage, jsonschema, tokio
// ============================================================================

//! # opspilot-kernel
//!
//! Three pieces that compose into "start the system": [`resolver`] orders
//! module manifests by declared dependency, [`kernel::Kernel`] drives every
//! registered module through `initialize`/`start`/`stop`/`destroy` in that
//! order, and [`discovery`] resolves on-disk plugin manifests against a
//! statically known constructor registry.

pub mod discovery;
pub mod kernel;
pub mod resolver;

pub use discovery::discover_plugins;
pub use discovery::DiscoveredModule;
pub use discovery::DiscoveryError;
pub use discovery::ModuleFactory;
pub use discovery::PluginRegistry;
pub use kernel::Kernel;
pub use kernel::KernelBootError;
pub use resolver::resolve_order;
