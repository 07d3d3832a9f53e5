// crates/opspilot-correlate/src/lib.rs
// ============================================================================
// Crate: opspilot-correlate
// Description: Token-overlap incident correlation engine.
// Purpose: Group related incidents and escalate sustained bursts to storms.
// ============================================================================

//! # opspilot-correlate
//!
//! [`Correlator`] is the pluggable [`opspilot_core::Module`] that subscribes
//! to `incident.created`, groups incidents by title/description token
//! overlap, and emits `enrichment.completed` and `incident.storm`.

pub mod correlator;

pub use correlator::Correlator;
