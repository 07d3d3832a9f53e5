// crates/opspilot-core/src/event.rs
// ============================================================================
// Module: OpsPilot Event Vocabulary
// Description: Typed event payloads and the envelope that carries them.
// Purpose: Replace duck-typed bus payloads with tagged variants keyed by
// event type, so handlers receive already-typed data.
// Dependencies: crate::identifiers, serde
// ============================================================================

//! ## Overview
//! Each well-known event type from the external interface has its own payload
//! struct; [`Event`] is the closed tagged union over them. [`EventEnvelope`]
//! wraps an `Event` with the publisher, timestamp, and optional correlation id
//! that the bus and audit log both key off of.

use std::collections::HashMap;

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;

use crate::identifiers::CorrelationId;
use crate::identifiers::GroupId;
use crate::identifiers::IncidentId;
use crate::identifiers::ModuleId;
use crate::identifiers::RequestId;
use crate::identifiers::TokenId;

/// Severity carried by incidents and storm escalations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Informational, no operator action implied.
    Info,
    /// Needs attention but not urgent.
    Warning,
    /// Requires immediate attention.
    Critical,
}

/// Outcome of an executed action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionResult {
    /// The action completed as intended.
    Success,
    /// The action did not complete as intended.
    Failure,
}

/// Payload for `log.ingested`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogIngested {
    /// Originating source identifier (connector-defined).
    pub source: String,
    /// Raw ingested line.
    pub line: String,
    /// Line number within the source stream, if known.
    pub line_number: Option<u64>,
    /// Unix milliseconds at ingestion time.
    pub ingested_at: i64,
    /// Text encoding of `line`, if known.
    pub encoding: Option<String>,
    /// Arbitrary additional metadata.
    pub metadata: Option<HashMap<String, Value>>,
}

/// Payload for `incident.created`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IncidentCreated {
    /// Incident identifier.
    pub incident_id: IncidentId,
    /// Short human-readable title.
    pub title: String,
    /// Longer description.
    pub description: String,
    /// Incident severity.
    pub severity: Severity,
    /// Module id of the detector that produced this incident.
    pub detected_by: ModuleId,
    /// Source event type that triggered detection, if any.
    pub source_event: Option<String>,
    /// Unix milliseconds at detection time.
    pub detected_at: i64,
    /// Arbitrary detector-supplied context (e.g. literal/averaged values).
    pub context: Option<HashMap<String, Value>>,
}

/// Payload for `incident.updated`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IncidentUpdated {
    /// Incident identifier.
    pub incident_id: IncidentId,
    /// Name of the field that changed.
    pub field: String,
    /// Previous value, serialized.
    pub old_value: Value,
    /// New value, serialized.
    pub new_value: Value,
    /// Identifier of the actor or module that made the change.
    pub updated_by: String,
    /// Unix milliseconds at update time.
    pub updated_at: i64,
}

/// Payload for `incident.storm`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IncidentStorm {
    /// Correlation group that crossed the storm threshold.
    pub group_id: GroupId,
    /// Incident that originally seeded the group.
    pub root_incident_id: IncidentId,
    /// Member count at the moment the storm was declared.
    pub member_count: usize,
    /// Severity associated with the group.
    pub severity: Severity,
    /// Source tag shared by the group's members.
    pub source: String,
    /// Correlation time window, in milliseconds.
    pub time_window_ms: i64,
    /// Titles of the member incidents, in membership order.
    pub titles: Vec<String>,
}

/// Payload for `action.proposed`. Mirrors the full approval request record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionProposed {
    /// Request identifier.
    pub request_id: RequestId,
    /// Proposed action type.
    pub action_type: String,
    /// Human-readable description of the proposed action.
    pub description: String,
    /// Reasoning supplied by the proposer.
    pub reasoning: String,
    /// Identifier of the requester.
    pub requested_by: String,
    /// Unix milliseconds at request time.
    pub requested_at: i64,
}

/// Payload for `action.approved`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionApproved {
    /// Request identifier that was approved.
    pub request_id: RequestId,
    /// Token minted for the approval.
    pub token_id: TokenId,
    /// Identifier of the approver.
    pub approved_by: String,
}

/// Payload for `action.executed`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionExecuted {
    /// Request identifier the execution fulfills.
    pub request_id: RequestId,
    /// Token presented for the execution.
    pub token_id: TokenId,
    /// Action type that was executed.
    pub action_type: String,
    /// Outcome of the execution.
    pub result: ActionResult,
    /// Optional structured output from the execution.
    pub output: Option<Value>,
    /// Identifier of the executor.
    pub executed_by: String,
    /// Unix milliseconds at execution time.
    pub executed_at: i64,
}

/// Payload for `enrichment.completed`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnrichmentCompleted {
    /// Incident that was enriched.
    pub incident_id: IncidentId,
    /// Module id of the enricher.
    pub enricher_module: ModuleId,
    /// Category of enrichment performed.
    pub enrichment_type: String,
    /// Arbitrary enrichment payload.
    pub data: HashMap<String, Value>,
    /// Unix milliseconds at completion time.
    pub completed_at: i64,
}

/// Payload for `module.lifecycle`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModuleLifecycle {
    /// Module whose state changed.
    pub module_id: ModuleId,
    /// New state, rendered as its wire name.
    pub state: String,
    /// Error message, present when the transition was into `error`.
    pub error: Option<String>,
}

/// The closed set of event payloads the bus and audit log understand.
///
/// # Invariants
/// - Adding a new event type means adding a variant here; there is no
///   untyped fallback.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum Event {
    /// `log.ingested`
    #[serde(rename = "log.ingested")]
    LogIngested(LogIngested),
    /// `incident.created`
    #[serde(rename = "incident.created")]
    IncidentCreated(IncidentCreated),
    /// `incident.updated`
    #[serde(rename = "incident.updated")]
    IncidentUpdated(IncidentUpdated),
    /// `incident.storm`
    #[serde(rename = "incident.storm")]
    IncidentStorm(IncidentStorm),
    /// `action.proposed`
    #[serde(rename = "action.proposed")]
    ActionProposed(ActionProposed),
    /// `action.approved`
    #[serde(rename = "action.approved")]
    ActionApproved(ActionApproved),
    /// `action.executed`
    #[serde(rename = "action.executed")]
    ActionExecuted(ActionExecuted),
    /// `enrichment.completed`
    #[serde(rename = "enrichment.completed")]
    EnrichmentCompleted(EnrichmentCompleted),
    /// `module.lifecycle`
    #[serde(rename = "module.lifecycle")]
    ModuleLifecycle(ModuleLifecycle),
}

impl Event {
    /// Returns the wire-level event type name, e.g. `"incident.created"`.
    #[must_use]
    pub fn event_type(&self) -> &'static str {
        match self {
            Event::LogIngested(_) => "log.ingested",
            Event::IncidentCreated(_) => "incident.created",
            Event::IncidentUpdated(_) => "incident.updated",
            Event::IncidentStorm(_) => "incident.storm",
            Event::ActionProposed(_) => "action.proposed",
            Event::ActionApproved(_) => "action.approved",
            Event::ActionExecuted(_) => "action.executed",
            Event::EnrichmentCompleted(_) => "enrichment.completed",
            Event::ModuleLifecycle(_) => "module.lifecycle",
        }
    }
}

/// Immutable wrapper around an [`Event`], created by publishers and never
/// mutated afterward.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventEnvelope {
    /// The typed event payload.
    pub event: Event,
    /// Module that published this envelope.
    pub source: ModuleId,
    /// Unix milliseconds at publish time.
    pub timestamp: i64,
    /// Correlation id propagated across derivative events.
    pub correlation_id: Option<CorrelationId>,
}

impl EventEnvelope {
    /// Builds an envelope for `event`, published by `source` at `timestamp`.
    #[must_use]
    pub fn new(event: Event, source: ModuleId, timestamp: i64) -> Self {
        Self {
            event,
            source,
            timestamp,
            correlation_id: None,
        }
    }

    /// Attaches a correlation id, consuming and returning `self`.
    #[must_use]
    pub fn with_correlation_id(mut self, correlation_id: CorrelationId) -> Self {
        self.correlation_id = Some(correlation_id);
        self
    }

    /// Returns the wire-level event type of the wrapped event.
    #[must_use]
    pub fn event_type(&self) -> &'static str {
        self.event.event_type()
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

    use super::Event;
    use super::EventEnvelope;
    use super::IncidentCreated;
    use super::Severity;
    use crate::identifiers::IncidentId;
    use crate::identifiers::ModuleId;

    #[test]
    fn event_type_matches_wire_name() {
        let event = Event::IncidentCreated(IncidentCreated {
            incident_id: IncidentId::new("inc-1"),
            title: "High CPU".into(),
            description: "cpu over threshold".into(),
            severity: Severity::Warning,
            detected_by: ModuleId::new("detector.threshold.cpu"),
            source_event: None,
            detected_at: 0,
            context: None,
        });
        assert_eq!(event.event_type(), "incident.created");
    }

    #[test]
    fn envelope_round_trips_through_json() {
        let envelope = EventEnvelope::new(
            Event::IncidentCreated(IncidentCreated {
                incident_id: IncidentId::new("inc-1"),
                title: "High CPU".into(),
                description: "cpu over threshold".into(),
                severity: Severity::Critical,
                detected_by: ModuleId::new("detector.threshold.cpu"),
                source_event: None,
                detected_at: 1000,
                context: None,
            }),
            ModuleId::new("detector.threshold.cpu"),
            1000,
        );
        let json = serde_json::to_string(&envelope).expect("serialize");
        let parsed: EventEnvelope = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(parsed.event_type(), "incident.created");
        assert_eq!(parsed.timestamp, 1000);
    }
}
