// crates/opspilot-core/src/approval.rs
// ============================================================================
// Module: OpsPilot Approval Data Model
// Description: Approval request/token records and the gate contract modules
// see through their context; the state machine lives in opspilot-gate.
// Purpose: Share the request/token shape and the gate's operation surface
// between the gate crate, the kernel, and any module that proposes actions.
// Dependencies: async-trait, crate::error, crate::identifiers, serde
// ============================================================================

//! ## Overview
//! [`ApprovalGate`] is the trait the module context exposes; `opspilot-gate`
//! provides the concrete request/approve/deny/validate state machine.

use std::collections::HashMap;

use async_trait::async_trait;
use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;

use crate::error::SecurityError;
use crate::identifiers::RequestId;
use crate::identifiers::TokenId;

/// Status of an approval request. Status is the only mutable field of a
/// request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestStatus {
    /// Awaiting a decision.
    Pending,
    /// Approved; a token has been minted.
    Approved,
    /// Denied; no token was minted.
    Denied,
    /// Was approved, but the token has since expired.
    Expired,
}

impl std::fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            RequestStatus::Pending => "pending",
            RequestStatus::Approved => "approved",
            RequestStatus::Denied => "denied",
            RequestStatus::Expired => "expired",
        };
        f.write_str(label)
    }
}

/// Caller-supplied fields for a new approval request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApprovalRequestInput {
    /// Type of action being proposed, e.g. `"restart.service"`.
    pub action_type: String,
    /// Human-readable description of the proposed action.
    pub description: String,
    /// Reasoning supplied by the proposer.
    pub reasoning: String,
    /// Identifier of the requester.
    pub requested_by: String,
    /// Arbitrary structured metadata.
    pub metadata: Option<HashMap<String, Value>>,
}

/// A stored approval request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApprovalRequest {
    /// Generated request identifier.
    pub id: RequestId,
    /// Type of action being proposed.
    pub action_type: String,
    /// Human-readable description of the proposed action.
    pub description: String,
    /// Reasoning supplied by the proposer.
    pub reasoning: String,
    /// Identifier of the requester.
    pub requested_by: String,
    /// Unix milliseconds at request time.
    pub requested_at: i64,
    /// Current status.
    pub status: RequestStatus,
    /// Reason supplied when denied.
    pub denial_reason: Option<String>,
    /// Arbitrary structured metadata.
    pub metadata: Option<HashMap<String, Value>>,
}

/// An approval token, immutable once created.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApprovalToken {
    /// Generated token identifier.
    pub id: TokenId,
    /// Request this token was minted for.
    pub request_id: RequestId,
    /// Identifier of the approver.
    pub approved_by: String,
    /// Unix milliseconds at approval time.
    pub approved_at: i64,
    /// Unix milliseconds after which the token is no longer valid.
    pub expires_at: i64,
}

/// The request/approve/deny/validate state machine modules see through
/// their context.
///
/// # Invariants
/// - Every state transition failure is reported as a distinct
///   [`SecurityError`] naming the current state.
/// - An audit write failure aborts the operation and its corresponding
///   event is never published.
#[async_trait]
pub trait ApprovalGate: Send + Sync {
    /// Creates a new pending request and returns the stored record.
    async fn request_approval(&self, input: ApprovalRequestInput) -> Result<ApprovalRequest, SecurityError>;

    /// Approves a pending request, minting a token with a fixed TTL.
    async fn approve(&self, request_id: &RequestId, approved_by: &str) -> Result<ApprovalToken, SecurityError>;

    /// Denies a pending request.
    async fn deny(&self, request_id: &RequestId, denied_by: &str, reason: Option<String>) -> Result<(), SecurityError>;

    /// Returns the current status, reconciling approved-but-expired
    /// requests to `expired` as a side effect before returning.
    async fn get_status(&self, request_id: &RequestId) -> Result<RequestStatus, SecurityError>;

    /// Returns the current status without mutating stored state.
    async fn inspect_status(&self, request_id: &RequestId) -> Result<RequestStatus, SecurityError>;

    /// Validates a token: it must exist, reference a request still
    /// `approved`, and not be expired.
    async fn validate_token(&self, token_id: &TokenId) -> Result<bool, SecurityError>;
}

#[cfg(test)]
mod tests {
    use super::RequestStatus;

    #[test]
    fn status_display_matches_wire_name() {
        assert_eq!(RequestStatus::Approved.to_string(), "approved");
        assert_eq!(RequestStatus::Expired.to_string(), "expired");
    }
}
