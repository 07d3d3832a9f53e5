// crates/opspilot-gate/src/lib.rs
// ============================================================================
// Crate: opspilot-gate
// Description: The request -> decision -> token -> validation state machine
// every mutating operation traverses.
// Purpose: Implement opspilot_core::ApprovalGate, storage- and audit-backed,
// publishing action.proposed/action.approved as a side effect.
// Dependencies: opspilot-core
// ============================================================================

//! # opspilot-gate
//!
//! [`StorageApprovalGate`] is the concrete approval state machine: `pending
//! -> approved -> expired` or `pending -> denied`. Every transition is
//! audited before its corresponding event is published; if the audit write
//! fails, the transition is reported as failed and no event is published,
//! per the audit-critical error policy. All operations serialize through a
//! single internal lock, matching the "single dispatch thread" invariant the
//! specification allows for non-SQL backends.

use std::collections::HashMap;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use async_trait::async_trait;
use opspilot_core::ApprovalGate;
use opspilot_core::ApprovalRequest;
use opspilot_core::ApprovalRequestInput;
use opspilot_core::ApprovalToken;
use opspilot_core::AuditEntryInput;
use opspilot_core::AuditLog;
use opspilot_core::Clock;
use opspilot_core::Event;
use opspilot_core::EventBus;
use opspilot_core::EventEnvelope;
use opspilot_core::ListOptions;
use opspilot_core::ModuleId;
use opspilot_core::RequestId;
use opspilot_core::RequestStatus;
use opspilot_core::SecurityError;
use opspilot_core::StorageBackend;
use opspilot_core::TokenId;
use opspilot_core::event::ActionApproved;
use opspilot_core::event::ActionProposed;
use tokio::sync::Mutex;

/// Collection requests are stored under (within the system namespace).
pub const REQUESTS_COLLECTION: &str = "approval_requests";
/// Collection tokens are stored under (within the system namespace).
pub const TOKENS_COLLECTION: &str = "approval_tokens";
/// Fixed token lifetime: 15 minutes.
pub const TOKEN_TTL_MS: i64 = 15 * 60 * 1000;

fn storage_to_security(err: opspilot_core::StorageError) -> SecurityError {
    SecurityError::AuditFailed(Box::new(err))
}

/// Storage- and audit-backed [`ApprovalGate`] implementation.
pub struct StorageApprovalGate {
    storage: Arc<dyn StorageBackend>,
    audit: Arc<dyn AuditLog>,
    bus: Arc<dyn EventBus>,
    clock: Arc<dyn Clock>,
    source_module: ModuleId,
    sequence: AtomicU64,
    lock: Mutex<()>,
}

impl StorageApprovalGate {
    /// Creates a gate publishing as `source_module`.
    #[must_use]
    pub fn new(storage: Arc<dyn StorageBackend>, audit: Arc<dyn AuditLog>, bus: Arc<dyn EventBus>, clock: Arc<dyn Clock>, source_module: ModuleId) -> Self {
        Self {
            storage,
            audit,
            bus,
            clock,
            source_module,
            sequence: AtomicU64::new(0),
            lock: Mutex::new(()),
        }
    }

    fn next_request_id(&self, now: i64) -> RequestId {
        let seq = self.sequence.fetch_add(1, Ordering::Relaxed);
        RequestId::new(format!("req-{now}-{seq}"))
    }

    fn next_token_id(&self, now: i64) -> TokenId {
        let seq = self.sequence.fetch_add(1, Ordering::Relaxed);
        TokenId::new(format!("tok-{now}-{seq}"))
    }

    async fn load_request(&self, request_id: &RequestId) -> Result<ApprovalRequest, SecurityError> {
        let value = self.storage.get(REQUESTS_COLLECTION, request_id.as_str()).await.map_err(storage_to_security)?;
        let value = value.ok_or_else(|| SecurityError::RequestNotFound(request_id.to_string()))?;
        serde_json::from_value(value).map_err(|err| SecurityError::AuditFailed(Box::new(err)))
    }

    async fn save_request(&self, request: &ApprovalRequest) -> Result<(), SecurityError> {
        let value = serde_json::to_value(request).map_err(|err| SecurityError::AuditFailed(Box::new(err)))?;
        self.storage.set(REQUESTS_COLLECTION, request.id.as_str(), value).await.map_err(storage_to_security)
    }

    async fn load_token(&self, token_id: &TokenId) -> Result<Option<ApprovalToken>, SecurityError> {
        let value = self.storage.get(TOKENS_COLLECTION, token_id.as_str()).await.map_err(storage_to_security)?;
        value.map(|v| serde_json::from_value(v).map_err(|err| SecurityError::AuditFailed(Box::new(err)))).transpose()
    }

    fn token_for_request(&self, tokens: &[ApprovalToken], request_id: &RequestId) -> Option<ApprovalToken> {
        tokens.iter().find(|token| &token.request_id == request_id).cloned()
    }

    async fn tokens_by_request(&self, request_id: &RequestId) -> Result<Vec<ApprovalToken>, SecurityError> {
        let rows = self.storage.list(TOKENS_COLLECTION, ListOptions::new()).await.map_err(storage_to_security)?;
        let mut tokens = Vec::new();
        for (_, value) in rows {
            if let Ok(token) = serde_json::from_value::<ApprovalToken>(value) {
                tokens.push(token);
            }
        }
        Ok(tokens.into_iter().filter(|t| &t.request_id == request_id).collect())
    }

    /// Reconciles `request` to `expired` if it is approved and its token has
    /// expired, returning the (possibly updated) status. When `mutate` is
    /// false the stored state is left untouched.
    async fn reconcile(&self, mut request: ApprovalRequest, mutate: bool) -> Result<RequestStatus, SecurityError> {
        if request.status != RequestStatus::Approved {
            return Ok(request.status);
        }
        let tokens = self.tokens_by_request(&request.id).await?;
        let Some(token) = self.token_for_request(&tokens, &request.id) else {
            return Ok(request.status);
        };
        if token.expires_at > self.clock.now_millis() {
            return Ok(request.status);
        }
        if mutate {
            request.status = RequestStatus::Expired;
            self.save_request(&request).await?;
        }
        Ok(RequestStatus::Expired)
    }
}

#[async_trait]
impl ApprovalGate for StorageApprovalGate {
    async fn request_approval(&self, input: ApprovalRequestInput) -> Result<ApprovalRequest, SecurityError> {
        let _guard = self.lock.lock().await;
        let now = self.clock.now_millis();
        let request = ApprovalRequest {
            id: self.next_request_id(now),
            action_type: input.action_type,
            description: input.description,
            reasoning: input.reasoning,
            requested_by: input.requested_by,
            requested_at: now,
            status: RequestStatus::Pending,
            denial_reason: None,
            metadata: input.metadata,
        };
        self.audit
            .log(
                AuditEntryInput::new("action.requested", &request.requested_by)
                    .with_target(request.id.to_string())
                    .with_details(HashMap::from([("action_type".to_string(), serde_json::Value::String(request.action_type.clone()))])),
            )
            .await
            .map_err(storage_to_security)?;
        self.save_request(&request).await?;
        self.bus
            .publish(EventEnvelope::new(
                Event::ActionProposed(ActionProposed {
                    request_id: request.id.clone(),
                    action_type: request.action_type.clone(),
                    description: request.description.clone(),
                    reasoning: request.reasoning.clone(),
                    requested_by: request.requested_by.clone(),
                    requested_at: request.requested_at,
                }),
                self.source_module.clone(),
                now,
            ))
            .await;
        Ok(request)
    }

    async fn approve(&self, request_id: &RequestId, approved_by: &str) -> Result<ApprovalToken, SecurityError> {
        let _guard = self.lock.lock().await;
        let mut request = self.load_request(request_id).await?;
        if request.status != RequestStatus::Pending {
            return Err(SecurityError::InvalidState {
                request_id: request_id.to_string(),
                state: request.status.to_string(),
                operation: "approve".into(),
            });
        }
        let now = self.clock.now_millis();
        let token = ApprovalToken {
            id: self.next_token_id(now),
            request_id: request_id.clone(),
            approved_by: approved_by.to_string(),
            approved_at: now,
            expires_at: now + TOKEN_TTL_MS,
        };
        self.audit
            .log(AuditEntryInput::new("action.approved", approved_by).with_target(request_id.to_string()))
            .await
            .map_err(storage_to_security)?;
        request.status = RequestStatus::Approved;
        self.save_request(&request).await?;
        let token_value = serde_json::to_value(&token).map_err(|err| SecurityError::AuditFailed(Box::new(err)))?;
        self.storage.set(TOKENS_COLLECTION, token.id.as_str(), token_value).await.map_err(storage_to_security)?;
        self.bus
            .publish(EventEnvelope::new(
                Event::ActionApproved(ActionApproved {
                    request_id: request_id.clone(),
                    token_id: token.id.clone(),
                    approved_by: approved_by.to_string(),
                }),
                self.source_module.clone(),
                now,
            ))
            .await;
        Ok(token)
    }

    async fn deny(&self, request_id: &RequestId, denied_by: &str, reason: Option<String>) -> Result<(), SecurityError> {
        let _guard = self.lock.lock().await;
        let mut request = self.load_request(request_id).await?;
        if request.status != RequestStatus::Pending {
            return Err(SecurityError::InvalidState {
                request_id: request_id.to_string(),
                state: request.status.to_string(),
                operation: "deny".into(),
            });
        }
        self.audit
            .log(AuditEntryInput::new("action.denied", denied_by).with_target(request_id.to_string()))
            .await
            .map_err(storage_to_security)?;
        request.status = RequestStatus::Denied;
        request.denial_reason = reason;
        self.save_request(&request).await
    }

    async fn get_status(&self, request_id: &RequestId) -> Result<RequestStatus, SecurityError> {
        let _guard = self.lock.lock().await;
        let request = self.load_request(request_id).await?;
        self.reconcile(request, true).await
    }

    async fn inspect_status(&self, request_id: &RequestId) -> Result<RequestStatus, SecurityError> {
        let request = self.load_request(request_id).await?;
        self.reconcile(request, false).await
    }

    async fn validate_token(&self, token_id: &TokenId) -> Result<bool, SecurityError> {
        let Some(token) = self.load_token(token_id).await? else {
            return Ok(false);
        };
        if token.expires_at <= self.clock.now_millis() {
            return Ok(false);
        }
        let status = self.get_status(&token.request_id).await?;
        Ok(status == RequestStatus::Approved)
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

    use std::sync::Arc;
    use std::time::Duration;

    use opspilot_audit::StorageAuditLog;
    use opspilot_bus::InProcessBus;
    use opspilot_core::ApprovalGate;
    use opspilot_core::ApprovalRequestInput;
    use opspilot_core::AuditLog;
    use opspilot_core::ModuleId;
    use opspilot_core::RequestStatus;
    use opspilot_core::StderrLogger;
    use opspilot_core::StorageBackend;
    use opspilot_core::TestClock;
    use opspilot_storage::MemoryBackend;

    use super::StorageApprovalGate;
    use super::TOKEN_TTL_MS;

    fn gate(clock: Arc<TestClock>) -> (StorageApprovalGate, Arc<dyn AuditLog>) {
        let storage: Arc<dyn StorageBackend> = Arc::new(MemoryBackend::new());
        let bus: Arc<dyn opspilot_core::EventBus> = Arc::new(InProcessBus::new(Arc::new(StderrLogger)));
        let audit: Arc<dyn AuditLog> = Arc::new(StorageAuditLog::new(Arc::clone(&storage), Arc::clone(&clock) as Arc<dyn opspilot_core::Clock>));
        let gate = StorageApprovalGate::new(storage, Arc::clone(&audit), bus, clock, ModuleId::new("kernel.gate"));
        (gate, audit)
    }

    fn request_input() -> ApprovalRequestInput {
        ApprovalRequestInput {
            action_type: "restart.service".into(),
            description: "Restart nginx".into(),
            reasoning: "Down".into(),
            requested_by: "test".into(),
            metadata: None,
        }
    }

    #[tokio::test]
    async fn approval_round_trip() {
        let clock = Arc::new(TestClock::new(0));
        let (gate, audit) = gate(Arc::clone(&clock));
        let request = gate.request_approval(request_input()).await.expect("request");
        let token = gate.approve(&request.id, "admin").await.expect("approve");
        assert!(gate.validate_token(&token.id).await.expect("validate"));
        let entries = audit.query(opspilot_core::AuditFilter::new()).await.expect("query");
        let actions: Vec<_> = entries.iter().rev().map(|e| e.action.clone()).collect();
        assert_eq!(actions, vec!["action.requested", "action.approved"]);
    }

    #[tokio::test]
    async fn denied_cannot_then_be_approved() {
        let clock = Arc::new(TestClock::new(0));
        let (gate, _audit) = gate(clock);
        let request = gate.request_approval(request_input()).await.expect("request");
        gate.deny(&request.id, "admin", Some("no".into())).await.expect("deny");
        let err = gate.approve(&request.id, "admin").await.expect_err("approve should fail");
        assert!(err.to_string().contains("denied"));
        assert_eq!(gate.inspect_status(&request.id).await.expect("status"), RequestStatus::Denied);
    }

    #[tokio::test]
    async fn token_expires_after_ttl() {
        let clock = Arc::new(TestClock::new(0));
        let (gate, _audit) = gate(Arc::clone(&clock));
        let request = gate.request_approval(request_input()).await.expect("request");
        gate.approve(&request.id, "admin").await.expect("approve");
        clock.advance(Duration::from_millis(u64::try_from(TOKEN_TTL_MS).expect("ttl fits u64") + 1));
        let status = gate.get_status(&request.id).await.expect("status");
        assert_eq!(status, RequestStatus::Expired);
    }

    #[tokio::test]
    async fn approve_then_deny_raises() {
        let clock = Arc::new(TestClock::new(0));
        let (gate, _audit) = gate(clock);
        let request = gate.request_approval(request_input()).await.expect("request");
        gate.approve(&request.id, "admin").await.expect("approve");
        let err = gate.deny(&request.id, "admin", None).await.expect_err("deny should fail");
        assert!(err.to_string().contains("approved"));
    }
}
