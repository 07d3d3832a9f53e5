// crates/opspilot-audit/src/lib.rs
// ============================================================================
// Crate: opspilot-audit
// Description: Append-only audit log layered atop the storage contract.
// Purpose: Record every security-relevant decision so it can never be
// silently undone or forgotten.
// Dependencies: opspilot-core
// ============================================================================

//! # opspilot-audit
//!
//! [`StorageAuditLog`] is the only [`opspilot_core::AuditLog`] implementation
//! in this workspace: it generates an id and timestamp per entry, appends to
//! the reserved `system::audit` collection, and answers `query` by scanning
//! and filtering in memory, newest-first. No code path here ever deletes or
//! mutates a stored entry.

use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use async_trait::async_trait;
use opspilot_core::AuditEntry;
use opspilot_core::AuditEntryInput;
use opspilot_core::AuditFilter;
use opspilot_core::AuditId;
use opspilot_core::AuditLog;
use opspilot_core::Clock;
use opspilot_core::ListOptions;
use opspilot_core::StorageBackend;
use opspilot_core::StorageError;

/// Reserved collection name audit entries are appended to.
pub const AUDIT_COLLECTION: &str = "audit";

/// Storage-backed, append-only [`AuditLog`] implementation.
pub struct StorageAuditLog {
    storage: Arc<dyn StorageBackend>,
    clock: Arc<dyn Clock>,
    sequence: AtomicU64,
}

impl StorageAuditLog {
    /// Creates a log appending to `storage`'s `audit` collection.
    ///
    /// `storage` is expected to already be scoped to the reserved system
    /// namespace (see `opspilot_storage::NamespacedView::system`).
    #[must_use]
    pub fn new(storage: Arc<dyn StorageBackend>, clock: Arc<dyn Clock>) -> Self {
        Self {
            storage,
            clock,
            sequence: AtomicU64::new(0),
        }
    }

    fn next_id(&self, timestamp: i64) -> AuditId {
        let sequence = self.sequence.fetch_add(1, Ordering::Relaxed);
        AuditId::new(format!("audit-{timestamp}-{sequence}"))
    }
}

#[async_trait]
impl AuditLog for StorageAuditLog {
    async fn log(&self, input: AuditEntryInput) -> Result<AuditEntry, StorageError> {
        let timestamp = self.clock.now_millis();
        let entry = AuditEntry {
            id: self.next_id(timestamp),
            timestamp,
            action: input.action,
            actor: input.actor,
            target: input.target,
            details: input.details,
            correlation_id: input.correlation_id,
        };
        let serialized = serde_json::to_value(&entry).map_err(|err| StorageError::Serialization(Box::new(err)))?;
        self.storage.set(AUDIT_COLLECTION, entry.id.as_str(), serialized).await?;
        Ok(entry)
    }

    async fn query(&self, filter: AuditFilter) -> Result<Vec<AuditEntry>, StorageError> {
        let rows = self.storage.list(AUDIT_COLLECTION, ListOptions::new()).await?;
        let mut entries: Vec<AuditEntry> = rows
            .into_iter()
            .filter_map(|(_, value)| serde_json::from_value(value).ok())
            .filter(|entry: &AuditEntry| filter.matches(entry))
            .collect();
        entries.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        if let Some(limit) = filter.limit {
            entries.truncate(limit);
        }
        Ok(entries)
    }
}
