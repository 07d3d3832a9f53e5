// crates/opspilot-core/src/audit.rs
// ============================================================================
// Module: OpsPilot Audit Data Model
// Description: Audit entry shape, query filter, and the logger contract the
// module context exposes; the append/query implementation lives in
// opspilot-audit.
// Purpose: Share the audit record shape between the audit crate, the
// approval gate, and the kernel without a crate cycle.
// Dependencies: async-trait, crate::error, crate::identifiers, serde
// ============================================================================

//! ## Overview
//! Audit entries are immutable once stored. [`AuditLog`] is the trait other
//! crates depend on; `opspilot-audit` implements append-only storage-backed
//! logging and filtered query atop [`crate::storage::StorageBackend`].

use std::collections::HashMap;

use async_trait::async_trait;
use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;

use crate::error::StorageError;
use crate::identifiers::AuditId;
use crate::identifiers::CorrelationId;

/// A single immutable audit record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    /// Generated entry identifier.
    pub id: AuditId,
    /// Unix milliseconds at log time.
    pub timestamp: i64,
    /// Action identifier, e.g. `"action.approved"`.
    pub action: String,
    /// Identifier of the actor responsible for the action.
    pub actor: String,
    /// Optional target of the action (module id, request id, etc).
    pub target: Option<String>,
    /// Optional structured details.
    pub details: Option<HashMap<String, Value>>,
    /// Optional correlation id linking this entry to related events.
    pub correlation_id: Option<CorrelationId>,
}

/// Caller-supplied fields for a new audit entry; id and timestamp are
/// generated by the log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntryInput {
    /// Action identifier, e.g. `"action.approved"`.
    pub action: String,
    /// Identifier of the actor responsible for the action.
    pub actor: String,
    /// Optional target of the action.
    pub target: Option<String>,
    /// Optional structured details.
    pub details: Option<HashMap<String, Value>>,
    /// Optional correlation id.
    pub correlation_id: Option<CorrelationId>,
}

impl AuditEntryInput {
    /// Builds a minimal input with only an action and actor.
    #[must_use]
    pub fn new(action: impl Into<String>, actor: impl Into<String>) -> Self {
        Self {
            action: action.into(),
            actor: actor.into(),
            target: None,
            details: None,
            correlation_id: None,
        }
    }

    /// Attaches a target, consuming and returning `self`.
    #[must_use]
    pub fn with_target(mut self, target: impl Into<String>) -> Self {
        self.target = Some(target.into());
        self
    }

    /// Attaches structured details, consuming and returning `self`.
    #[must_use]
    pub fn with_details(mut self, details: HashMap<String, Value>) -> Self {
        self.details = Some(details);
        self
    }

    /// Attaches a correlation id, consuming and returning `self`.
    #[must_use]
    pub fn with_correlation_id(mut self, correlation_id: CorrelationId) -> Self {
        self.correlation_id = Some(correlation_id);
        self
    }
}

/// Optional filters applied by [`AuditLog::query`].
#[derive(Debug, Clone, Default)]
pub struct AuditFilter {
    /// Restrict to entries with this exact action.
    pub action: Option<String>,
    /// Restrict to entries with this exact actor.
    pub actor: Option<String>,
    /// Restrict to entries with timestamp >= this value.
    pub since: Option<i64>,
    /// Restrict to entries with timestamp <= this value.
    pub until: Option<i64>,
    /// Maximum number of entries to return, newest first.
    pub limit: Option<usize>,
}

impl AuditFilter {
    /// Returns an unfiltered, unlimited query.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Restricts to entries with this exact action.
    #[must_use]
    pub fn with_action(mut self, action: impl Into<String>) -> Self {
        self.action = Some(action.into());
        self
    }

    /// Restricts to entries with this exact actor.
    #[must_use]
    pub fn with_actor(mut self, actor: impl Into<String>) -> Self {
        self.actor = Some(actor.into());
        self
    }

    /// Restricts to the inclusive `[since, until]` time range.
    #[must_use]
    pub fn with_time_range(mut self, since: i64, until: i64) -> Self {
        self.since = Some(since);
        self.until = Some(until);
        self
    }

    /// Limits the number of returned entries.
    #[must_use]
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Returns whether `entry` satisfies this filter.
    #[must_use]
    pub fn matches(&self, entry: &AuditEntry) -> bool {
        if let Some(action) = &self.action {
            if &entry.action != action {
                return false;
            }
        }
        if let Some(actor) = &self.actor {
            if &entry.actor != actor {
                return false;
            }
        }
        if let Some(since) = self.since {
            if entry.timestamp < since {
                return false;
            }
        }
        if let Some(until) = self.until {
            if entry.timestamp > until {
                return false;
            }
        }
        true
    }
}

/// The append-only audit log contract modules and the approval gate depend
/// on.
///
/// # Invariants
/// - No implementation removes or mutates a stored entry.
/// - `query` returns entries sorted newest-first.
#[async_trait]
pub trait AuditLog: Send + Sync {
    /// Generates an id and timestamp, then appends the entry.
    async fn log(&self, input: AuditEntryInput) -> Result<AuditEntry, StorageError>;

    /// Scans stored entries, applying `filter`, newest-first.
    async fn query(&self, filter: AuditFilter) -> Result<Vec<AuditEntry>, StorageError>;
}

#[cfg(test)]
mod tests {
    use super::AuditEntry;
    use super::AuditFilter;

    fn entry(action: &str, actor: &str, timestamp: i64) -> AuditEntry {
        AuditEntry {
            id: crate::identifiers::AuditId::new("a-1"),
            timestamp,
            action: action.into(),
            actor: actor.into(),
            target: None,
            details: None,
            correlation_id: None,
        }
    }

    #[test]
    fn filter_matches_on_all_dimensions() {
        let filter = AuditFilter::new().with_action("action.approved").with_actor("admin").with_time_range(0, 100);
        assert!(filter.matches(&entry("action.approved", "admin", 50)));
        assert!(!filter.matches(&entry("action.denied", "admin", 50)));
        assert!(!filter.matches(&entry("action.approved", "operator", 50)));
        assert!(!filter.matches(&entry("action.approved", "admin", 200)));
    }

    #[test]
    fn empty_filter_matches_everything() {
        let filter = AuditFilter::new();
        assert!(filter.matches(&entry("anything", "anyone", i64::MAX)));
    }
}
