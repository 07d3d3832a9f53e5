// crates/opspilot-core/src/storage.rs
// ============================================================================
// Module: OpsPilot Storage Contract
// Description: The collection/key/value contract shared by every storage
// backend and by the namespaced view modules receive.
// Purpose: Let the kernel, audit log, and approval gate depend on storage
// abstractly; concrete backends live in opspilot-storage.
// Dependencies: async-trait, serde_json, crate::error
// ============================================================================

//! ## Overview
//! [`StorageBackend`] is the one contract every backend (memory, filesystem,
//! embedded SQL) and the namespaced view decorator implement identically, so
//! client code cannot observe which backend it is talking to beyond failure
//! semantics. Stored values are self-describing JSON, matching the "opaque
//! blob" data model: callers serialize their own types into a [`serde_json::Value`]
//! before calling `set`.

use async_trait::async_trait;
use serde_json::Value;

use crate::error::StorageError;

/// Ordering applied to [`StorageBackend::list`] results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ListOrder {
    /// Ascending by key, the deterministic default.
    #[default]
    KeyAscending,
    /// Descending by key.
    KeyDescending,
}

/// Optional pagination and ordering for [`StorageBackend::list`].
#[derive(Debug, Clone, Copy, Default)]
pub struct ListOptions {
    /// Maximum number of entries to return.
    pub limit: Option<usize>,
    /// Number of entries to skip before collecting results.
    pub offset: Option<usize>,
    /// Ordering applied before limit/offset.
    pub order: ListOrder,
}

impl ListOptions {
    /// Returns the default, unlimited, key-ascending options.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the maximum number of entries to return.
    #[must_use]
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Sets the number of entries to skip.
    #[must_use]
    pub fn with_offset(mut self, offset: usize) -> Self {
        self.offset = Some(offset);
        self
    }

    /// Sets the result ordering.
    #[must_use]
    pub fn with_order(mut self, order: ListOrder) -> Self {
        self.order = order;
        self
    }
}

/// The collection/key/value contract every storage backend implements.
///
/// # Invariants
/// - Keys are unique within a collection.
/// - `list` on a missing collection returns an empty sequence, not an error.
/// - `delete` on an absent key returns `false`, not an error.
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Reads the value stored at `(collection, key)`, if any.
    async fn get(&self, collection: &str, key: &str) -> Result<Option<Value>, StorageError>;

    /// Upserts `value` at `(collection, key)`.
    async fn set(&self, collection: &str, key: &str, value: Value) -> Result<(), StorageError>;

    /// Removes `(collection, key)` if present, returning whether it existed.
    async fn delete(&self, collection: &str, key: &str) -> Result<bool, StorageError>;

    /// Lists `(key, value)` pairs in `collection` subject to `options`.
    async fn list(&self, collection: &str, options: ListOptions) -> Result<Vec<(String, Value)>, StorageError>;

    /// Returns whether `(collection, key)` exists.
    async fn has(&self, collection: &str, key: &str) -> Result<bool, StorageError>;

    /// Returns the number of entries in `collection`.
    async fn count(&self, collection: &str) -> Result<usize, StorageError>;

    /// Removes every entry in `collection`.
    async fn clear(&self, collection: &str) -> Result<(), StorageError>;
}
