// crates/opspilot-storage/src/namespaced.rs
// ============================================================================
// Module: Namespaced Storage View
// Description: Decorator that prefixes every collection argument with a
// fixed namespace, giving per-module isolation by construction.
// Purpose: Let a module's storage handle touch only its own collections.
// Dependencies: opspilot-core
// ============================================================================

//! ## Overview
//! [`NamespacedView`] wraps any [`StorageBackend`] and rewrites every
//! `collection` argument to `"<namespace>::<collection>"` before delegating.
//! There is no escape hatch: a view constructed with namespace `"detector.cpu"`
//! cannot address a collection outside that prefix. The kernel uses the
//! reserved prefix `"system"` for its own collections.

use std::sync::Arc;

use async_trait::async_trait;
use opspilot_core::ListOptions;
use opspilot_core::StorageBackend;
use opspilot_core::StorageError;
use serde_json::Value;

/// Reserved namespace used by the kernel's own collections.
pub const SYSTEM_NAMESPACE: &str = "system";

/// Decorates an inner backend with a fixed namespace prefix.
pub struct NamespacedView {
    inner: Arc<dyn StorageBackend>,
    namespace: String,
}

impl NamespacedView {
    /// Creates a view scoped to `namespace` over `inner`.
    #[must_use]
    pub fn new(inner: Arc<dyn StorageBackend>, namespace: impl Into<String>) -> Self {
        Self {
            inner,
            namespace: namespace.into(),
        }
    }

    /// Creates a view scoped to the reserved system namespace.
    #[must_use]
    pub fn system(inner: Arc<dyn StorageBackend>) -> Self {
        Self::new(inner, SYSTEM_NAMESPACE)
    }

    fn scoped(&self, collection: &str) -> String {
        format!("{}::{}", self.namespace, collection)
    }
}

#[async_trait]
impl StorageBackend for NamespacedView {
    async fn get(&self, collection: &str, key: &str) -> Result<Option<Value>, StorageError> {
        self.inner.get(&self.scoped(collection), key).await
    }

    async fn set(&self, collection: &str, key: &str, value: Value) -> Result<(), StorageError> {
        self.inner.set(&self.scoped(collection), key, value).await
    }

    async fn delete(&self, collection: &str, key: &str) -> Result<bool, StorageError> {
        self.inner.delete(&self.scoped(collection), key).await
    }

    async fn list(&self, collection: &str, options: ListOptions) -> Result<Vec<(String, Value)>, StorageError> {
        self.inner.list(&self.scoped(collection), options).await
    }

    async fn has(&self, collection: &str, key: &str) -> Result<bool, StorageError> {
        self.inner.has(&self.scoped(collection), key).await
    }

    async fn count(&self, collection: &str) -> Result<usize, StorageError> {
        self.inner.count(&self.scoped(collection)).await
    }

    async fn clear(&self, collection: &str) -> Result<(), StorageError> {
        self.inner.clear(&self.scoped(collection)).await
    }
}
