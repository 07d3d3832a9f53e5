// crates/opspilot-storage/src/memory.rs
// ============================================================================
// Module: In-Memory Storage Backend
// Description: Collection/key/value storage backed by a mapping of
// mappings, with deterministic key-ordered listing.
// Purpose: A zero-dependency backend for tests and ephemeral deployments.
// Dependencies: opspilot-core, tokio::sync::Mutex
// ============================================================================

//! ## Overview
//! Every operation completes synchronously under the lock; the `async fn`
//! signatures exist only to satisfy [`StorageBackend`] uniformly across
//! backends. Keys within a collection are held in a [`BTreeMap`] so `list`
//! output is deterministic without a separate sort step.

use std::collections::BTreeMap;
use std::collections::HashMap;

use async_trait::async_trait;
use opspilot_core::ListOptions;
use opspilot_core::StorageBackend;
use opspilot_core::StorageError;
use serde_json::Value;
use tokio::sync::Mutex;

use crate::paginate;

/// In-memory [`StorageBackend`] implementation.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    collections: Mutex<HashMap<String, BTreeMap<String, Value>>>,
}

impl MemoryBackend {
    /// Creates an empty backend.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl StorageBackend for MemoryBackend {
    async fn get(&self, collection: &str, key: &str) -> Result<Option<Value>, StorageError> {
        let collections = self.collections.lock().await;
        Ok(collections.get(collection).and_then(|c| c.get(key)).cloned())
    }

    async fn set(&self, collection: &str, key: &str, value: Value) -> Result<(), StorageError> {
        let mut collections = self.collections.lock().await;
        collections.entry(collection.to_string()).or_default().insert(key.to_string(), value);
        Ok(())
    }

    async fn delete(&self, collection: &str, key: &str) -> Result<bool, StorageError> {
        let mut collections = self.collections.lock().await;
        Ok(collections.get_mut(collection).is_some_and(|c| c.remove(key).is_some()))
    }

    async fn list(&self, collection: &str, options: ListOptions) -> Result<Vec<(String, Value)>, StorageError> {
        let collections = self.collections.lock().await;
        let entries: Vec<(String, Value)> = collections
            .get(collection)
            .map(|c| c.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
            .unwrap_or_default();
        Ok(paginate(entries, options))
    }

    async fn has(&self, collection: &str, key: &str) -> Result<bool, StorageError> {
        let collections = self.collections.lock().await;
        Ok(collections.get(collection).is_some_and(|c| c.contains_key(key)))
    }

    async fn count(&self, collection: &str) -> Result<usize, StorageError> {
        let collections = self.collections.lock().await;
        Ok(collections.get(collection).map_or(0, BTreeMap::len))
    }

    async fn clear(&self, collection: &str) -> Result<(), StorageError> {
        let mut collections = self.collections.lock().await;
        collections.remove(collection);
        Ok(())
    }
}
