// crates/opspilot-storage/src/filesystem.rs
// ============================================================================
// Module: Filesystem Storage Backend
// Description: One directory per collection, one file per key, atomic
// write-then-rename, corrupt files skipped silently on list.
// Purpose: A durable backend with no external service dependency.
// Dependencies: opspilot-core, tokio::fs, serde_json
// ============================================================================

//! ## Overview
//! Collection and key names are sanitized to a portable character set before
//! touching the filesystem, so arbitrary module-supplied strings cannot
//! escape the root directory or collide with reserved names. Writes go to a
//! `.tmp`-suffixed sibling file first and are renamed into place, so a crash
//! mid-write never leaves a partially-written value visible to readers.

use std::path::Path;
use std::path::PathBuf;

use async_trait::async_trait;
use opspilot_core::ListOptions;
use opspilot_core::StorageBackend;
use opspilot_core::StorageError;
use serde_json::Value;

use crate::paginate;

/// Replaces every character outside `[A-Za-z0-9_.-]` with `_`.
fn sanitize(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' || c == '.' || c == '-' { c } else { '_' })
        .collect()
}

fn io_err(err: std::io::Error) -> StorageError {
    StorageError::Io(Box::new(err))
}

fn ser_err(err: serde_json::Error) -> StorageError {
    StorageError::Serialization(Box::new(err))
}

/// Filesystem-backed [`StorageBackend`] implementation.
pub struct FilesystemBackend {
    root: PathBuf,
}

impl FilesystemBackend {
    /// Creates a backend rooted at `root`, creating the directory if absent.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Io`] if `root` cannot be created.
    pub async fn new(root: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let root = root.into();
        tokio::fs::create_dir_all(&root).await.map_err(io_err)?;
        Ok(Self { root })
    }

    fn collection_dir(&self, collection: &str) -> PathBuf {
        self.root.join(sanitize(collection))
    }

    fn key_path(&self, collection: &str, key: &str) -> PathBuf {
        self.collection_dir(collection).join(format!("{}.json", sanitize(key)))
    }

    async fn write_atomic(path: &Path, contents: &[u8]) -> Result<(), StorageError> {
        let tmp_path = path.with_extension("json.tmp");
        tokio::fs::write(&tmp_path, contents).await.map_err(io_err)?;
        tokio::fs::rename(&tmp_path, path).await.map_err(io_err)?;
        Ok(())
    }
}

#[async_trait]
impl StorageBackend for FilesystemBackend {
    async fn get(&self, collection: &str, key: &str) -> Result<Option<Value>, StorageError> {
        let path = self.key_path(collection, key);
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes).map_err(ser_err)?)),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(io_err(err)),
        }
    }

    async fn set(&self, collection: &str, key: &str, value: Value) -> Result<(), StorageError> {
        let dir = self.collection_dir(collection);
        tokio::fs::create_dir_all(&dir).await.map_err(io_err)?;
        let bytes = serde_json::to_vec(&value).map_err(ser_err)?;
        Self::write_atomic(&self.key_path(collection, key), &bytes).await
    }

    async fn delete(&self, collection: &str, key: &str) -> Result<bool, StorageError> {
        match tokio::fs::remove_file(self.key_path(collection, key)).await {
            Ok(()) => Ok(true),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(err) => Err(io_err(err)),
        }
    }

    async fn list(&self, collection: &str, options: ListOptions) -> Result<Vec<(String, Value)>, StorageError> {
        let dir = self.collection_dir(collection);
        let mut read_dir = match tokio::fs::read_dir(&dir).await {
            Ok(read_dir) => read_dir,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(io_err(err)),
        };
        let mut entries = Vec::new();
        while let Some(entry) = read_dir.next_entry().await.map_err(io_err)? {
            let path = entry.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some("json") {
                continue;
            }
            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            let Ok(bytes) = tokio::fs::read(&path).await else {
                continue;
            };
            let Ok(value) = serde_json::from_slice(&bytes) else {
                continue;
            };
            entries.push((stem.to_string(), value));
        }
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(paginate(entries, options))
    }

    async fn has(&self, collection: &str, key: &str) -> Result<bool, StorageError> {
        Ok(tokio::fs::try_exists(self.key_path(collection, key)).await.map_err(io_err)?)
    }

    async fn count(&self, collection: &str) -> Result<usize, StorageError> {
        Ok(self.list(collection, ListOptions::new()).await?.len())
    }

    async fn clear(&self, collection: &str) -> Result<(), StorageError> {
        match tokio::fs::remove_dir_all(self.collection_dir(collection)).await {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(io_err(err)),
        }
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

    use opspilot_core::ListOptions;
    use opspilot_core::StorageBackend;
    use serde_json::json;
    use tempfile::tempdir;

    use super::FilesystemBackend;

    #[tokio::test]
    async fn set_then_get_round_trips() {
        let dir = tempdir().expect("tempdir");
        let backend = FilesystemBackend::new(dir.path()).await.expect("backend");
        backend.set("c", "k", json!({"a": 1})).await.expect("set");
        assert_eq!(backend.get("c", "k").await.expect("get"), Some(json!({"a": 1})));
    }

    #[tokio::test]
    async fn writes_are_atomic_via_rename() {
        let dir = tempdir().expect("tempdir");
        let backend = FilesystemBackend::new(dir.path()).await.expect("backend");
        backend.set("c", "k", json!(1)).await.expect("set");
        let tmp_path = dir.path().join("c").join("k.json.tmp");
        assert!(!tmp_path.exists());
    }

    #[tokio::test]
    async fn corrupt_file_is_skipped_by_list() {
        let dir = tempdir().expect("tempdir");
        let backend = FilesystemBackend::new(dir.path()).await.expect("backend");
        backend.set("c", "good", json!(1)).await.expect("set");
        let collection_dir = dir.path().join("c");
        tokio::fs::write(collection_dir.join("bad.json"), b"not json").await.expect("write corrupt");
        let listed = backend.list("c", ListOptions::new()).await.expect("list");
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].0, "good");
    }

    #[tokio::test]
    async fn names_are_sanitized() {
        let dir = tempdir().expect("tempdir");
        let backend = FilesystemBackend::new(dir.path()).await.expect("backend");
        backend.set("../escape", "../../etc", json!(1)).await.expect("set");
        let escaped = dir.path().parent().expect("parent").join("escape");
        assert!(!escaped.exists());
    }
}
