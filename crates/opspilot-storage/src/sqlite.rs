// crates/opspilot-storage/src/sqlite.rs
// ============================================================================
// Module: Embedded-SQL Storage Backend
// Description: Single table keyed by (collection, key), WAL journaling,
// prepared statements for every hot path, blocking work off the async
// dispatch thread.
// Purpose: A durable backend with concurrent-reader semantics.
// Dependencies: opspilot-core, rusqlite, tokio::task::spawn_blocking
// ============================================================================

//! ## Overview
//! `rusqlite`'s `Connection` is synchronous; every operation is dispatched
//! through [`tokio::task::spawn_blocking`] so it never blocks the async
//! event-delivery thread, per the "sync-wrapping-async storage" design note.
//! The connection is guarded by a `std::sync::Mutex` since the critical
//! section is always short and runs inside a blocking task.

use std::path::Path;
use std::sync::Arc;
use std::sync::Mutex;

use async_trait::async_trait;
use opspilot_core::ListOptions;
use opspilot_core::ListOrder;
use opspilot_core::StorageBackend;
use opspilot_core::StorageError;
use rusqlite::params;
use rusqlite::Connection;
use rusqlite::OptionalExtension;
use serde_json::Value;

fn io_err<E: std::error::Error + Send + Sync + 'static>(err: E) -> StorageError {
    StorageError::Io(Box::new(err))
}

fn ser_err(err: serde_json::Error) -> StorageError {
    StorageError::Serialization(Box::new(err))
}

/// Embedded-SQL [`StorageBackend`] implementation backed by `SQLite`.
pub struct SqliteBackend {
    connection: Arc<Mutex<Connection>>,
}

impl SqliteBackend {
    /// Opens (creating if absent) a `SQLite` database at `path` in WAL mode.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Io`] if the database cannot be opened or the
    /// schema cannot be created.
    pub async fn open(path: impl AsRef<Path> + Send + 'static) -> Result<Self, StorageError> {
        let path = path.as_ref().to_path_buf();
        let connection = tokio::task::spawn_blocking(move || -> Result<Connection, StorageError> {
            let conn = Connection::open(path).map_err(io_err)?;
            conn.pragma_update(None, "journal_mode", "WAL").map_err(io_err)?;
            conn.pragma_update(None, "synchronous", "NORMAL").map_err(io_err)?;
            conn.execute(
                "CREATE TABLE IF NOT EXISTS kv (
                    collection TEXT NOT NULL,
                    key TEXT NOT NULL,
                    value TEXT NOT NULL,
                    PRIMARY KEY (collection, key)
                )",
                [],
            )
            .map_err(io_err)?;
            Ok(conn)
        })
        .await
        .map_err(io_err)??;
        Ok(Self {
            connection: Arc::new(Mutex::new(connection)),
        })
    }

    /// Opens an in-memory database, primarily for tests.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Io`] if the schema cannot be created.
    pub fn open_in_memory() -> Result<Self, StorageError> {
        let conn = Connection::open_in_memory().map_err(io_err)?;
        conn.execute(
            "CREATE TABLE IF NOT EXISTS kv (
                collection TEXT NOT NULL,
                key TEXT NOT NULL,
                value TEXT NOT NULL,
                PRIMARY KEY (collection, key)
            )",
            [],
        )
        .map_err(io_err)?;
        Ok(Self {
            connection: Arc::new(Mutex::new(conn)),
        })
    }

    async fn with_connection<F, T>(&self, f: F) -> Result<T, StorageError>
    where
        F: FnOnce(&Connection) -> Result<T, StorageError> + Send + 'static,
        T: Send + 'static,
    {
        let connection = Arc::clone(&self.connection);
        tokio::task::spawn_blocking(move || {
            let guard = connection.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
            f(&guard)
        })
        .await
        .map_err(io_err)?
    }
}

#[async_trait]
impl StorageBackend for SqliteBackend {
    async fn get(&self, collection: &str, key: &str) -> Result<Option<Value>, StorageError> {
        let collection = collection.to_string();
        let key = key.to_string();
        self.with_connection(move |conn| {
            let raw: Option<String> = conn
                .query_row("SELECT value FROM kv WHERE collection = ?1 AND key = ?2", params![collection, key], |row| row.get(0))
                .optional()
                .map_err(io_err)?;
            raw.map(|text| serde_json::from_str(&text).map_err(ser_err)).transpose()
        })
        .await
    }

    async fn set(&self, collection: &str, key: &str, value: Value) -> Result<(), StorageError> {
        let collection = collection.to_string();
        let key = key.to_string();
        let text = serde_json::to_string(&value).map_err(ser_err)?;
        self.with_connection(move |conn| {
            conn.execute(
                "INSERT INTO kv (collection, key, value) VALUES (?1, ?2, ?3)
                 ON CONFLICT(collection, key) DO UPDATE SET value = excluded.value",
                params![collection, key, text],
            )
            .map_err(io_err)?;
            Ok(())
        })
        .await
    }

    async fn delete(&self, collection: &str, key: &str) -> Result<bool, StorageError> {
        let collection = collection.to_string();
        let key = key.to_string();
        self.with_connection(move |conn| {
            let affected = conn.execute("DELETE FROM kv WHERE collection = ?1 AND key = ?2", params![collection, key]).map_err(io_err)?;
            Ok(affected > 0)
        })
        .await
    }

    async fn list(&self, collection: &str, options: ListOptions) -> Result<Vec<(String, Value)>, StorageError> {
        let collection = collection.to_string();
        self.with_connection(move |conn| {
            let order_clause = match options.order {
                ListOrder::KeyAscending => "ORDER BY key ASC",
                ListOrder::KeyDescending => "ORDER BY key DESC",
            };
            let sql = format!("SELECT key, value FROM kv WHERE collection = ?1 {order_clause}");
            let mut statement = conn.prepare(&sql).map_err(io_err)?;
            let rows = statement
                .query_map(params![collection], |row| {
                    let key: String = row.get(0)?;
                    let raw: String = row.get(1)?;
                    Ok((key, raw))
                })
                .map_err(io_err)?;
            let mut entries = Vec::new();
            for row in rows {
                let (key, raw) = row.map_err(io_err)?;
                let value = serde_json::from_str(&raw).map_err(ser_err)?;
                entries.push((key, value));
            }
            let offset = options.offset.unwrap_or(0);
            let entries: Vec<_> = entries.into_iter().skip(offset).collect();
            Ok(match options.limit {
                Some(limit) => entries.into_iter().take(limit).collect(),
                None => entries,
            })
        })
        .await
    }

    async fn has(&self, collection: &str, key: &str) -> Result<bool, StorageError> {
        Ok(self.get(collection, key).await?.is_some())
    }

    async fn count(&self, collection: &str) -> Result<usize, StorageError> {
        let collection = collection.to_string();
        self.with_connection(move |conn| {
            let count: i64 = conn.query_row("SELECT COUNT(*) FROM kv WHERE collection = ?1", params![collection], |row| row.get(0)).map_err(io_err)?;
            Ok(usize::try_from(count).unwrap_or(usize::MAX))
        })
        .await
    }

    async fn clear(&self, collection: &str) -> Result<(), StorageError> {
        let collection = collection.to_string();
        self.with_connection(move |conn| {
            conn.execute("DELETE FROM kv WHERE collection = ?1", params![collection]).map_err(io_err)?;
            Ok(())
        })
        .await
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

    use super::SqliteBackend;

    #[tokio::test]
    async fn set_then_get_round_trips() {
        let backend = SqliteBackend::open_in_memory().expect("backend");
        backend.set("c", "k", json!({"a": 1})).await.expect("set");
        assert_eq!(backend.get("c", "k").await.expect("get"), Some(json!({"a": 1})));
    }

    #[tokio::test]
    async fn upsert_overwrites_existing_value() {
        let backend = SqliteBackend::open_in_memory().expect("backend");
        backend.set("c", "k", json!(1)).await.expect("set");
        backend.set("c", "k", json!(2)).await.expect("set");
        assert_eq!(backend.get("c", "k").await.expect("get"), Some(json!(2)));
    }

    #[tokio::test]
    async fn list_respects_limit_and_offset() {
        let backend = SqliteBackend::open_in_memory().expect("backend");
        for i in 0..5 {
            backend.set("c", &format!("k{i}"), json!(i)).await.expect("set");
        }
        let page = backend.list("c", ListOptions::new().with_offset(1).with_limit(2)).await.expect("list");
        assert_eq!(page.iter().map(|(k, _)| k.clone()).collect::<Vec<_>>(), vec!["k1", "k2"]);
    }
}
