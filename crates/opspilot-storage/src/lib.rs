// crates/opspilot-storage/src/lib.rs
// ============================================================================
// Crate: opspilot-storage
// Description: Memory, filesystem, and embedded-SQL backends sharing the
// opspilot_core::StorageBackend contract, plus the namespaced view decorator.
// Purpose: Interchangeable persistence for the kernel, audit log, and
// approval gate.
// ============================================================================

//! # opspilot-storage
//!
//! Three interchangeable [`opspilot_core::StorageBackend`] implementations —
//! [`memory::MemoryBackend`], [`filesystem::FilesystemBackend`],
//! [`sqlite::SqliteBackend`] — plus [`namespaced::NamespacedView`], the
//! decorator that gives every module its own isolated collection prefix.

pub mod filesystem;
pub mod memory;
pub mod namespaced;
pub mod sqlite;

pub use filesystem::FilesystemBackend;
pub use memory::MemoryBackend;
pub use namespaced::NamespacedView;
pub use namespaced::SYSTEM_NAMESPACE;
pub use sqlite::SqliteBackend;

use opspilot_core::ListOptions;
use serde_json::Value;

/// Applies offset then limit to an already key-ordered entry list, shared by
/// every backend that materializes its full collection before paginating.
pub(crate) fn paginate(entries: Vec<(String, Value)>, options: ListOptions) -> Vec<(String, Value)> {
    let mut entries = entries;
    if matches!(options.order, opspilot_core::storage::ListOrder::KeyDescending) {
        entries.reverse();
    }
    let offset = options.offset.unwrap_or(0);
    let entries: Vec<_> = entries.into_iter().skip(offset).collect();
    match options.limit {
        Some(limit) => entries.into_iter().take(limit).collect(),
        None => entries,
    }
}
