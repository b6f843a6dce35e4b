//! Key-value backend seam for the status store.

use crate::error::StatusResult;

/// A string key-value store with prefix enumeration.
///
/// This is the collaborator surface the status store needs: unconditional
/// set, point get, prefix scan, and delete. It maps onto any KV store
/// with key enumeration; the in-tree implementations are an in-memory
/// map and an embedded redb database.
pub trait StatusBackend: Send + Sync {
    /// Unconditional overwrite. Concurrent writers to the same key
    /// race; last write wins.
    fn set(&self, key: &str, value: &str) -> StatusResult<()>;

    /// Point lookup. `None` when the key is absent.
    fn get(&self, key: &str) -> StatusResult<Option<String>>;

    /// All keys starting with `prefix`, in unspecified order.
    fn keys_with_prefix(&self, prefix: &str) -> StatusResult<Vec<String>>;

    /// Delete a key. Returns true if it existed.
    fn delete(&self, key: &str) -> StatusResult<bool>;
}
