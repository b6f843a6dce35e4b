//! redb-backed status backend.
//!
//! One table of string keys and string values. The database file lives
//! in the configured data directory; a driver that restarts (or a
//! second monitoring process) opens the same file and sees the job's
//! current status entries.

use std::path::Path;
use std::sync::Arc;

use redb::{Database, ReadableDatabase, ReadableTable, TableDefinition};
use tracing::debug;

use crate::backend::StatusBackend;
use crate::error::{StatusError, StatusResult};

/// Status entries keyed by derived keys (`task_status:{id}`, `job_tasks:{id}`).
const STATUS: TableDefinition<&str, &str> = TableDefinition::new("status");

/// Convert any `Display` error into a `StatusError` variant via a closure factory.
macro_rules! map_err {
    ($variant:ident) => {
        |e| StatusError::$variant(e.to_string())
    };
}

/// Thread-safe persistent backend backed by redb.
#[derive(Clone)]
pub struct RedbBackend {
    db: Arc<Database>,
}

impl RedbBackend {
    /// Open (or create) the status database at the given path.
    pub fn open(path: &Path) -> StatusResult<Self> {
        let db = Database::create(path).map_err(map_err!(Open))?;
        let backend = Self { db: Arc::new(db) };
        backend.ensure_table()?;
        debug!(?path, "status store opened");
        Ok(backend)
    }

    /// Create an ephemeral in-memory database (for testing).
    pub fn open_in_memory() -> StatusResult<Self> {
        let backend_impl = redb::backends::InMemoryBackend::new();
        let db = Database::builder()
            .create_with_backend(backend_impl)
            .map_err(map_err!(Open))?;
        let backend = Self { db: Arc::new(db) };
        backend.ensure_table()?;
        Ok(backend)
    }

    fn ensure_table(&self) -> StatusResult<()> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        // Opening a table in a write transaction creates it if absent.
        txn.open_table(STATUS).map_err(map_err!(Table))?;
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }
}

impl StatusBackend for RedbBackend {
    fn set(&self, key: &str, value: &str) -> StatusResult<()> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut table = txn.open_table(STATUS).map_err(map_err!(Table))?;
            table.insert(key, value).map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    fn get(&self, key: &str) -> StatusResult<Option<String>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(STATUS).map_err(map_err!(Table))?;
        match table.get(key).map_err(map_err!(Read))? {
            Some(guard) => Ok(Some(guard.value().to_string())),
            None => Ok(None),
        }
    }

    fn keys_with_prefix(&self, prefix: &str) -> StatusResult<Vec<String>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(STATUS).map_err(map_err!(Table))?;
        let mut keys = Vec::new();
        for entry in table.range(prefix..).map_err(map_err!(Read))? {
            let (key, _) = entry.map_err(map_err!(Read))?;
            if !key.value().starts_with(prefix) {
                break;
            }
            keys.push(key.value().to_string());
        }
        Ok(keys)
    }

    fn delete(&self, key: &str) -> StatusResult<bool> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let existed;
        {
            let mut table = txn.open_table(STATUS).map_err(map_err!(Table))?;
            existed = table.remove(key).map_err(map_err!(Write))?.is_some();
        }
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(existed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_get_roundtrip() {
        let backend = RedbBackend::open_in_memory().unwrap();
        backend.set("task_status:abc", "started").unwrap();
        assert_eq!(
            backend.get("task_status:abc").unwrap().as_deref(),
            Some("started")
        );
        assert!(backend.get("task_status:missing").unwrap().is_none());
    }

    #[test]
    fn prefix_scan_stops_at_prefix_boundary() {
        let backend = RedbBackend::open_in_memory().unwrap();
        backend.set("job_tasks:render", "[]").unwrap();
        backend.set("task_status:a", "pending").unwrap();
        backend.set("task_status:b", "success").unwrap();
        backend.set("task_statuz", "noise").unwrap();

        let keys = backend.keys_with_prefix("task_status:").unwrap();
        assert_eq!(keys, vec!["task_status:a", "task_status:b"]);
    }

    #[test]
    fn persistence_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("status.redb");

        {
            let backend = RedbBackend::open(&db_path).unwrap();
            backend.set("task_status:abc", "success").unwrap();
        }

        // Reopen the same database file, as a re-attaching process would.
        let backend = RedbBackend::open(&db_path).unwrap();
        assert_eq!(
            backend.get("task_status:abc").unwrap().as_deref(),
            Some("success")
        );
    }
}
