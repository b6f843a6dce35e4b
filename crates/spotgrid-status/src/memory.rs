//! In-memory status backend for tests and single-process runs.

use std::collections::BTreeMap;
use std::sync::Mutex;

use crate::backend::StatusBackend;
use crate::error::{StatusError, StatusResult};

/// Mutex-guarded map backend. Cheap to create, nothing persists.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    entries: Mutex<BTreeMap<String, String>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> StatusResult<std::sync::MutexGuard<'_, BTreeMap<String, String>>> {
        self.entries
            .lock()
            .map_err(|e| StatusError::Write(e.to_string()))
    }
}

impl StatusBackend for MemoryBackend {
    fn set(&self, key: &str, value: &str) -> StatusResult<()> {
        self.lock()?.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn get(&self, key: &str) -> StatusResult<Option<String>> {
        Ok(self.lock()?.get(key).cloned())
    }

    fn keys_with_prefix(&self, prefix: &str) -> StatusResult<Vec<String>> {
        Ok(self
            .lock()?
            .range(prefix.to_string()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(k, _)| k.clone())
            .collect())
    }

    fn delete(&self, key: &str) -> StatusResult<bool> {
        Ok(self.lock()?.remove(key).is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_get_delete() {
        let backend = MemoryBackend::new();
        backend.set("a", "1").unwrap();
        assert_eq!(backend.get("a").unwrap().as_deref(), Some("1"));
        assert!(backend.delete("a").unwrap());
        assert!(!backend.delete("a").unwrap());
        assert!(backend.get("a").unwrap().is_none());
    }

    #[test]
    fn overwrite_is_last_write_wins() {
        let backend = MemoryBackend::new();
        backend.set("k", "first").unwrap();
        backend.set("k", "second").unwrap();
        assert_eq!(backend.get("k").unwrap().as_deref(), Some("second"));
    }

    #[test]
    fn prefix_scan_is_bounded() {
        let backend = MemoryBackend::new();
        backend.set("task_status:1", "pending").unwrap();
        backend.set("task_status:2", "started").unwrap();
        backend.set("job_tasks:render", "[]").unwrap();

        let keys = backend.keys_with_prefix("task_status:").unwrap();
        assert_eq!(keys.len(), 2);
        assert!(keys.iter().all(|k| k.starts_with("task_status:")));
    }
}
