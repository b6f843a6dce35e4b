//! The status store proper: key derivation, status reads/writes, the
//! job→task index, and purge.

use std::sync::Arc;

use tracing::debug;

use spot_core::{JobId, StoredStatus, TaskId, TaskStatus};

use crate::backend::StatusBackend;
use crate::error::{StatusError, StatusResult};

/// Key prefix for per-task status entries.
pub const TASK_STATUS_PREFIX: &str = "task_status:";

/// Key prefix for per-job task indexes.
pub const JOB_TASKS_PREFIX: &str = "job_tasks:";

/// Shared map from task id to last-known lifecycle status.
///
/// Cloneable handle over an `Arc`'d backend; all clones observe the
/// same entries.
#[derive(Clone)]
pub struct StatusStore {
    backend: Arc<dyn StatusBackend>,
}

impl StatusStore {
    pub fn new(backend: Arc<dyn StatusBackend>) -> Self {
        Self { backend }
    }

    /// Derive the status key for a task id.
    pub fn task_status_key(task_id: &str) -> String {
        format!("{TASK_STATUS_PREFIX}{task_id}")
    }

    fn job_tasks_key(job_id: &str) -> String {
        format!("{JOB_TASKS_PREFIX}{job_id}")
    }

    /// Record a task's status. Unconditional overwrite, no
    /// compare-and-swap: a stale retry attempt can overwrite a terminal
    /// status, and the last writer wins.
    pub fn set_status(&self, task_id: &TaskId, status: TaskStatus) -> StatusResult<()> {
        self.backend
            .set(&Self::task_status_key(task_id), status.as_str())
    }

    /// Read back a task's status. Unrecognized stored strings are
    /// surfaced verbatim, never rejected.
    pub fn get_status(&self, task_id: &TaskId) -> StatusResult<Option<StoredStatus>> {
        Ok(self
            .backend
            .get(&Self::task_status_key(task_id))?
            .map(|raw| StoredStatus::from_raw(&raw)))
    }

    /// Add a task to a job's index.
    ///
    /// The index is a JSON array of task ids under `job_tasks:{job_id}`.
    /// Read-modify-write without locking: the dispatcher is the only
    /// writer for a given job.
    pub fn add_job_task(&self, job_id: &JobId, task_id: &TaskId) -> StatusResult<()> {
        let key = Self::job_tasks_key(job_id);
        let mut ids: Vec<String> = match self.backend.get(&key)? {
            Some(raw) => serde_json::from_str(&raw).map_err(|e| {
                StatusError::Deserialize(format!("job index {key}: {e}"))
            })?,
            None => Vec::new(),
        };
        if !ids.iter().any(|id| id == task_id) {
            ids.push(task_id.clone());
        }
        let raw = serde_json::to_string(&ids).map_err(|e| StatusError::Serialize(e.to_string()))?;
        self.backend.set(&key, &raw)
    }

    /// All task ids recorded for a job. Empty for unknown jobs.
    pub fn job_tasks(&self, job_id: &JobId) -> StatusResult<Vec<TaskId>> {
        let key = Self::job_tasks_key(job_id);
        match self.backend.get(&key)? {
            Some(raw) => serde_json::from_str(&raw)
                .map_err(|e| StatusError::Deserialize(format!("job index {key}: {e}"))),
            None => Ok(Vec::new()),
        }
    }

    /// Job ids that currently have an index entry.
    pub fn list_jobs(&self) -> StatusResult<Vec<JobId>> {
        Ok(self
            .backend
            .keys_with_prefix(JOB_TASKS_PREFIX)?
            .into_iter()
            .map(|k| k[JOB_TASKS_PREFIX.len()..].to_string())
            .collect())
    }

    /// Enumerate raw keys by prefix. Retained for purge and debugging;
    /// job membership goes through the explicit index instead.
    pub fn scan_prefix(&self, prefix: &str) -> StatusResult<Vec<String>> {
        self.backend.keys_with_prefix(prefix)
    }

    /// Delete all keys under the given prefixes. Returns the number of
    /// keys removed. Used for full-reset cleanup between runs.
    pub fn purge(&self, prefixes: &[&str]) -> StatusResult<usize> {
        let mut removed = 0;
        for prefix in prefixes {
            for key in self.backend.keys_with_prefix(prefix)? {
                if self.backend.delete(&key)? {
                    removed += 1;
                }
            }
        }
        debug!(removed, "status store purged");
        Ok(removed)
    }

    /// Purge everything this store manages: statuses and job indexes.
    pub fn purge_all(&self) -> StatusResult<usize> {
        self.purge(&[TASK_STATUS_PREFIX, JOB_TASKS_PREFIX])
    }

    /// Direct backend access, for collaborators that share the same
    /// database (the broker keeps its queue state alongside).
    pub fn backend(&self) -> Arc<dyn StatusBackend> {
        self.backend.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryBackend;

    fn store() -> StatusStore {
        StatusStore::new(Arc::new(MemoryBackend::new()))
    }

    #[test]
    fn status_write_and_read() {
        let store = store();
        let id = "task-1".to_string();

        store.set_status(&id, TaskStatus::Pending).unwrap();
        assert_eq!(
            store.get_status(&id).unwrap(),
            Some(StoredStatus::Known(TaskStatus::Pending))
        );

        store.set_status(&id, TaskStatus::Success).unwrap();
        assert_eq!(
            store.get_status(&id).unwrap(),
            Some(StoredStatus::Known(TaskStatus::Success))
        );
    }

    #[test]
    fn absent_status_reads_none() {
        assert_eq!(store().get_status(&"nope".to_string()).unwrap(), None);
    }

    #[test]
    fn stale_write_overwrites_terminal_status() {
        // Last write wins, even when it regresses a terminal status.
        let store = store();
        let id = "task-1".to_string();
        store.set_status(&id, TaskStatus::Success).unwrap();
        store.set_status(&id, TaskStatus::Retry).unwrap();
        assert_eq!(
            store.get_status(&id).unwrap(),
            Some(StoredStatus::Known(TaskStatus::Retry))
        );
    }

    #[test]
    fn unrecognized_stored_string_is_surfaced() {
        let store = store();
        store
            .backend()
            .set("task_status:legacy", "COMPLETED")
            .unwrap();
        assert_eq!(
            store.get_status(&"legacy".to_string()).unwrap(),
            Some(StoredStatus::Unrecognized("COMPLETED".to_string()))
        );
    }

    #[test]
    fn job_index_accumulates_without_duplicates() {
        let store = store();
        let job = "render".to_string();
        store.add_job_task(&job, &"t1".to_string()).unwrap();
        store.add_job_task(&job, &"t2".to_string()).unwrap();
        store.add_job_task(&job, &"t1".to_string()).unwrap();

        assert_eq!(store.job_tasks(&job).unwrap(), vec!["t1", "t2"]);
        assert_eq!(store.list_jobs().unwrap(), vec!["render"]);
    }

    #[test]
    fn unknown_job_has_no_tasks() {
        assert!(store().job_tasks(&"ghost".to_string()).unwrap().is_empty());
    }

    #[test]
    fn purge_removes_only_matching_prefixes() {
        let store = store();
        store.set_status(&"t1".to_string(), TaskStatus::Success).unwrap();
        store.add_job_task(&"j".to_string(), &"t1".to_string()).unwrap();
        store.backend().set("unrelated", "keep").unwrap();

        let removed = store.purge_all().unwrap();
        assert_eq!(removed, 2);
        assert!(store.get_status(&"t1".to_string()).unwrap().is_none());
        assert!(store.job_tasks(&"j".to_string()).unwrap().is_empty());
        assert_eq!(
            store.backend().get("unrelated").unwrap().as_deref(),
            Some("keep")
        );
    }

    #[test]
    fn scan_prefix_matches_status_keys() {
        let store = store();
        store.set_status(&"a".to_string(), TaskStatus::Pending).unwrap();
        store.set_status(&"b".to_string(), TaskStatus::Started).unwrap();
        let keys = store.scan_prefix(TASK_STATUS_PREFIX).unwrap();
        assert_eq!(keys.len(), 2);
    }
}
