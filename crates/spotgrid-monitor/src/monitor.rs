//! Status-store-driven job monitoring.

use std::time::Duration;

use tokio::sync::watch;
use tracing::{info, warn};

use spot_core::{JobId, StoredStatus, TaskStatus};
use spotgrid_status::StatusStore;

/// Per-status tallies for one job.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatusCounts {
    pub pending: usize,
    pub started: usize,
    pub retry: usize,
    pub failure: usize,
    pub success: usize,
    /// Status strings outside the fixed vocabulary, plus indexed tasks
    /// with no status entry. Counted, warned about, never fatal.
    pub unknown: usize,
}

impl StatusCounts {
    /// Total tasks scanned. Always equals the job's index size.
    pub fn total(&self) -> usize {
        self.pending + self.started + self.retry + self.failure + self.success + self.unknown
    }

    /// Whether work is still outstanding. Failures do not count:
    /// a job whose tasks all failed is done, deliberately.
    pub fn active(&self) -> bool {
        self.started > 0 || self.pending > 0
    }
}

/// Polls the status store and decides job completion.
#[derive(Clone)]
pub struct JobMonitor {
    status: StatusStore,
    poll_interval: Duration,
}

impl JobMonitor {
    pub fn new(status: StatusStore) -> Self {
        Self {
            status,
            poll_interval: Duration::from_secs(30),
        }
    }

    /// Override the poll interval (tests, impatient drivers).
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Tally the job's tasks across the status vocabulary.
    pub fn check_status(&self, job_id: &JobId) -> anyhow::Result<StatusCounts> {
        let mut counts = StatusCounts::default();
        for task_id in self.status.job_tasks(job_id)? {
            match self.status.get_status(&task_id)? {
                Some(StoredStatus::Known(TaskStatus::Pending)) => counts.pending += 1,
                Some(StoredStatus::Known(TaskStatus::Started)) => counts.started += 1,
                Some(StoredStatus::Known(TaskStatus::Retry)) => counts.retry += 1,
                Some(StoredStatus::Known(TaskStatus::Failure)) => counts.failure += 1,
                Some(StoredStatus::Known(TaskStatus::Success)) => counts.success += 1,
                Some(StoredStatus::Unrecognized(raw)) => {
                    warn!(%task_id, status = %raw, "unrecognized task status");
                    counts.unknown += 1;
                }
                None => {
                    warn!(%task_id, "indexed task has no status entry");
                    counts.unknown += 1;
                }
            }
        }
        Ok(counts)
    }

    /// Whether a second process should re-attach (monitor only) rather
    /// than re-dispatch.
    pub fn attachable(&self, job_id: &JobId) -> anyhow::Result<bool> {
        Ok(self.check_status(job_id)?.active())
    }

    /// Block until the job has no pending or started tasks, polling on
    /// a fixed interval. Returns the final tallies; failed tasks do not
    /// prolong monitoring. An early shutdown returns the latest counts.
    pub async fn monitor(
        &self,
        job_id: &JobId,
        mut shutdown: watch::Receiver<bool>,
    ) -> anyhow::Result<StatusCounts> {
        loop {
            let counts = self.check_status(job_id)?;
            info!(
                %job_id,
                pending = counts.pending,
                started = counts.started,
                retry = counts.retry,
                failure = counts.failure,
                success = counts.success,
                "job status"
            );
            if !counts.active() {
                info!(%job_id, total = counts.total(), "job complete");
                return Ok(counts);
            }
            tokio::select! {
                _ = tokio::time::sleep(self.poll_interval) => {}
                _ = shutdown.changed() => {
                    info!(%job_id, "monitor shutting down");
                    return Ok(counts);
                }
            }
        }
    }
}
