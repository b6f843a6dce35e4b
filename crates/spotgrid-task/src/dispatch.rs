//! Driver-side task dispatch.

use std::sync::Arc;

use tracing::debug;

use spot_core::{JobId, TaskStatus};
use spotgrid_queue::{Broker, TaskHandle};
use spotgrid_status::StatusStore;

use crate::error::TaskResult;

/// Serializes arguments, submits invoke-by-name work to the queue, and
/// records the task under its job.
#[derive(Clone)]
pub struct TaskDispatcher {
    broker: Arc<dyn Broker>,
    status: StatusStore,
}

impl TaskDispatcher {
    pub fn new(broker: Arc<dyn Broker>, status: StatusStore) -> Self {
        Self { broker, status }
    }

    /// Dispatch one unit of work.
    ///
    /// The argument map is JSON-serialized; the queue assigns the task
    /// id. The task starts `Pending` and is added to the job's index so
    /// monitors can enumerate it without holding the returned handle.
    pub async fn dispatch(
        &self,
        job_id: &JobId,
        func_name: &str,
        args: &serde_json::Value,
    ) -> TaskResult<TaskHandle> {
        let payload = serde_json::to_string(args)?;
        let task_id = self.broker.submit(func_name, &payload).await?;

        self.status.set_status(&task_id, TaskStatus::Pending)?;
        self.status.add_job_task(job_id, &task_id)?;

        debug!(%task_id, %job_id, func = func_name, "task dispatched");
        Ok(TaskHandle::new(task_id, self.broker.clone()))
    }
}
