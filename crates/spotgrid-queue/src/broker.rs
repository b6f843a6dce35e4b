//! The broker seam.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use spot_core::TaskId;

use crate::error::QueueResult;

/// One unit of work handed to a worker.
///
/// `attempt` is 1-based and counts every execution of this task,
/// including redeliveries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub task_id: TaskId,
    pub func_name: String,
    /// Serialized argument map, produced by the dispatcher.
    pub payload: String,
    pub attempt: u32,
}

/// Terminal outcome of a task, stored by the worker that finished it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum TaskOutcome {
    Ok { value: serde_json::Value },
    Err { message: String },
}

/// Reliable-enqueue, at-least-once task queue.
///
/// Deliveries are acknowledged only after execution completes: a
/// reservation that is never acked (worker crash) is redelivered, so
/// registered functions must tolerate duplicate execution.
#[async_trait]
pub trait Broker: Send + Sync {
    /// Enqueue one unit of work. Returns the queue-assigned opaque id.
    async fn submit(&self, func_name: &str, payload: &str) -> QueueResult<TaskId>;

    /// Reserve the next ready delivery, if any. Does not block; workers
    /// sleep and re-check when the queue is drained.
    async fn reserve(&self) -> QueueResult<Option<Delivery>>;

    /// Acknowledge a completed delivery. Call only after the task's
    /// result and status have been recorded.
    async fn ack(&self, task_id: &TaskId) -> QueueResult<()>;

    /// Return a reserved delivery to the queue, to be redelivered no
    /// sooner than `delay` from now. The next delivery's attempt count
    /// is incremented.
    async fn retry_later(&self, task_id: &TaskId, delay: Duration) -> QueueResult<()>;

    /// Record the terminal outcome for a task.
    async fn store_result(&self, task_id: &TaskId, outcome: TaskOutcome) -> QueueResult<()>;

    /// Fetch a task's terminal outcome, if it finished.
    async fn fetch_result(&self, task_id: &TaskId) -> QueueResult<Option<TaskOutcome>>;

    /// Drop all queued work, reservations, and results.
    async fn purge(&self) -> QueueResult<usize>;
}
