//! In-process broker implementation.
//!
//! FIFO among ready tasks, with scheduled redelivery for retries.
//! Reservation moves a task in-flight; only `ack` removes it for good,
//! so an unacked task survives (in-flight state is per-process — a
//! crashed process loses its queue, which is why production runs point
//! workers at a shared broker behind the same trait).

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;
use tracing::debug;
use uuid::Uuid;

use spot_core::TaskId;

use crate::broker::{Broker, Delivery, TaskOutcome};
use crate::error::{QueueError, QueueResult};

#[derive(Debug, Clone)]
struct QueuedTask {
    task_id: TaskId,
    func_name: String,
    payload: String,
    attempt: u32,
}

#[derive(Default)]
struct Inner {
    ready: VecDeque<QueuedTask>,
    /// Tasks scheduled for redelivery, with their due time.
    scheduled: Vec<(Instant, QueuedTask)>,
    inflight: HashMap<TaskId, QueuedTask>,
    results: HashMap<TaskId, TaskOutcome>,
}

impl Inner {
    /// Move due scheduled tasks to the ready queue, preserving order.
    fn promote_due(&mut self, now: Instant) {
        let mut remaining = Vec::with_capacity(self.scheduled.len());
        for (due, task) in self.scheduled.drain(..) {
            if due <= now {
                self.ready.push_back(task);
            } else {
                remaining.push((due, task));
            }
        }
        self.scheduled = remaining;
    }
}

/// In-memory broker.
#[derive(Default)]
pub struct MemoryBroker {
    inner: Mutex<Inner>,
}

impl MemoryBroker {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> QueueResult<std::sync::MutexGuard<'_, Inner>> {
        self.inner.lock().map_err(|e| QueueError::Broker(e.to_string()))
    }

    /// Tasks currently queued or scheduled (not in flight, not done).
    pub fn backlog(&self) -> usize {
        self.inner
            .lock()
            .map(|inner| inner.ready.len() + inner.scheduled.len())
            .unwrap_or(0)
    }
}

#[async_trait]
impl Broker for MemoryBroker {
    async fn submit(&self, func_name: &str, payload: &str) -> QueueResult<TaskId> {
        let task_id = Uuid::new_v4().to_string();
        let task = QueuedTask {
            task_id: task_id.clone(),
            func_name: func_name.to_string(),
            payload: payload.to_string(),
            attempt: 0,
        };
        self.lock()?.ready.push_back(task);
        debug!(%task_id, func = func_name, "task submitted");
        Ok(task_id)
    }

    async fn reserve(&self) -> QueueResult<Option<Delivery>> {
        let mut inner = self.lock()?;
        inner.promote_due(Instant::now());
        let Some(mut task) = inner.ready.pop_front() else {
            return Ok(None);
        };
        task.attempt += 1;
        let delivery = Delivery {
            task_id: task.task_id.clone(),
            func_name: task.func_name.clone(),
            payload: task.payload.clone(),
            attempt: task.attempt,
        };
        inner.inflight.insert(task.task_id.clone(), task);
        Ok(Some(delivery))
    }

    async fn ack(&self, task_id: &TaskId) -> QueueResult<()> {
        let mut inner = self.lock()?;
        if inner.inflight.remove(task_id).is_none() {
            return Err(QueueError::UnknownDelivery(task_id.clone()));
        }
        Ok(())
    }

    async fn retry_later(&self, task_id: &TaskId, delay: Duration) -> QueueResult<()> {
        let mut inner = self.lock()?;
        let Some(task) = inner.inflight.remove(task_id) else {
            return Err(QueueError::UnknownDelivery(task_id.clone()));
        };
        let due = Instant::now() + delay;
        inner.scheduled.push((due, task));
        Ok(())
    }

    async fn store_result(&self, task_id: &TaskId, outcome: TaskOutcome) -> QueueResult<()> {
        self.lock()?.results.insert(task_id.clone(), outcome);
        Ok(())
    }

    async fn fetch_result(&self, task_id: &TaskId) -> QueueResult<Option<TaskOutcome>> {
        Ok(self.lock()?.results.get(task_id).cloned())
    }

    async fn purge(&self) -> QueueResult<usize> {
        let mut inner = self.lock()?;
        let dropped = inner.ready.len()
            + inner.scheduled.len()
            + inner.inflight.len()
            + inner.results.len();
        *inner = Inner::default();
        debug!(dropped, "broker purged");
        Ok(dropped)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn submit_then_reserve_fifo() {
        let broker = MemoryBroker::new();
        let first = broker.submit("f", "{}").await.unwrap();
        let second = broker.submit("g", "{}").await.unwrap();

        let d1 = broker.reserve().await.unwrap().unwrap();
        let d2 = broker.reserve().await.unwrap().unwrap();
        assert_eq!(d1.task_id, first);
        assert_eq!(d2.task_id, second);
        assert_eq!(d1.attempt, 1);
        assert!(broker.reserve().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn ack_removes_inflight() {
        let broker = MemoryBroker::new();
        let id = broker.submit("f", "{}").await.unwrap();
        let delivery = broker.reserve().await.unwrap().unwrap();
        broker.ack(&delivery.task_id).await.unwrap();

        // Double-ack is an error.
        assert!(matches!(
            broker.ack(&id).await,
            Err(QueueError::UnknownDelivery(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn retry_later_redelivers_after_delay() {
        let broker = MemoryBroker::new();
        broker.submit("f", "{}").await.unwrap();

        let delivery = broker.reserve().await.unwrap().unwrap();
        broker
            .retry_later(&delivery.task_id, Duration::from_secs(30))
            .await
            .unwrap();

        // Not due yet.
        assert!(broker.reserve().await.unwrap().is_none());

        tokio::time::advance(Duration::from_secs(31)).await;
        let redelivered = broker.reserve().await.unwrap().unwrap();
        assert_eq!(redelivered.task_id, delivery.task_id);
        assert_eq!(redelivered.attempt, 2);
    }

    #[tokio::test]
    async fn results_round_trip() {
        let broker = MemoryBroker::new();
        let id = broker.submit("f", "{}").await.unwrap();
        assert!(broker.fetch_result(&id).await.unwrap().is_none());

        broker
            .store_result(&id, TaskOutcome::Ok { value: serde_json::json!(30) })
            .await
            .unwrap();
        assert_eq!(
            broker.fetch_result(&id).await.unwrap(),
            Some(TaskOutcome::Ok { value: serde_json::json!(30) })
        );
    }

    #[tokio::test]
    async fn purge_clears_everything() {
        let broker = MemoryBroker::new();
        broker.submit("f", "{}").await.unwrap();
        let id = broker.submit("g", "{}").await.unwrap();
        broker.reserve().await.unwrap();
        broker
            .store_result(&id, TaskOutcome::Err { message: "boom".into() })
            .await
            .unwrap();

        let dropped = broker.purge().await.unwrap();
        assert!(dropped >= 3);
        assert!(broker.reserve().await.unwrap().is_none());
        assert!(broker.fetch_result(&id).await.unwrap().is_none());
    }
}
