//! Worker-side task execution.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use spot_core::TaskStatus;
use spotgrid_queue::{Broker, Delivery, TaskOutcome};
use spotgrid_status::StatusStore;

use crate::error::TaskResult;
use crate::registry::FunctionRegistry;

/// Bounded-retry parameters for execution failures.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Retries after the first execution; 3 means up to 4 executions.
    pub max_retries: u32,
    /// Fixed delay before a redelivery.
    pub retry_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            retry_delay: Duration::from_secs(30),
        }
    }
}

/// Pulls deliveries, invokes registered functions, and records status.
///
/// One task at a time: workers are configured serial so one GPU-bound
/// task runs per node. Acknowledgment is late — result and status are
/// written before the ack, so a worker crash mid-execution redelivers
/// the task instead of losing it. Functions must therefore tolerate
/// duplicate execution.
#[derive(Clone)]
pub struct TaskExecutor {
    registry: FunctionRegistry,
    broker: Arc<dyn Broker>,
    status: StatusStore,
    policy: RetryPolicy,
    /// Sleep between polls when the queue is drained.
    idle_poll: Duration,
}

impl TaskExecutor {
    pub fn new(
        registry: FunctionRegistry,
        broker: Arc<dyn Broker>,
        status: StatusStore,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            registry,
            broker,
            status,
            policy,
            idle_poll: Duration::from_secs(1),
        }
    }

    /// Reserve and execute at most one delivery. Returns false when the
    /// queue had nothing ready.
    pub async fn run_once(&self) -> TaskResult<bool> {
        let Some(delivery) = self.broker.reserve().await? else {
            return Ok(false);
        };
        self.execute(delivery).await?;
        Ok(true)
    }

    async fn execute(&self, delivery: Delivery) -> TaskResult<()> {
        let task_id = delivery.task_id.clone();
        self.status.set_status(&task_id, TaskStatus::Started)?;
        debug!(%task_id, func = %delivery.func_name, attempt = delivery.attempt, "task started");

        let func = match self.registry.resolve(&delivery.func_name) {
            Ok(func) => func,
            Err(e) => {
                // Retrying cannot fix a missing registration; fail now.
                error!(%task_id, func = %delivery.func_name, "function not registered");
                self.broker
                    .store_result(&task_id, TaskOutcome::Err { message: e.to_string() })
                    .await?;
                self.status.set_status(&task_id, TaskStatus::Failure)?;
                self.broker.ack(&task_id).await?;
                return Ok(());
            }
        };

        let outcome = serde_json::from_str::<serde_json::Value>(&delivery.payload)
            .map_err(anyhow::Error::from)
            .and_then(|args| func(args));

        match outcome {
            Ok(value) => {
                self.broker
                    .store_result(&task_id, TaskOutcome::Ok { value })
                    .await?;
                self.status.set_status(&task_id, TaskStatus::Success)?;
                // Ack last: a crash before this point redelivers.
                self.broker.ack(&task_id).await?;
                debug!(%task_id, "task succeeded");
            }
            Err(e) if delivery.attempt <= self.policy.max_retries => {
                warn!(
                    %task_id,
                    attempt = delivery.attempt,
                    max_retries = self.policy.max_retries,
                    error = %e,
                    "task failed, scheduling retry"
                );
                self.status.set_status(&task_id, TaskStatus::Retry)?;
                self.broker
                    .retry_later(&task_id, self.policy.retry_delay)
                    .await?;
            }
            Err(e) => {
                error!(%task_id, attempt = delivery.attempt, error = %e, "task failed, retries exhausted");
                self.broker
                    .store_result(&task_id, TaskOutcome::Err { message: e.to_string() })
                    .await?;
                self.status.set_status(&task_id, TaskStatus::Failure)?;
                self.broker.ack(&task_id).await?;
            }
        }
        Ok(())
    }

    /// Worker loop: execute until the shutdown signal flips.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!(functions = ?self.registry.names(), "worker started");
        loop {
            match self.run_once().await {
                Ok(true) => {
                    // Something ran; check for more work immediately.
                    if *shutdown.borrow() {
                        break;
                    }
                }
                Ok(false) => {
                    tokio::select! {
                        _ = tokio::time::sleep(self.idle_poll) => {}
                        _ = shutdown.changed() => {
                            info!("worker shutting down");
                            break;
                        }
                    }
                }
                Err(e) => {
                    error!(error = %e, "worker iteration failed");
                    tokio::time::sleep(self.idle_poll).await;
                }
            }
        }
    }
}
