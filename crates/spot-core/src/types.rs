//! Domain types shared across the spotgrid crates.
//!
//! These types cross crate boundaries: marketplace offers, rented node
//! handles, and the task status vocabulary written by workers and read
//! by monitors. All of them are JSON-serializable.

use serde::{Deserialize, Serialize};

/// Offer identifier assigned by the marketplace.
pub type OfferId = u64;

/// Instance identifier assigned by the marketplace on a successful bid.
pub type InstanceId = u64;

/// Opaque task identifier assigned by the queue at submission.
pub type TaskId = String;

/// Caller-supplied identifier grouping the tasks of one job.
pub type JobId = String;

// ── Marketplace ────────────────────────────────────────────────────

/// A rentable compute unit advertised by the marketplace.
///
/// Offers are fetched fresh on every search and never persisted.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Offer {
    pub id: OfferId,
    /// Price in dollars per hour.
    pub price_per_hour: f64,
    /// GPU memory in gigabytes.
    pub gpu_ram: f64,
    /// Advertised compute throughput, used as a sort tiebreaker.
    pub total_flops: f64,
}

/// A provisioned node, bound to the offer it was created from.
///
/// Owned exclusively by the fleet manager that rented it until
/// destroyed. Every successfully created node must receive exactly one
/// destroy call, even on error paths.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NodeHandle {
    pub offer_id: OfferId,
    pub instance_id: InstanceId,
}

// ── Task status ────────────────────────────────────────────────────

/// Lifecycle status of a task, as recorded in the status store.
///
/// `Success` is the single canonical terminal-success label; workers
/// never write any other success spelling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Started,
    Retry,
    Failure,
    Success,
}

impl TaskStatus {
    /// The canonical string form stored in the status store.
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Started => "started",
            TaskStatus::Retry => "retry",
            TaskStatus::Failure => "failure",
            TaskStatus::Success => "success",
        }
    }

    /// Parse a stored string. Returns `None` for unrecognized values,
    /// which callers tally separately rather than treating as errors.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(TaskStatus::Pending),
            "started" => Some(TaskStatus::Started),
            "retry" => Some(TaskStatus::Retry),
            "failure" => Some(TaskStatus::Failure),
            "success" => Some(TaskStatus::Success),
            _ => None,
        }
    }

    /// Whether this status is terminal for the task.
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskStatus::Failure | TaskStatus::Success)
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A status value read back from the store.
///
/// The store never rejects what a worker wrote; strings outside the
/// fixed vocabulary are surfaced verbatim for the monitor to count.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoredStatus {
    Known(TaskStatus),
    Unrecognized(String),
}

impl StoredStatus {
    pub fn from_raw(raw: &str) -> Self {
        match TaskStatus::parse(raw) {
            Some(status) => StoredStatus::Known(status),
            None => StoredStatus::Unrecognized(raw.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_round_trips_through_canonical_strings() {
        for status in [
            TaskStatus::Pending,
            TaskStatus::Started,
            TaskStatus::Retry,
            TaskStatus::Failure,
            TaskStatus::Success,
        ] {
            assert_eq!(TaskStatus::parse(status.as_str()), Some(status));
        }
    }

    #[test]
    fn unknown_status_string_parses_to_none() {
        assert_eq!(TaskStatus::parse("COMPLETED"), None);
        assert_eq!(TaskStatus::parse(""), None);
    }

    #[test]
    fn stored_status_preserves_unrecognized_values() {
        assert_eq!(
            StoredStatus::from_raw("success"),
            StoredStatus::Known(TaskStatus::Success)
        );
        assert_eq!(
            StoredStatus::from_raw("completed"),
            StoredStatus::Unrecognized("completed".to_string())
        );
    }

    #[test]
    fn terminal_statuses() {
        assert!(TaskStatus::Success.is_terminal());
        assert!(TaskStatus::Failure.is_terminal());
        assert!(!TaskStatus::Pending.is_terminal());
        assert!(!TaskStatus::Started.is_terminal());
        assert!(!TaskStatus::Retry.is_terminal());
    }

    #[test]
    fn offer_deserializes_from_json() {
        let offer: Offer = serde_json::from_str(
            r#"{"id": 42, "price_per_hour": 0.12, "gpu_ram": 24.0, "total_flops": 35.2}"#,
        )
        .unwrap();
        assert_eq!(offer.id, 42);
        assert_eq!(offer.price_per_hour, 0.12);
    }
}
