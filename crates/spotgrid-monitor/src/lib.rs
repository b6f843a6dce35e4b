//! spotgrid-monitor — watches a job until it finishes.
//!
//! Two paths to "done": polling the shared status store (works from any
//! process, including one that re-attaches to a running job) and
//! polling in-process task handles (only the dispatching run has
//! those). A job is done when no task is pending or started; failed
//! tasks do not keep a job alive.

pub mod monitor;
pub mod progress;

pub use monitor::{JobMonitor, StatusCounts};
pub use progress::wait_for_handles;
