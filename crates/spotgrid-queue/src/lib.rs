//! spotgrid-queue — the task queue collaborator.
//!
//! The queue is an opaque reliable-enqueue, at-least-once delivery
//! primitive behind the [`Broker`] trait: the dispatcher submits units
//! of work by function name with a serialized payload, workers reserve
//! deliveries and acknowledge them only after execution completes
//! (late ack), and results flow back through the broker's result
//! storage so a [`TaskHandle`] can be polled from the driver side.
//!
//! The in-tree [`MemoryBroker`] implements the trait for tests and
//! single-host runs. The wire protocol of a networked broker is out of
//! scope; anything that can provide these operations can be plugged in.

pub mod broker;
pub mod error;
pub mod handle;
pub mod memory;

pub use broker::{Broker, Delivery, TaskOutcome};
pub use error::{QueueError, QueueResult};
pub use handle::TaskHandle;
pub use memory::MemoryBroker;
