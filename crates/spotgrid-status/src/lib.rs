//! spotgrid-status — shared task status store.
//!
//! Workers write per-task lifecycle status here; monitors read it back,
//! possibly from a different process than the one that dispatched the
//! job. The store is a thin layer over a string key-value backend with
//! prefix enumeration: an in-memory backend for tests and local runs,
//! and a [redb](https://docs.rs/redb) backend whose file is shared
//! across driver runs so a second process can re-attach.
//!
//! Status entries are overwritten in place (last write wins) and only
//! removed by explicit purge, never by task completion.

pub mod backend;
pub mod error;
pub mod memory;
pub mod redb_backend;
pub mod store;

pub use backend::StatusBackend;
pub use error::{StatusError, StatusResult};
pub use memory::MemoryBackend;
pub use redb_backend::RedbBackend;
pub use store::StatusStore;
