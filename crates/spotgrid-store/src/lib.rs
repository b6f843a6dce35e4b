//! spotgrid-store — blob-store collaborator.
//!
//! Task outputs are uploaded to a shared repository by whichever worker
//! produced them. Content semantics (versioning, formats) live with the
//! remote store; this crate only defines the seam and a local-directory
//! implementation used for tests and single-host runs.

pub mod fs;
pub mod store;

pub use fs::FsStore;
pub use store::{ObjectStore, StoreError, StoreResult};
