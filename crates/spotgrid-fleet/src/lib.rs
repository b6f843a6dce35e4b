//! spotgrid-fleet — rents and terminates marketplace nodes.
//!
//! The fleet manager walks price-sorted offers and bids until it
//! reaches the requested node count or the marketplace runs dry.
//! Rejected offers are skipped; unexpected provisioning failures abort
//! the current offer batch and trigger a fresh search. Every node the
//! manager rents goes into its roster, and `terminate_all` destroys the
//! roster on every exit path — a successfully created instance receives
//! exactly one destroy call.

pub mod error;
pub mod manager;

pub use error::{FleetError, FleetResult};
pub use manager::{FleetManager, RentPolicy, RentRequest};
