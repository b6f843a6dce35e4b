//! spotgrid-market — typed client for the compute marketplace.
//!
//! Three operations against the marketplace REST surface: search
//! rentable offers under a price ceiling, bid on an offer to create an
//! instance, and destroy an instance. An offer that is gone by the time
//! we bid is an expected condition (`RejectedOffer`), not a failure;
//! retry policy lives with the caller (the fleet manager).

pub mod client;
pub mod error;

pub use client::{CreateRequest, CreatedInstance, MarketClient, Marketplace};
pub use error::{MarketError, MarketResult};
