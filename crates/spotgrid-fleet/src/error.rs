//! Fleet error types.

use thiserror::Error;

use spotgrid_market::MarketError;

/// Result type alias for fleet operations.
pub type FleetResult<T> = Result<T, FleetError>;

/// Errors that can occur during fleet operations.
#[derive(Debug, Error)]
pub enum FleetError {
    /// Offer search kept failing through every bounded retry.
    #[error("offer search failed after {attempts} attempts: {last}")]
    SearchExhausted { attempts: u32, last: MarketError },
}
