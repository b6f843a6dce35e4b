//! Marketplace error taxonomy.

use thiserror::Error;

/// Result type alias for marketplace operations.
pub type MarketResult<T> = Result<T, MarketError>;

/// Errors that can occur talking to the marketplace.
#[derive(Debug, Error)]
pub enum MarketError {
    /// Transport failure or non-2xx search response. Transient; the
    /// caller retries with a bounded attempt count.
    #[error("marketplace request failed: {0}")]
    Network(String),

    /// The offer is no longer available (marketplace reported 400/404
    /// on the bid). Expected — skip to the next offer.
    #[error("offer {offer_id} rejected: {reason}")]
    RejectedOffer { offer_id: u64, reason: String },

    /// Unexpected creation failure. Aborts the current offer batch.
    #[error("instance provisioning failed: {0}")]
    Provisioning(String),

    #[error("unexpected response body: {0}")]
    Decode(String),
}

impl MarketError {
    pub fn is_rejected_offer(&self) -> bool {
        matches!(self, MarketError::RejectedOffer { .. })
    }
}
