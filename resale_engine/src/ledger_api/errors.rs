use thiserror::Error;

use crate::{ledger_api::capabilities::PricingError, traits::LedgerError};

#[derive(Debug, Clone, Error)]
pub enum LedgerApiError {
    #[error("No order reference could be derived from the notification")]
    NoOrderReference,
    #[error("The notification could not be applied: {0}")]
    Transactional(#[from] LedgerError),
    #[error("Could not price the renewal: {0}")]
    Pricing(#[from] PricingError),
    #[error("Order {order_code} cannot be renewed: {reason}")]
    Renewal { order_code: String, reason: String },
    #[error("Invalid request. {0}")]
    InvalidRequest(String),
}

impl LedgerApiError {
    /// True if the error refers to a record that does not exist.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::Transactional(LedgerError::RoundNotFound(_)))
    }
}
