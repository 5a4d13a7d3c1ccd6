//! Capabilities the ledger consumes but does not own: pricing, outbound notices and database backups.
use chrono::NaiveDate;
use resale_common::Amount;
use thiserror::Error;

use crate::db_types::{NoticeKind, Order, OrderNotice};

#[derive(Debug, Clone, Error)]
pub enum PricingError {
    #[error("No price is available for product {0}")]
    NoPrice(String),
    #[error("Pricing lookup failed: {0}")]
    LookupFailed(String),
}

#[derive(Debug, Clone, Error)]
pub enum NotifierError {
    #[error("Could not deliver the {kind} notice: {reason}")]
    DeliveryFailed { kind: NoticeKind, reason: String },
    #[error("The notifier is misconfigured: {0}")]
    Configuration(String),
}

#[derive(Debug, Clone, Error)]
pub enum BackupError {
    #[error("Backup failed: {0}")]
    Failed(String),
    #[error("Backup destination is unusable: {0}")]
    Destination(String),
}

/// Produces the current selling price of an order's product.
#[allow(async_fn_in_trait)]
pub trait PricingProvider {
    async fn current_price(&self, order: &Order, as_of: NaiveDate) -> Result<Amount, PricingError>;
}

/// Delivers a human-facing notice about a batch of orders. Delivery is fire-and-forget; callers only log failures.
#[allow(async_fn_in_trait)]
pub trait Notifier {
    async fn send_notice(&self, kind: NoticeKind, notices: &[OrderNotice]) -> Result<(), NotifierError>;
}

/// Takes an out-of-band copy of the ledger database.
#[allow(async_fn_in_trait)]
pub trait BackupService {
    async fn backup_now(&self) -> Result<(), BackupError>;
}

/// A backup service that does nothing, for deployments where backups are handled outside the process.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoBackup;

impl BackupService for NoBackup {
    async fn backup_now(&self) -> Result<(), BackupError> {
        Ok(())
    }
}
