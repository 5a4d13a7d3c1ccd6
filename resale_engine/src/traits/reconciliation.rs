use chrono::NaiveDate;
use thiserror::Error;

use crate::{
    db_types::{NewPaymentReceipt, NoticeKind, Order, Partition},
    traits::{MaintenanceReport, OrderLedger, PaymentApplication, PaymentLedger, RenewalUpdate, SupplierLedger},
};

#[derive(Debug, Clone, Error)]
pub enum LedgerError {
    #[error("Database error: {0}")]
    DatabaseError(String),
    #[error("Supplier payment round #{0} does not exist")]
    RoundNotFound(i64),
    #[error("Supplier {0} already has an open payment round")]
    OpenRoundExists(String),
    #[error("Order {order_code} cannot be moved into the {partition} partition while it is {status}")]
    InvalidArchive { order_code: String, partition: Partition, status: String },
}

impl From<sqlx::Error> for LedgerError {
    fn from(e: sqlx::Error) -> Self {
        LedgerError::DatabaseError(e.to_string())
    }
}

/// The highest level of behaviour for ledger backends: the operations that must be atomic across orders, receipts and
/// supplier rounds.
#[allow(async_fn_in_trait)]
pub trait ReconciliationDatabase: OrderLedger + PaymentLedger + SupplierLedger {
    /// The URL of the database
    fn url(&self) -> &str;

    /// Applies a payment receipt in a single transaction:
    /// * Reads the current state of every referenced order and computes its renewal eligibility, before anything is
    ///   written.
    /// * Inserts the receipt. If a receipt with the same provider reference exists, nothing further happens.
    /// * Moves Unpaid orders that are not renewals to Paid.
    /// * If the receipt references exactly one order, and that order is not a renewal, makes sure the supplier and
    ///   product supply records exist and credits the order's cost to the supplier's open round.
    async fn apply_payment(
        &self,
        receipt: NewPaymentReceipt,
        today: NaiveDate,
    ) -> Result<PaymentApplication, LedgerError>;

    /// Applies a renewal in a single transaction: marks the paying receipt as applied to the order, extends the expiry,
    /// sets the new price and resets the status to Paid. The order's cost is credited to the supplier's open round
    /// unless the payment transaction already credited it.
    ///
    /// Returns `None` if the order changed underneath the renewal, or the payment has already been applied, and
    /// nothing was written.
    async fn apply_renewal(&self, renewal: RenewalUpdate) -> Result<Option<Order>, LedgerError>;

    /// The daily sweep, as one transaction:
    /// 1. Archive lapsed Paid, Renewal and Expired orders into the expired partition.
    /// 2. Move Paid orders inside the renewal window to Renewal.
    /// 3. Delete the archived orders from the active partition.
    /// 4. Move Renewal orders that expire today to Expired.
    async fn run_daily_maintenance(&self, today: NaiveDate) -> Result<MaintenanceReport, LedgerError>;

    /// Active orders selected by a notice kind. Read-only.
    async fn orders_due_for_notice(&self, kind: NoticeKind, today: NaiveDate) -> Result<Vec<Order>, LedgerError>;
}
