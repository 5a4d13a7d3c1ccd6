use chrono::NaiveDate;

use crate::{db_types::PaymentReceipt, traits::LedgerError};

/// Read access to the payment receipt ledger. Receipts are only ever written by
/// [`crate::traits::ReconciliationDatabase::apply_payment`].
#[allow(async_fn_in_trait)]
pub trait PaymentLedger: Clone {
    async fn fetch_receipt(&self, provider_ref: &str) -> Result<Option<PaymentReceipt>, LedgerError>;

    async fn fetch_receipts_for_order(&self, order_code: &str) -> Result<Vec<PaymentReceipt>, LedgerError>;

    /// Distinct order codes referenced by receipts paid on or after `since` whose payment has not yet been applied to
    /// the order, oldest receipt first.
    async fn unapplied_receipt_order_codes(&self, since: NaiveDate) -> Result<Vec<String>, LedgerError>;

    /// The id of the oldest receipt for the order that has neither paid for it nor renewed it.
    async fn unapplied_payment_id(&self, order_code: &str) -> Result<Option<i64>, LedgerError>;
}
