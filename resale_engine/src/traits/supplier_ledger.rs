use chrono::NaiveDate;
use resale_common::Amount;

use crate::{
    db_types::{Supplier, SupplierPaymentRound},
    traits::{LedgerError, SettlementResult},
};

/// Behaviour for the supplier balance ledger.
#[allow(async_fn_in_trait)]
pub trait SupplierLedger: Clone {
    async fn fetch_supplier(&self, name: &str) -> Result<Option<Supplier>, LedgerError>;

    async fn fetch_round(&self, round_id: i64) -> Result<Option<SupplierPaymentRound>, LedgerError>;

    async fn fetch_rounds_for_supplier(&self, supplier_id: i64) -> Result<Vec<SupplierPaymentRound>, LedgerError>;

    /// Opens a billing round for the supplier, creating the supplier if necessary. Fails with
    /// [`LedgerError::OpenRoundExists`] if the supplier already has an Unpaid round.
    async fn open_round(
        &self,
        supplier_name: &str,
        import_value: Amount,
        label: &str,
    ) -> Result<SupplierPaymentRound, LedgerError>;

    /// Settles a round in a single transaction:
    /// * The supplier's Processing orders are paid off, earliest registration first, for as long as the running cost
    ///   stays within `paid_amount`.
    /// * Any shortfall is carried over into a new Unpaid round, unless the supplier already has another one.
    /// * The round is marked Paid, and the settlement is appended to its history.
    ///
    /// `paid_amount` defaults to the round's import value.
    async fn settle_round(
        &self,
        round_id: i64,
        paid_amount: Option<Amount>,
        settled_on: NaiveDate,
    ) -> Result<SettlementResult, LedgerError>;
}
