use std::fmt::Debug;

use chrono::NaiveDate;
use log::*;
use resale_common::Amount;

use crate::{
    db_types::SupplierPaymentRound,
    ledger_api::errors::LedgerApiError,
    traits::{LedgerError, SettlementResult, SupplierLedger},
};

/// Operator-facing access to the supplier balance ledger.
pub struct SupplierLedgerApi<B> {
    db: B,
}

impl<B> Debug for SupplierLedgerApi<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SupplierLedgerApi")
    }
}

impl<B> SupplierLedgerApi<B> {
    pub fn new(db: B) -> Self {
        Self { db }
    }
}

impl<B> SupplierLedgerApi<B>
where B: SupplierLedger
{
    /// Settles a round with `paid_amount`, or with the full amount owed if none is given. See
    /// [`SupplierLedger::settle_round`].
    pub async fn settle_round(
        &self,
        round_id: i64,
        paid_amount: Option<Amount>,
        settled_on: NaiveDate,
    ) -> Result<SettlementResult, LedgerApiError> {
        if let Some(amount) = paid_amount {
            if amount.value() < 0 {
                return Err(LedgerApiError::InvalidRequest(format!("Cannot settle a round with {amount}")));
            }
        }
        let result = self.db.settle_round(round_id, paid_amount, settled_on).await?;
        info!(
            "🏦️ Round #{round_id} settled: {} | {} orders paid | carryover {}",
            result.round.display_label(),
            result.settled_orders.len(),
            result.carryover
        );
        if let Some(next) = &result.carryover_round {
            info!("🏦️ Carryover round #{} opened owing {}", next.id, next.import_value);
        }
        Ok(result)
    }

    pub async fn open_round(
        &self,
        supplier_name: &str,
        import_value: Amount,
        label: &str,
    ) -> Result<SupplierPaymentRound, LedgerApiError> {
        let round = self.db.open_round(supplier_name, import_value, label).await?;
        debug!("🏦️ Opened round #{} for {supplier_name}", round.id);
        Ok(round)
    }

    pub async fn round(&self, round_id: i64) -> Result<SupplierPaymentRound, LedgerApiError> {
        let round = self.db.fetch_round(round_id).await?.ok_or(LedgerError::RoundNotFound(round_id))?;
        Ok(round)
    }

    /// Every round for the named supplier, oldest first. Unknown suppliers have no rounds.
    pub async fn rounds_for_supplier(&self, supplier_name: &str) -> Result<Vec<SupplierPaymentRound>, LedgerApiError> {
        match self.db.fetch_supplier(supplier_name).await? {
            Some(supplier) => Ok(self.db.fetch_rounds_for_supplier(supplier.id).await?),
            None => Ok(vec![]),
        }
    }
}
