use chrono::NaiveDate;
use resale_common::Amount;
use serde::Serialize;

use crate::{
    db_types::{Order, OrderStatus, SupplierPaymentRound},
    ledger_api::renewal::RenewalEligibility,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertReceiptResult {
    Inserted(i64),
    AlreadyExists(i64),
}

impl InsertReceiptResult {
    pub fn id(&self) -> i64 {
        match self {
            Self::Inserted(id) | Self::AlreadyExists(id) => *id,
        }
    }

    pub fn inserted(&self) -> bool {
        matches!(self, Self::Inserted(_))
    }
}

/// The state of an order as it was before a payment was applied, along with the renewal decision taken from that
/// state.
#[derive(Debug, Clone)]
pub struct OrderPreState {
    pub order_code: String,
    /// `None` if the code does not refer to an active order.
    pub order: Option<Order>,
    pub eligibility: Option<RenewalEligibility>,
}

impl OrderPreState {
    pub fn is_renewal(&self) -> bool {
        self.eligibility.as_ref().map(|e| e.eligible).unwrap_or(false)
    }
}

/// An amount credited to a supplier's open round.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SupplierAccrual {
    pub supplier_name: String,
    pub round_id: i64,
    pub amount: Amount,
}

/// What happened inside the payment transaction.
#[derive(Debug, Clone)]
pub struct PaymentApplication {
    pub receipt: InsertReceiptResult,
    pub pre_states: Vec<OrderPreState>,
    /// Orders moved from Unpaid to Paid in the same transaction as the receipt.
    pub marked_paid: Vec<String>,
    pub accrual: Option<SupplierAccrual>,
}

impl PaymentApplication {
    pub fn already_applied(receipt_id: i64) -> Self {
        Self {
            receipt: InsertReceiptResult::AlreadyExists(receipt_id),
            pre_states: vec![],
            marked_paid: vec![],
            accrual: None,
        }
    }
}

/// A conditional renewal. The update only lands if the order is still in `expected_status` with the stored expiry it
/// had when the renewal was computed, and the payment it is paid with has not been applied to the order yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenewalUpdate {
    pub order_code: String,
    /// The receipt that pays for this renewal.
    pub payment_id: i64,
    pub expected_status: OrderStatus,
    pub expected_expiry_date: Option<NaiveDate>,
    pub new_expiry_date: NaiveDate,
    pub new_price: Amount,
    pub renewed_on: NaiveDate,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MaintenanceReport {
    /// Orders moved to the expired archive.
    pub archived: Vec<String>,
    /// Paid orders that entered the renewal window.
    pub moved_to_renewal: Vec<String>,
    /// Renewal orders that expired today.
    pub expired: Vec<String>,
}

impl MaintenanceReport {
    pub fn total_count(&self) -> usize {
        self.archived.len() + self.moved_to_renewal.len() + self.expired.len()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SettlementResult {
    pub round: SupplierPaymentRound,
    /// Processing orders that the payment covered, now Paid.
    pub settled_orders: Vec<String>,
    pub carryover: Amount,
    pub carryover_round: Option<SupplierPaymentRound>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CancelOutcome {
    pub canceled: Vec<String>,
    /// Codes that are unknown or whose status does not permit cancellation.
    pub rejected: Vec<String>,
}
