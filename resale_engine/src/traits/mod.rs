//! # Ledger backends
//!
//! This module defines the contracts that a storage backend must honour to run the reseller ledger.
//!
//! * [`OrderLedger`] owns the active order table and its two archive partitions.
//! * [`PaymentLedger`] is the append-only record of applied payment notifications.
//! * [`SupplierLedger`] tracks what is owed to each supplier, one billing round at a time.
//! * [`ReconciliationDatabase`] ties the three together for the operations that must be atomic across them: applying
//!   a payment, applying a renewal and the daily maintenance sweep.
//!
//! Every method is expected to be self-contained. Methods that touch more than one row do so inside a single
//! transaction, and either apply fully or not at all.
mod data_objects;
mod order_ledger;
mod payment_ledger;
mod reconciliation;
mod supplier_ledger;

pub use data_objects::{
    CancelOutcome,
    InsertReceiptResult,
    MaintenanceReport,
    OrderPreState,
    PaymentApplication,
    RenewalUpdate,
    SettlementResult,
    SupplierAccrual,
};
pub use order_ledger::OrderLedger;
pub use payment_ledger::PaymentLedger;
pub use reconciliation::{LedgerError, ReconciliationDatabase};
pub use supplier_ledger::SupplierLedger;
