//! Resale Engine
//!
//! The resale engine is the order-lifecycle state machine and payment reconciliation core of the resale operations
//! backend. It tracks subscription-style orders with a finite validity period, reconciles incoming bank-transfer
//! notifications against those orders, and settles running balances with upstream suppliers.
//!
//! The library is divided into three sections:
//! 1. Storage backends ([`mod@traits`]). SQLite is the supported backend. You should never need to access the database
//!    directly. Instead, use the public API provided by the engine. The exception is the data types used in the
//!    database. These are defined in the `db_types` module and are public.
//! 2. The engine public API ([`mod@ledger_api`]). This provides the payment flow (webhook application and renewals),
//!    the supplier balance ledger, the daily maintenance job and the advance-notice queries.
//! 3. Pure helpers ([`mod@helpers`]) that normalize loosely-typed dates, integers and money strings, and extract
//!    order codes from free-text transfer memos. Every value that crosses a boundary goes through these.
pub mod db_types;
pub mod helpers;
pub mod ledger_api;
pub mod traits;

#[cfg(feature = "sqlite")]
mod sqlite;

#[cfg(feature = "sqlite")]
pub use sqlite::{SqliteBackup, SqliteDatabase};
pub use ledger_api::{
    capabilities::{BackupError, BackupService, NoBackup, Notifier, NotifierError, PricingError, PricingProvider},
    errors::LedgerApiError,
    maintenance_api::{MaintenanceApi, MaintenanceJobState},
    notice_api::{format_notice, NoticeApi, NoticeJobState, NoticeRun},
    payment_flow_api::PaymentFlowApi,
    payment_objects,
    renewal::{renewal_eligibility, RenewalEligibility, RENEWAL_WINDOW_DAYS},
    supplier_api::SupplierLedgerApi,
};
