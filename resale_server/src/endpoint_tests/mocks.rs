use chrono::NaiveDate;
use mockall::mock;
use resale_common::Amount;
use resale_engine::{
    db_types::{NewOrder, NewPaymentReceipt, NoticeKind, Order, OrderStatus, Partition, PaymentReceipt, Supplier, SupplierPaymentRound},
    traits::{
        CancelOutcome,
        LedgerError,
        MaintenanceReport,
        OrderLedger,
        PaymentApplication,
        PaymentLedger,
        ReconciliationDatabase,
        RenewalUpdate,
        SettlementResult,
        SupplierLedger,
    },
    PricingError,
    PricingProvider,
};

mock! {
    pub Ledger {}
    impl Clone for Ledger {
        fn clone(&self) -> Self;
    }
    impl OrderLedger for Ledger {
        async fn insert_order(&self, order: NewOrder) -> Result<(Order, bool), LedgerError>;
        async fn fetch_order(&self, order_code: &str) -> Result<Option<Order>, LedgerError>;
        async fn fetch_archived_order(&self, order_code: &str, partition: Partition) -> Result<Option<Order>, LedgerError>;
        async fn locate_order(&self, order_code: &str) -> Result<Option<Partition>, LedgerError>;
        async fn fetch_active_orders(&self) -> Result<Vec<Order>, LedgerError>;
        async fn transition_status(&self, order_code: &str, expected: Option<OrderStatus>, status: OrderStatus) -> Result<bool, LedgerError>;
        async fn set_check_flag(&self, order_code: &str, expected: Option<bool>, flag: Option<bool>) -> Result<bool, LedgerError>;
        async fn cancel_orders(&self, order_codes: &[String]) -> Result<CancelOutcome, LedgerError>;
    }
    impl PaymentLedger for Ledger {
        async fn fetch_receipt(&self, provider_ref: &str) -> Result<Option<PaymentReceipt>, LedgerError>;
        async fn fetch_receipts_for_order(&self, order_code: &str) -> Result<Vec<PaymentReceipt>, LedgerError>;
        async fn unapplied_receipt_order_codes(&self, since: NaiveDate) -> Result<Vec<String>, LedgerError>;
        async fn unapplied_payment_id(&self, order_code: &str) -> Result<Option<i64>, LedgerError>;
    }
    impl SupplierLedger for Ledger {
        async fn fetch_supplier(&self, name: &str) -> Result<Option<Supplier>, LedgerError>;
        async fn fetch_round(&self, round_id: i64) -> Result<Option<SupplierPaymentRound>, LedgerError>;
        async fn fetch_rounds_for_supplier(&self, supplier_id: i64) -> Result<Vec<SupplierPaymentRound>, LedgerError>;
        async fn open_round(&self, supplier_name: &str, import_value: Amount, label: &str) -> Result<SupplierPaymentRound, LedgerError>;
        async fn settle_round(&self, round_id: i64, paid_amount: Option<Amount>, settled_on: NaiveDate) -> Result<SettlementResult, LedgerError>;
    }
    impl ReconciliationDatabase for Ledger {
        fn url(&self) -> &str;
        async fn apply_payment(&self, receipt: NewPaymentReceipt, today: NaiveDate) -> Result<PaymentApplication, LedgerError>;
        async fn apply_renewal(&self, renewal: RenewalUpdate) -> Result<Option<Order>, LedgerError>;
        async fn run_daily_maintenance(&self, today: NaiveDate) -> Result<MaintenanceReport, LedgerError>;
        async fn orders_due_for_notice(&self, kind: NoticeKind, today: NaiveDate) -> Result<Vec<Order>, LedgerError>;
    }
}

mock! {
    pub Pricing {}
    impl PricingProvider for Pricing {
        async fn current_price(&self, order: &Order, as_of: NaiveDate) -> Result<Amount, PricingError>;
    }
}
