use chrono::{Duration, NaiveDate};
use resale_common::Amount;
use resale_engine::{
    db_types::{NewPaymentReceipt, Order, OrderStatus},
    helpers::OrderCodePattern,
    payment_objects::{PostCommitStage, RenewalResult},
    traits::{OrderLedger, ReconciliationDatabase, RenewalUpdate, SupplierLedger},
    PaymentFlowApi,
    PricingError,
    PricingProvider,
    SqliteDatabase,
};

use crate::support::{
    fixtures::{days_from_today, order_expiring_in, seed, today},
    prepare_env::new_test_db,
};

mod support;

struct PricingDown;

impl PricingProvider for PricingDown {
    async fn current_price(&self, _order: &Order, _as_of: NaiveDate) -> Result<Amount, PricingError> {
        Err(PricingError::LookupFailed("price list unavailable".into()))
    }
}

fn api(db: &SqliteDatabase) -> PaymentFlowApi<SqliteDatabase, SqliteDatabase> {
    PaymentFlowApi::new(db.clone(), db.clone(), OrderCodePattern::default())
}

async fn acme_owes(db: &SqliteDatabase) -> Vec<Amount> {
    match db.fetch_supplier("Acme").await.unwrap() {
        Some(supplier) => {
            db.fetch_rounds_for_supplier(supplier.id).await.unwrap().into_iter().map(|r| r.import_value).collect()
        },
        None => vec![],
    }
}

fn receipt(provider_ref: &str, code: &str, paid_days_ago: i64) -> NewPaymentReceipt {
    NewPaymentReceipt::new(
        provider_ref.to_string(),
        vec![code.to_string()],
        days_from_today(-paid_days_ago),
        Amount::from(80_000),
    )
}

#[tokio::test]
async fn explicit_retries_respect_the_check_flag_unless_forced() {
    let db = new_test_db().await;
    let before = seed(&db, order_expiring_in("MAVC0601", 2, OrderStatus::Renewal)).await;
    assert!(db.set_check_flag("MAVC0601", None, Some(true)).await.unwrap());
    let api = api(&db);
    // The flag keeps the payment from renewing the order, so the payment itself credits the supplier
    let summary = api.process_receipt(receipt("bank:10", "MAVC0601", 0), today()).await.unwrap();
    assert!(summary.renewed.is_empty());
    assert_eq!(acme_owes(&db).await, vec![Amount::from(50_000)]);
    let codes = || Some(vec!["mavc0601".to_string(), " MAVC0601 ".to_string(), String::new()]);

    let summary = api.retry_renewals(codes(), false, today(), 3).await.unwrap();
    assert_eq!(summary.processed, 1);
    assert!(summary.renewed.is_empty());
    assert_eq!(summary.skipped.len(), 1);
    assert_eq!(summary.skipped[0].order_code, "MAVC0601");

    let summary = api.retry_renewals(codes(), true, today(), 3).await.unwrap();
    assert_eq!(summary.renewed, vec!["MAVC0601"]);
    let after = db.fetch_order("MAVC0601").await.unwrap().unwrap();
    assert_eq!(after.expiry(), before.expiry().map(|e| e + Duration::days(30)));
    assert_eq!(after.status, OrderStatus::Paid);
    assert_eq!(after.check_flag, None);
    assert_eq!(acme_owes(&db).await, vec![Amount::from(50_000)]);

    // The payment has been used up, so forcing again does not grant another term
    let summary = api.retry_renewals(codes(), true, today(), 3).await.unwrap();
    assert!(summary.renewed.is_empty());
    assert_eq!(db.fetch_order("MAVC0601").await.unwrap().unwrap().expiry(), after.expiry());
}

#[tokio::test]
async fn failed_renewals_are_recovered_by_rescanning_recent_payments() {
    let db = new_test_db().await;
    let before = seed(&db, order_expiring_in("MAVC0602", 1, OrderStatus::Renewal)).await;
    seed(&db, order_expiring_in("MAVC0603", 1, OrderStatus::Renewal)).await;

    let broken = PaymentFlowApi::new(db.clone(), PricingDown, OrderCodePattern::default());
    let summary = broken.process_receipt(receipt("bank:1", "MAVC0602", 2), today()).await.unwrap();
    assert!(summary.inserted);
    assert!(summary.renewed.is_empty());
    assert_eq!(summary.failures.len(), 1);
    assert_eq!(summary.failures[0].stage, PostCommitStage::Renewal);
    broken.process_receipt(receipt("bank:2", "MAVC0603", 10), today()).await.unwrap();
    assert_eq!(db.fetch_order("MAVC0602").await.unwrap().unwrap().expiry(), before.expiry());

    let summary = api(&db).retry_renewals(None, false, today(), 3).await.unwrap();
    assert_eq!(summary.processed, 1);
    assert_eq!(summary.renewed, vec!["MAVC0602"]);
    let renewed = db.fetch_order("MAVC0602").await.unwrap().unwrap();
    assert_eq!(renewed.expiry(), before.expiry().map(|e| e + Duration::days(30)));
    assert_eq!(db.fetch_order("MAVC0603").await.unwrap().unwrap().status, OrderStatus::Renewal);
    assert_eq!(acme_owes(&db).await, vec![Amount::from(50_000)]);

    let again = api(&db).retry_renewals(None, true, today(), 3).await.unwrap();
    assert_eq!(again.processed, 0);
    assert_eq!(db.fetch_order("MAVC0602").await.unwrap().unwrap().expiry(), renewed.expiry());
    assert_eq!(acme_owes(&db).await, vec![Amount::from(50_000)]);
}

#[tokio::test]
async fn payments_that_paid_for_an_order_do_not_renew_it() {
    let db = new_test_db().await;
    let before = seed(&db, order_expiring_in("MAVC0607", 20, OrderStatus::Unpaid)).await;
    let api = api(&db);
    let summary = api.process_receipt(receipt("bank:3", "MAVC0607", 0), today()).await.unwrap();
    assert_eq!(summary.marked_paid, vec!["MAVC0607"]);
    assert_eq!(acme_owes(&db).await, vec![Amount::from(50_000)]);

    let rescan = api.retry_renewals(None, true, today(), 3).await.unwrap();
    assert_eq!(rescan.processed, 0);
    let explicit = api.retry_renewals(Some(vec!["MAVC0607".to_string()]), true, today(), 3).await.unwrap();
    assert!(explicit.renewed.is_empty());
    assert_eq!(explicit.skipped.len(), 1);

    let after = db.fetch_order("MAVC0607").await.unwrap().unwrap();
    assert_eq!(after.status, OrderStatus::Paid);
    assert_eq!(after.expiry(), before.expiry());
    assert_eq!(acme_owes(&db).await, vec![Amount::from(50_000)]);
}

#[tokio::test]
async fn paid_orders_outside_the_window_need_force() {
    let db = new_test_db().await;
    let before = seed(&db, order_expiring_in("MAVC0604", 20, OrderStatus::Paid)).await;
    let api = api(&db);

    let result = api.apply_renewal("MAVC0604", true, today()).await.unwrap();
    assert!(matches!(result, RenewalResult::Skipped(_)), "no payment has been received");

    api.process_receipt(receipt("bank:4", "MAVC0604", 0), today()).await.unwrap();
    assert_eq!(acme_owes(&db).await, vec![Amount::from(50_000)]);
    let result = api.apply_renewal("MAVC0604", false, today()).await.unwrap();
    assert!(matches!(result, RenewalResult::Skipped(_)));

    let result = api.apply_renewal("MAVC0604", true, today()).await.unwrap();
    let RenewalResult::Renewed(order) = result else { panic!("expected a renewal") };
    assert_eq!(order.expiry(), before.expiry().map(|e| e + Duration::days(30)));
    assert_eq!(acme_owes(&db).await, vec![Amount::from(50_000)]);

    let result = api.apply_renewal("MAVC9999", true, today()).await.unwrap();
    assert!(matches!(result, RenewalResult::Skipped(_)));
}

#[tokio::test]
async fn expired_orders_are_renewed_back_to_paid() {
    let db = new_test_db().await;
    seed(&db, order_expiring_in("MAVC0605", 0, OrderStatus::Expired)).await;
    let broken = PaymentFlowApi::new(db.clone(), PricingDown, OrderCodePattern::default());
    let summary = broken.process_receipt(receipt("bank:5", "MAVC0605", 0), today()).await.unwrap();
    assert!(summary.renewed.is_empty());

    let result = api(&db).apply_renewal("MAVC0605", false, today()).await.unwrap();
    let RenewalResult::Renewed(order) = result else { panic!("expected a renewal") };
    assert_eq!(order.status, OrderStatus::Paid);
    assert_eq!(order.days_remaining(today()), Some(30));
    assert_eq!(acme_owes(&db).await, vec![Amount::from(50_000)]);
}

#[tokio::test]
async fn stale_renewals_do_not_land() {
    let db = new_test_db().await;
    let order = seed(&db, order_expiring_in("MAVC0606", 2, OrderStatus::Renewal)).await;
    let expiry = order.expiry().unwrap();
    let payment = db.apply_payment(receipt("bank:6", "MAVC0606", 0), today()).await.unwrap();
    let stale = RenewalUpdate {
        order_code: "MAVC0606".into(),
        payment_id: payment.receipt.id(),
        expected_status: OrderStatus::Renewal,
        expected_expiry_date: Some(expiry),
        new_expiry_date: expiry + Duration::days(30),
        new_price: Amount::from(80_000),
        renewed_on: today(),
    };
    // The stored expiry is derived, so a renewal computed against an explicit one is out of date
    assert!(db.apply_renewal(stale.clone()).await.unwrap().is_none());

    let current = RenewalUpdate { expected_expiry_date: None, ..stale.clone() };
    let unknown_payment = RenewalUpdate { payment_id: payment.receipt.id() + 100, ..current.clone() };
    assert!(db.apply_renewal(unknown_payment).await.unwrap().is_none());
    assert!(db.apply_renewal(current.clone()).await.unwrap().is_some());
    // The same payment cannot renew the order twice, even against its new expiry
    let reused = RenewalUpdate {
        expected_status: OrderStatus::Paid,
        expected_expiry_date: Some(expiry + Duration::days(30)),
        new_expiry_date: expiry + Duration::days(60),
        ..current
    };
    assert!(db.apply_renewal(reused).await.unwrap().is_none());
    let renewed = db.fetch_order("MAVC0606").await.unwrap().unwrap();
    assert_eq!(renewed.expiry(), Some(expiry + Duration::days(30)));
}
