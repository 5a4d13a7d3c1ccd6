use actix_web::{http::StatusCode, web, web::ServiceConfig};
use chrono::{Duration, NaiveDate, Utc};
use resale_common::Amount;
use resale_engine::{
    db_types::{Order, OrderStatus, RoundStatus, SettlementEvent, SupplierPaymentRound},
    helpers::OrderCodePattern,
    traits::{CancelOutcome, LedgerError, SettlementResult},
    PaymentFlowApi,
    SupplierLedgerApi,
};
use serde_json::Value;

use super::{
    helpers::{api_key_header, get_auth_config, post_request, signature_header},
    mocks::{MockLedger, MockPricing},
};
use crate::{
    config::ServerOptions,
    middleware::WebhookAuthMiddlewareFactory,
    routes::{CancelOrdersRoute, RetryRenewalsRoute, SettleRoundRoute},
};

fn configure(ledger: MockLedger, rounds: MockLedger) -> impl FnOnce(&mut ServiceConfig) {
    move |cfg| {
        let payments_api = PaymentFlowApi::new(ledger, MockPricing::new(), OrderCodePattern::default());
        cfg.app_data(web::Data::new(payments_api))
            .app_data(web::Data::new(SupplierLedgerApi::new(rounds)))
            .app_data(web::Data::new(ServerOptions::default()))
            .service(
                web::scope("/api")
                    .wrap(WebhookAuthMiddlewareFactory::new(get_auth_config(), false))
                    .service(RetryRenewalsRoute::<MockLedger, MockPricing>::new())
                    .service(SettleRoundRoute::<MockLedger>::new())
                    .service(CancelOrdersRoute::<MockLedger, MockPricing>::new()),
            );
    }
}

fn json(body: &str) -> Value {
    serde_json::from_str(body).unwrap()
}

fn round(id: i64, import_value: i64, paid: i64, status: RoundStatus) -> SupplierPaymentRound {
    SupplierPaymentRound {
        id,
        supplier_id: 1,
        import_value: Amount::from(import_value),
        paid_amount: Amount::from(paid),
        label: format!("Round {id}"),
        status,
        history: vec![],
        created_at: Utc::now(),
    }
}

#[actix_web::test]
async fn retry_with_explicit_codes() {
    let _ = env_logger::try_init();
    let mut ledger = MockLedger::new();
    ledger.expect_fetch_order().withf(|code| code.to_string() == "MAVC0001").times(1).returning(|_| Ok(None));
    let body = r#"{"order_codes":["mavc0001"," MAVC0001 "],"force":true}"#;
    let (status, body) =
        post_request("/api/renewals/retry", body, &[api_key_header()], configure(ledger, MockLedger::new())).await;
    assert_eq!(status, StatusCode::OK);
    let summary = json(&body);
    assert_eq!(summary["processed"], 1);
    assert_eq!(summary["renewed"], Value::Array(vec![]));
    assert_eq!(summary["skipped"][0]["order_code"], "MAVC0001");
}

fn renewal_order(code: &str) -> Order {
    let today = Utc::now().date_naive();
    Order {
        id: 1,
        order_code: code.to_string(),
        product_code: "NETFLIX-1M".to_string(),
        customer_info: String::new(),
        contact_link: String::new(),
        slot: String::new(),
        registration_date: Some(today - Duration::days(28)),
        duration_days: Some(30),
        expiry_date: None,
        supplier_name: "Acme".to_string(),
        cost_amount: Amount::from(50_000),
        price_amount: Amount::from(80_000),
        note: String::new(),
        status: OrderStatus::Renewal,
        check_flag: None,
        created_at: Utc::now(),
        updated_at: Utc::now(),
    }
}

#[actix_web::test]
async fn retry_needs_a_payment_that_has_not_been_applied() {
    let _ = env_logger::try_init();
    let mut ledger = MockLedger::new();
    ledger.expect_fetch_order().times(1).returning(|code| Ok(Some(renewal_order(code))));
    ledger.expect_unapplied_payment_id().times(1).returning(|_| Ok(None));
    ledger.expect_apply_renewal().never();
    let body = r#"{"order_codes":["MAVC0002"],"force":true}"#;
    let (status, body) =
        post_request("/api/renewals/retry", body, &[api_key_header()], configure(ledger, MockLedger::new())).await;
    assert_eq!(status, StatusCode::OK);
    let summary = json(&body);
    assert_eq!(summary["renewed"], Value::Array(vec![]));
    assert_eq!(summary["skipped"][0]["order_code"], "MAVC0002");
    assert!(summary["skipped"][0]["reason"].as_str().unwrap().contains("no payment"), "{body}");
}

#[actix_web::test]
async fn retry_without_a_body_rescans_recent_payments() {
    let _ = env_logger::try_init();
    let mut ledger = MockLedger::new();
    ledger.expect_unapplied_receipt_order_codes().times(1).returning(|_| Ok(vec![]));
    let (status, body) =
        post_request("/api/renewals/retry", "", &[api_key_header()], configure(ledger, MockLedger::new())).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json(&body)["processed"], 0);
}

#[actix_web::test]
async fn operator_routes_do_not_accept_signatures() {
    let _ = env_logger::try_init();
    let body = r#"{"force":false}"#;
    let mut ledger = MockLedger::new();
    ledger.expect_unapplied_receipt_order_codes().never();
    let (status, _) =
        post_request("/api/renewals/retry", body, &[signature_header(body)], configure(ledger, MockLedger::new())).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[actix_web::test]
async fn settle_round_with_partial_payment() {
    let _ = env_logger::try_init();
    let mut rounds = MockLedger::new();
    rounds
        .expect_settle_round()
        .withf(|id, amount, _| *id == 7 && *amount == Some(Amount::from(60_000)))
        .times(1)
        .returning(|id, _, on: NaiveDate| {
            let mut settled = round(id, 100_000, 60_000, RoundStatus::Paid);
            settled.history.push(SettlementEvent { amount: Amount::from(60_000), settled_on: on });
            Ok(SettlementResult {
                round: settled,
                settled_orders: vec!["MAVC0301".to_string()],
                carryover: Amount::from(40_000),
                carryover_round: Some(round(8, 40_000, 0, RoundStatus::Unpaid)),
            })
        });
    let (status, body) = post_request(
        "/api/supplier_rounds/7/settle",
        r#"{"paid_amount":"60,000"}"#,
        &[api_key_header()],
        configure(MockLedger::new(), rounds),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let result = json(&body);
    assert_eq!(result["settled_orders"][0], "MAVC0301");
    assert_eq!(result["carryover"], 40_000);
    assert_eq!(result["round"]["status"], "Paid");
    assert_eq!(result["carryover_round"]["import_value"], 40_000);
}

#[actix_web::test]
async fn settle_unknown_round_is_not_found() {
    let _ = env_logger::try_init();
    let mut rounds = MockLedger::new();
    rounds.expect_settle_round().times(1).returning(|id, _, _| Err(LedgerError::RoundNotFound(id)));
    let (status, body) = post_request(
        "/api/supplier_rounds/9999/settle",
        "",
        &[api_key_header()],
        configure(MockLedger::new(), rounds),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body.contains("#9999"), "{body}");
}

#[actix_web::test]
async fn settle_rejects_unreadable_amounts() {
    let _ = env_logger::try_init();
    let mut rounds = MockLedger::new();
    rounds.expect_settle_round().never();
    let (status, body) = post_request(
        "/api/supplier_rounds/7/settle",
        r#"{"paid_amount":"a lot"}"#,
        &[api_key_header()],
        configure(MockLedger::new(), rounds),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body.contains("not a valid amount"), "{body}");
}

#[actix_web::test]
async fn cancel_orders_reports_rejections() {
    let _ = env_logger::try_init();
    let mut ledger = MockLedger::new();
    ledger.expect_cancel_orders().withf(|codes| codes.to_vec() == ["MAVC0401", "MAVC0402"]).times(1).returning(|_| {
        Ok(CancelOutcome { canceled: vec!["MAVC0401".to_string()], rejected: vec!["MAVC0402".to_string()] })
    });
    let (status, body) = post_request(
        "/api/orders/cancel",
        r#"{"order_codes":["MAVC0401","mavc0402"]}"#,
        &[api_key_header()],
        configure(ledger, MockLedger::new()),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, r#"{"canceled":["MAVC0401"],"rejected":["MAVC0402"]}"#);
}

#[actix_web::test]
async fn cancel_requires_order_codes() {
    let _ = env_logger::try_init();
    let mut ledger = MockLedger::new();
    ledger.expect_cancel_orders().never();
    let (status, _) =
        post_request("/api/orders/cancel", r#"{"order_codes":[" "]}"#, &[api_key_header()], configure(ledger, MockLedger::new()))
            .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let (status, _) =
        post_request("/api/orders/cancel", "{}", &[api_key_header()], configure(MockLedger::new(), MockLedger::new())).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}
