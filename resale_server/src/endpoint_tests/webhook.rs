use actix_web::{http::StatusCode, web, web::ServiceConfig};
use resale_engine::{
    helpers::OrderCodePattern,
    traits::{InsertReceiptResult, LedgerError, PaymentApplication},
    PaymentFlowApi,
};

use super::{
    helpers::{api_key_header, get_auth_config, post_request, signature_header},
    mocks::{MockLedger, MockPricing},
};
use crate::{config::ServerOptions, middleware::WebhookAuthMiddlewareFactory, routes::PaymentWebhookRoute};

const PAYMENT_JSON: &str = r#"{"id":5001,"gateway":"Vietcombank","transactionDate":"2025-03-10 08:15:00","accountNumber":"0071000123456","transferType":"in","transferAmount":80000,"content":"MAVC0001 gia han","referenceCode":"FT25069001"}"#;
const OK_JSON: &str = r#"{"message":"OK"}"#;

fn configure(ledger: MockLedger) -> impl FnOnce(&mut ServiceConfig) {
    move |cfg| {
        let api = PaymentFlowApi::new(ledger, MockPricing::new(), OrderCodePattern::default());
        cfg.app_data(web::Data::new(api)).app_data(web::Data::new(ServerOptions::default())).service(
            web::scope("/webhook")
                .wrap(WebhookAuthMiddlewareFactory::new(get_auth_config(), true))
                .service(PaymentWebhookRoute::<MockLedger, MockPricing>::new()),
        );
    }
}

fn applied() -> PaymentApplication {
    PaymentApplication {
        receipt: InsertReceiptResult::Inserted(1),
        pre_states: vec![],
        marked_paid: vec!["MAVC0001".to_string()],
        accrual: None,
    }
}

fn ledger_expecting_payment() -> MockLedger {
    let mut ledger = MockLedger::new();
    ledger
        .expect_apply_payment()
        .withf(|receipt, _| receipt.provider_ref == "Vietcombank:5001" && receipt.order_codes == ["MAVC0001"])
        .times(1)
        .returning(|_, _| Ok(applied()));
    ledger
}

fn ledger_expecting_nothing() -> MockLedger {
    let mut ledger = MockLedger::new();
    ledger.expect_apply_payment().never();
    ledger
}

#[actix_web::test]
async fn webhook_without_credentials_is_forbidden() {
    let _ = env_logger::try_init();
    let (status, body) = post_request("/webhook/payments", PAYMENT_JSON, &[], configure(ledger_expecting_nothing())).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body, r#"{"error":"Authentication Error. No signature or API key was provided."}"#);
}

#[actix_web::test]
async fn signed_webhook_is_applied() {
    let _ = env_logger::try_init();
    let headers = [signature_header(PAYMENT_JSON)];
    let (status, body) =
        post_request("/webhook/payments", PAYMENT_JSON, &headers, configure(ledger_expecting_payment())).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, OK_JSON);
}

#[actix_web::test]
async fn webhook_with_api_key_is_applied() {
    let _ = env_logger::try_init();
    let headers = [api_key_header()];
    let (status, body) =
        post_request("/webhook/payments", PAYMENT_JSON, &headers, configure(ledger_expecting_payment())).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, OK_JSON);
}

#[actix_web::test]
async fn signature_must_match_the_body() {
    let _ = env_logger::try_init();
    let tampered = PAYMENT_JSON.replace("80000", "8000000");
    let headers = [signature_header(PAYMENT_JSON)];
    let (status, body) =
        post_request("/webhook/payments", &tampered, &headers, configure(ledger_expecting_nothing())).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body, r#"{"error":"Authentication Error. The request signature is invalid."}"#);
}

#[actix_web::test]
async fn wrong_api_key_is_forbidden() {
    let _ = env_logger::try_init();
    let headers = [("Authorization", "Apikey not-the-key".to_string())];
    let (status, body) =
        post_request("/webhook/payments", PAYMENT_JSON, &headers, configure(ledger_expecting_nothing())).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body, r#"{"error":"Authentication Error. The API key is invalid."}"#);
}

#[actix_web::test]
async fn notification_without_order_code_is_rejected() {
    let _ = env_logger::try_init();
    let payload = PAYMENT_JSON.replace("MAVC0001 gia han", "chuyen tien");
    let headers = [signature_header(&payload)];
    let (status, body) =
        post_request("/webhook/payments", &payload, &headers, configure(ledger_expecting_nothing())).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body, r#"{"error":"No order reference could be found in the notification."}"#);
}

#[actix_web::test]
async fn ledger_failure_asks_the_provider_to_retry() {
    let _ = env_logger::try_init();
    let mut ledger = MockLedger::new();
    ledger.expect_apply_payment().times(1).returning(|_, _| Err(LedgerError::DatabaseError("database is locked".into())));
    let headers = [api_key_header()];
    let (status, body) = post_request("/webhook/payments", PAYMENT_JSON, &headers, configure(ledger)).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(body.contains("database is locked"), "{body}");
}

#[actix_web::test]
async fn replayed_notification_is_acknowledged() {
    let _ = env_logger::try_init();
    let mut ledger = MockLedger::new();
    ledger.expect_apply_payment().times(1).returning(|_, _| Ok(PaymentApplication::already_applied(1)));
    let headers = [api_key_header()];
    let (status, body) = post_request("/webhook/payments", PAYMENT_JSON, &headers, configure(ledger)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, OK_JSON);
}

#[actix_web::test]
async fn outgoing_transfers_are_acknowledged_but_ignored() {
    let _ = env_logger::try_init();
    let payload = PAYMENT_JSON.replace(r#""transferType":"in""#, r#""transferType":"out""#);
    let headers = [signature_header(&payload)];
    let (status, body) =
        post_request("/webhook/payments", &payload, &headers, configure(ledger_expecting_nothing())).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, OK_JSON);
}

#[actix_web::test]
async fn malformed_payload_is_a_bad_request() {
    let _ = env_logger::try_init();
    let headers = [api_key_header()];
    let (status, body) =
        post_request("/webhook/payments", "{\"id\": ", &headers, configure(ledger_expecting_nothing())).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body.starts_with(r#"{"error":"Payload deserialization error."#), "{body}");
}
