//! Request handler definitions
//!
//! Define each route and it handler here.
//! Handlers that are more than a line or two MUST go into a separate module. Keep this module neat and tidy 🙏
//!
//! Every handler that touches the ledger is async. The ledger calls are I/O bound and must never block a worker thread.
//!
//! Request bodies are read as raw bytes and parsed here, rather than with `web::Json`, so that malformed payloads get
//! the same JSON error body as every other failure.
use actix_web::{get, web, HttpResponse, Responder};
use log::*;
use resale_engine::{
    payment_objects::{NotificationOutcome, TransferNotification},
    traits::{ReconciliationDatabase, SupplierLedger},
    LedgerApiError,
    PaymentFlowApi,
    PricingProvider,
    SupplierLedgerApi,
};

use crate::{
    config::ServerOptions,
    data_objects::{parse_body, parse_optional_body, CancelRequest, JsonResponse, RetryRequest, SettleRequest},
    errors::ServerError,
    helpers::local_today,
};

// Web-actix cannot handle generics in handlers, so it's implemented manually using the `route!` macro
#[macro_export]
macro_rules! route {
    ($name:ident => $method:ident $path:literal impl $($bounds:ty),+) => {
        paste::paste! { pub struct [<$name:camel Route>]< $( [< T $bounds:camel> ],)+ >( $( core::marker::PhantomData<fn() -> [< T $bounds:camel> ] >,)+ );}
        paste::paste! { impl< $( [< T $bounds:camel> ],)+ > [<$name:camel Route>]< $( [< T $bounds:camel> ],)+ > {
            #[allow(clippy::new_without_default)]
            pub fn new() -> Self {
                Self($( core::marker::PhantomData::<fn() -> [< T $bounds:camel> ] >,)+)
            }
        }}
        paste::paste! { impl<$( [< T $bounds:camel >] , )+> actix_web::dev::HttpServiceFactory for [<$name:camel Route>]<$([<T $bounds:camel>],)+>
        where
            $([<T $bounds:camel>]: $bounds + 'static,)+
        {
            fn register(self, config: &mut actix_web::dev::AppService) {
                let res = actix_web::Resource::new($path)
                    .name(stringify!($name))
                    .guard(actix_web::guard::$method())
                    .to($name::< $( [< T $bounds:camel >], )+>);
                actix_web::dev::HttpServiceFactory::register(res, config);
            }
        }}
    };
}

// ----------------------------------------------   Health  ----------------------------------------------------
#[get("/health")]
pub async fn health() -> impl Responder {
    trace!("💻️ Received health check request");
    HttpResponse::Ok().body("👍️\n")
}

//------------------------------------------   Payment webhook  ---------------------------------------------
route!(payment_webhook => Post "/payments" impl ReconciliationDatabase, PricingProvider);
/// Route handler for bank transfer notifications.
///
/// Every accepted notification is acknowledged with `200 {"message":"OK"}`, including duplicates, outgoing transfers
/// and payments whose follow-up renewal failed. The provider retries anything else, so only a notification with no
/// order code in it (`400`) or a failed ledger write (`500`) is refused.
pub async fn payment_webhook<B, P>(
    body: web::Bytes,
    options: web::Data<ServerOptions>,
    api: web::Data<PaymentFlowApi<B, P>>,
) -> Result<HttpResponse, ServerError>
where
    B: ReconciliationDatabase,
    P: PricingProvider,
{
    trace!("💻️ Received payment notification");
    let notification = parse_body::<TransferNotification>(&body).map_err(|e| {
        warn!("💻️ Could not deserialize payment notification. {e}");
        e
    })?;
    info!(
        "💻️ Payment notification {} received. Memo: '{}'",
        notification.provider_reference(),
        notification.memo()
    );
    let today = local_today(options.utc_offset);
    match api.process_notification(&notification, today).await {
        Ok(NotificationOutcome::Applied(summary)) => {
            if !summary.failures.is_empty() {
                warn!(
                    "💻️ Payment {} was recorded, but {} follow-up steps failed. Use the renewal retry to recover.",
                    summary.provider_ref,
                    summary.failures.len()
                );
            }
            debug!("💻️ {}", serde_json::to_string(&summary).unwrap_or_else(|e| format!("{e}")));
            Ok(HttpResponse::Ok().json(JsonResponse::ok()))
        },
        Ok(NotificationOutcome::Ignored(reason)) => {
            debug!("💻️ Notification ignored: {reason}");
            Ok(HttpResponse::Ok().json(JsonResponse::ok()))
        },
        Err(LedgerApiError::NoOrderReference) => {
            info!("💻️ Notification {} mentions no order code. Rejected.", notification.provider_reference());
            Err(ServerError::NoOrderReference)
        },
        Err(e) => {
            error!("💻️ Could not apply payment notification {}. {e}", notification.provider_reference());
            Err(e.into())
        },
    }
}

//------------------------------------------   Renewals  ---------------------------------------------
route!(retry_renewals => Post "/renewals/retry" impl ReconciliationDatabase, PricingProvider);
/// Manually retries renewals, for the given order codes or for every order paid in the last few days.
pub async fn retry_renewals<B, P>(
    body: web::Bytes,
    options: web::Data<ServerOptions>,
    api: web::Data<PaymentFlowApi<B, P>>,
) -> Result<HttpResponse, ServerError>
where
    B: ReconciliationDatabase,
    P: PricingProvider,
{
    let RetryRequest { order_codes, force } = parse_optional_body(&body)?;
    info!("💻️ Renewal retry requested for {order_codes:?} (force: {force})");
    let today = local_today(options.utc_offset);
    let summary = api.retry_renewals(order_codes, force, today, options.retry_rescan_days).await?;
    info!(
        "💻️ Renewal retry: {} processed, {} renewed, {} skipped, {} failed",
        summary.processed,
        summary.renewed.len(),
        summary.skipped.len(),
        summary.failed.len()
    );
    Ok(HttpResponse::Ok().json(summary))
}

//------------------------------------------   Supplier rounds  ---------------------------------------------
route!(settle_round => Post "/supplier_rounds/{id}/settle" impl SupplierLedger);
pub async fn settle_round<B>(
    path: web::Path<i64>,
    body: web::Bytes,
    options: web::Data<ServerOptions>,
    api: web::Data<SupplierLedgerApi<B>>,
) -> Result<HttpResponse, ServerError>
where
    B: SupplierLedger,
{
    let round_id = path.into_inner();
    let request = parse_optional_body::<SettleRequest>(&body)?;
    let paid_amount = request.paid_amount().map_err(ServerError::InvalidRequestBody)?;
    debug!("💻️ Settling round #{round_id} with {paid_amount:?}");
    let result = api.settle_round(round_id, paid_amount, local_today(options.utc_offset)).await.map_err(|e| {
        debug!("💻️ Could not settle round #{round_id}. {e}");
        e
    })?;
    Ok(HttpResponse::Ok().json(result))
}

//------------------------------------------   Orders  ---------------------------------------------
route!(cancel_orders => Post "/orders/cancel" impl ReconciliationDatabase, PricingProvider);
pub async fn cancel_orders<B, P>(body: web::Bytes, api: web::Data<PaymentFlowApi<B, P>>) -> Result<HttpResponse, ServerError>
where
    B: ReconciliationDatabase,
    P: PricingProvider,
{
    let CancelRequest { order_codes } = parse_body(&body)?;
    let outcome = api.cancel_orders(&order_codes).await?;
    info!("💻️ {} orders canceled. {} rejected.", outcome.canceled.len(), outcome.rejected.len());
    Ok(HttpResponse::Ok().json(outcome))
}
