use std::{
    sync::{Arc, RwLock},
    time::Duration,
};

use actix_web::{dev::Server, http::KeepAlive, middleware::Logger, web, App, HttpServer};
use log::*;
use resale_engine::{MaintenanceJobState, NoBackup, PaymentFlowApi, SqliteDatabase, SupplierLedgerApi};

use crate::{
    capabilities::{ServerBackup, ServerNotifier},
    config::{ServerConfig, ServerOptions},
    errors::ServerError,
    middleware::WebhookAuthMiddlewareFactory,
    routes::{health, CancelOrdersRoute, PaymentWebhookRoute, RetryRenewalsRoute, SettleRoundRoute},
    workers::{start_maintenance_worker, start_notice_worker},
};

pub async fn run_server(config: ServerConfig) -> Result<(), ServerError> {
    let db = SqliteDatabase::open_and_migrate(&config.database_url, 25)
        .await
        .map_err(|e| ServerError::InitializeError(e.to_string()))?;
    if config.schedule.enabled {
        let backup = match &config.backup_dir {
            Some(dir) => ServerBackup::Sqlite(db.backup_service(dir)),
            None => ServerBackup::Disabled(NoBackup),
        };
        let notifier = ServerNotifier::from_url(config.notifier_url.as_deref());
        let progress = Arc::new(RwLock::new(MaintenanceJobState::default()));
        // The workers run until the process exits
        let _maintenance =
            start_maintenance_worker(db.clone(), backup, config.schedule, config.utc_offset, progress.clone());
        let _notices = start_notice_worker(db.clone(), notifier, config.schedule, config.utc_offset, progress);
    } else {
        warn!("🚀️ Scheduled jobs are disabled. Run daily maintenance out of band.");
    }
    let srv = create_server_instance(config, db)?;
    srv.await.map_err(|e| ServerError::Unspecified(e.to_string()))
}

pub fn create_server_instance(config: ServerConfig, db: SqliteDatabase) -> Result<Server, ServerError> {
    let options = ServerOptions::from_config(&config);
    let srv = HttpServer::new(move || {
        let payments_api = PaymentFlowApi::new(db.clone(), db.clone(), config.order_code_pattern.clone());
        let supplier_api = SupplierLedgerApi::new(db.clone());
        let app = App::new()
            .wrap(Logger::new("%t (%D ms) %s %a %{Host}i %U").log_target("rsl::access_log"))
            .app_data(web::Data::new(payments_api))
            .app_data(web::Data::new(supplier_api))
            .app_data(web::Data::new(options));
        // The payment provider may authenticate with a body signature or the API key
        let webhook_scope = web::scope("/webhook")
            .wrap(WebhookAuthMiddlewareFactory::new(config.auth.clone(), true))
            .service(PaymentWebhookRoute::<SqliteDatabase, SqliteDatabase>::new());
        // Operator routes only accept the API key
        let api_scope = web::scope("/api")
            .wrap(WebhookAuthMiddlewareFactory::new(config.auth.clone(), false))
            .service(RetryRenewalsRoute::<SqliteDatabase, SqliteDatabase>::new())
            .service(SettleRoundRoute::<SqliteDatabase>::new())
            .service(CancelOrdersRoute::<SqliteDatabase, SqliteDatabase>::new());
        app.service(health).service(webhook_scope).service(api_scope)
    })
    .keep_alive(KeepAlive::Timeout(Duration::from_secs(600)))
    .bind((config.host.as_str(), config.port))?
    .run();
    Ok(srv)
}
