//! `SqliteDatabase` is a concrete implementation of a reseller ledger backend.
//!
//! Unsurprisingly, it uses SQLite as the backend and implements all the traits defined in the [`crate::traits`]
//! module, as well as the pricing capability.
use std::{fmt::Debug, path::Path};

use chrono::NaiveDate;
use log::*;
use resale_common::Amount;
use sqlx::{SqliteConnection, SqlitePool};

use super::{
    db::{create_database_if_not_exist, db_url, new_pool, orders, payments, run_migrations, suppliers},
    SqliteBackup,
};
use crate::{
    db_types::{
        NewOrder,
        NewPaymentReceipt,
        NoticeKind,
        Order,
        OrderStatus,
        Partition,
        PaymentReceipt,
        RoundStatus,
        Supplier,
        SupplierPaymentRound,
    },
    helpers::format_dmy,
    ledger_api::{
        capabilities::{PricingError, PricingProvider},
        renewal::{order_renewal_eligibility, RENEWAL_WINDOW_DAYS},
    },
    traits::{
        CancelOutcome,
        LedgerError,
        MaintenanceReport,
        OrderLedger,
        OrderPreState,
        PaymentApplication,
        PaymentLedger,
        ReconciliationDatabase,
        RenewalUpdate,
        SettlementResult,
        SupplierAccrual,
        SupplierLedger,
    },
};

#[derive(Clone)]
pub struct SqliteDatabase {
    url: String,
    pool: SqlitePool,
}

impl Debug for SqliteDatabase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "SqliteDatabase ({:?})", self.pool)
    }
}

/// Credits the order's cost to its supplier's open round, creating the supplier and its product supply record if
/// this is the first time the pair has been seen. Orders without a supplier or a cost are skipped.
async fn accrue_order_cost(
    order: &Order,
    today: NaiveDate,
    conn: &mut SqliteConnection,
) -> Result<Option<SupplierAccrual>, LedgerError> {
    let supplier_name = order.supplier_name.trim();
    if supplier_name.is_empty() {
        debug!("🗃️ Order [{}] has no supplier. No amount attributed.", order.order_code);
        return Ok(None);
    }
    let supplier = suppliers::fetch_or_create_supplier(supplier_name, conn).await?;
    if suppliers::ensure_product_supply(&order.product_code, supplier.id, order.cost_amount, order.price_amount, conn)
        .await?
    {
        debug!("🗃️ Recorded product supply {} from {}", order.product_code, supplier.name);
    }
    if !order.cost_amount.is_positive() {
        debug!("🗃️ Order [{}] has no cost. No amount attributed to {}.", order.order_code, supplier.name);
        return Ok(None);
    }
    let label = format!("Opened {}", format_dmy(today));
    let round_id = suppliers::accrue_to_open_round(supplier.id, order.cost_amount, &label, conn).await?;
    Ok(Some(SupplierAccrual { supplier_name: supplier.name, round_id, amount: order.cost_amount }))
}

/// Copies an order into an archive partition, refusing statuses the partition does not admit.
async fn archive_into(order: &Order, partition: Partition, conn: &mut SqliteConnection) -> Result<(), LedgerError> {
    if !partition.admits(order.status) {
        return Err(LedgerError::InvalidArchive {
            order_code: order.order_code.clone(),
            partition,
            status: order.status.to_string(),
        });
    }
    orders::archive_order(order.id, partition, conn).await
}

fn attributable(order: &Order) -> bool {
    !matches!(order.status, OrderStatus::Canceled) && !order.status.needs_unpaid_reset()
}

impl OrderLedger for SqliteDatabase {
    async fn insert_order(&self, order: NewOrder) -> Result<(Order, bool), LedgerError> {
        let mut tx = self.pool.begin().await?;
        let result = orders::idempotent_insert(order, &mut tx).await?;
        tx.commit().await?;
        Ok(result)
    }

    async fn fetch_order(&self, order_code: &str) -> Result<Option<Order>, LedgerError> {
        let mut conn = self.pool.acquire().await?;
        orders::fetch_order(order_code, &mut conn).await
    }

    async fn fetch_archived_order(&self, order_code: &str, partition: Partition) -> Result<Option<Order>, LedgerError> {
        let mut conn = self.pool.acquire().await?;
        orders::fetch_archived_order(order_code, partition, &mut conn).await
    }

    async fn locate_order(&self, order_code: &str) -> Result<Option<Partition>, LedgerError> {
        let mut conn = self.pool.acquire().await?;
        orders::locate_order(order_code, &mut conn).await
    }

    async fn fetch_active_orders(&self) -> Result<Vec<Order>, LedgerError> {
        let mut conn = self.pool.acquire().await?;
        orders::fetch_active_orders(&mut conn).await
    }

    async fn transition_status(
        &self,
        order_code: &str,
        expected: Option<OrderStatus>,
        status: OrderStatus,
    ) -> Result<bool, LedgerError> {
        let mut conn = self.pool.acquire().await?;
        orders::update_status(order_code, expected, status, &mut conn).await
    }

    async fn set_check_flag(
        &self,
        order_code: &str,
        expected: Option<bool>,
        flag: Option<bool>,
    ) -> Result<bool, LedgerError> {
        let mut conn = self.pool.acquire().await?;
        orders::set_check_flag(order_code, expected, flag, &mut conn).await
    }

    async fn cancel_orders(&self, order_codes: &[String]) -> Result<CancelOutcome, LedgerError> {
        let mut tx = self.pool.begin().await?;
        let mut outcome = CancelOutcome::default();
        for code in order_codes {
            let order = match orders::fetch_order(code, &mut tx).await? {
                Some(o) if Partition::Canceled.admits(o.status) => o,
                Some(o) => {
                    debug!("🗃️ Order [{code}] is {} and cannot be moved to the canceled partition", o.status);
                    outcome.rejected.push(code.clone());
                    continue;
                },
                None => {
                    outcome.rejected.push(code.clone());
                    continue;
                },
            };
            archive_into(&order, Partition::Canceled, &mut tx).await?;
            orders::delete_orders(&[order.id], &mut tx).await?;
            outcome.canceled.push(order.order_code);
        }
        tx.commit().await?;
        info!("🗃️ {} orders moved to the canceled partition", outcome.canceled.len());
        Ok(outcome)
    }
}

impl PaymentLedger for SqliteDatabase {
    async fn fetch_receipt(&self, provider_ref: &str) -> Result<Option<PaymentReceipt>, LedgerError> {
        let mut conn = self.pool.acquire().await?;
        payments::fetch_receipt(provider_ref, &mut conn).await
    }

    async fn fetch_receipts_for_order(&self, order_code: &str) -> Result<Vec<PaymentReceipt>, LedgerError> {
        let mut conn = self.pool.acquire().await?;
        payments::fetch_receipts_for_order(order_code, &mut conn).await
    }

    async fn unapplied_receipt_order_codes(&self, since: NaiveDate) -> Result<Vec<String>, LedgerError> {
        let mut conn = self.pool.acquire().await?;
        payments::unapplied_order_codes(since, &mut conn).await
    }

    async fn unapplied_payment_id(&self, order_code: &str) -> Result<Option<i64>, LedgerError> {
        let mut conn = self.pool.acquire().await?;
        payments::oldest_unapplied_payment(order_code, &mut conn).await
    }
}

impl SupplierLedger for SqliteDatabase {
    async fn fetch_supplier(&self, name: &str) -> Result<Option<Supplier>, LedgerError> {
        let mut conn = self.pool.acquire().await?;
        suppliers::fetch_supplier_by_name(name, &mut conn).await
    }

    async fn fetch_round(&self, round_id: i64) -> Result<Option<SupplierPaymentRound>, LedgerError> {
        let mut conn = self.pool.acquire().await?;
        suppliers::fetch_round(round_id, &mut conn).await
    }

    async fn fetch_rounds_for_supplier(&self, supplier_id: i64) -> Result<Vec<SupplierPaymentRound>, LedgerError> {
        let mut conn = self.pool.acquire().await?;
        suppliers::fetch_rounds_for_supplier(supplier_id, &mut conn).await
    }

    async fn open_round(
        &self,
        supplier_name: &str,
        import_value: Amount,
        label: &str,
    ) -> Result<SupplierPaymentRound, LedgerError> {
        let mut tx = self.pool.begin().await?;
        let supplier = suppliers::fetch_or_create_supplier(supplier_name, &mut tx).await?;
        if suppliers::fetch_unpaid_round_id(supplier.id, None, &mut tx).await?.is_some() {
            return Err(LedgerError::OpenRoundExists(supplier.name));
        }
        let id = suppliers::insert_round(supplier.id, import_value, label, &mut tx).await?;
        let round = suppliers::fetch_round(id, &mut tx).await?.ok_or(LedgerError::RoundNotFound(id))?;
        tx.commit().await?;
        Ok(round)
    }

    async fn settle_round(
        &self,
        round_id: i64,
        paid_amount: Option<Amount>,
        settled_on: NaiveDate,
    ) -> Result<SettlementResult, LedgerError> {
        let mut tx = self.pool.begin().await?;
        let round = suppliers::fetch_round(round_id, &mut tx).await?.ok_or(LedgerError::RoundNotFound(round_id))?;
        if round.status == RoundStatus::Paid {
            warn!("🗃️ Supplier round #{round_id} is already paid. Settling it again.");
        }
        let paid = paid_amount.unwrap_or(round.import_value);
        let supplier = suppliers::fetch_supplier_by_id(round.supplier_id, &mut tx)
            .await?
            .ok_or_else(|| LedgerError::DatabaseError(format!("Round #{round_id} has no supplier")))?;
        let processing = orders::fetch_processing_orders_for_supplier(&supplier.name, &mut tx).await?;
        let total_cost = processing.iter().map(|o| o.cost_amount).sum::<Amount>();
        let mut covered = Amount::default();
        let mut settled_orders = Vec::new();
        for order in &processing {
            if covered + order.cost_amount > paid {
                break;
            }
            covered += order.cost_amount;
            if orders::update_status_by_id(order.id, OrderStatus::Processing, OrderStatus::Paid, &mut tx).await? {
                settled_orders.push(order.order_code.clone());
            }
        }
        let carryover = total_cost - paid;
        let mut carryover_round_id = None;
        if carryover.is_positive() {
            match suppliers::fetch_unpaid_round_id(supplier.id, Some(round_id), &mut tx).await? {
                Some(open) => {
                    debug!("🗃️ {} already has open round #{open}. Not carrying {carryover} over.", supplier.name)
                },
                None => {
                    let label = format!("Carryover from round #{round_id}");
                    carryover_round_id = Some(suppliers::insert_round(supplier.id, carryover, &label, &mut tx).await?);
                },
            }
        }
        suppliers::mark_round_paid(round_id, paid, &mut tx).await?;
        suppliers::insert_settlement_event(round_id, paid, settled_on, &mut tx).await?;
        let round = suppliers::fetch_round(round_id, &mut tx).await?.ok_or(LedgerError::RoundNotFound(round_id))?;
        let carryover_round = match carryover_round_id {
            Some(id) => suppliers::fetch_round(id, &mut tx).await?,
            None => None,
        };
        tx.commit().await?;
        info!(
            "🗃️ Round #{round_id} for {} settled with {paid}. {} orders paid, carryover {carryover}",
            supplier.name,
            settled_orders.len()
        );
        Ok(SettlementResult { round, settled_orders, carryover, carryover_round })
    }
}

impl ReconciliationDatabase for SqliteDatabase {
    fn url(&self) -> &str {
        self.url.as_str()
    }

    async fn apply_payment(
        &self,
        receipt: NewPaymentReceipt,
        today: NaiveDate,
    ) -> Result<PaymentApplication, LedgerError> {
        let mut tx = self.pool.begin().await?;
        let mut pre_states = Vec::with_capacity(receipt.order_codes.len());
        for code in &receipt.order_codes {
            let order = orders::fetch_order(code, &mut tx).await?;
            let eligibility = order.as_ref().map(|o| order_renewal_eligibility(o, today, false));
            pre_states.push(OrderPreState { order_code: code.clone(), order, eligibility });
        }
        let inserted = payments::idempotent_insert(&receipt, &mut tx).await?;
        if !inserted.inserted() {
            tx.commit().await?;
            return Ok(PaymentApplication { pre_states, ..PaymentApplication::already_applied(inserted.id()) });
        }
        let payment_id = inserted.id();
        let mut marked_paid = Vec::new();
        for state in &pre_states {
            let Some(order) = state.order.as_ref() else {
                warn!("🗃️ Payment [{}] references unknown order {}", receipt.provider_ref, state.order_code);
                continue;
            };
            if state.is_renewal() || order.status != OrderStatus::Unpaid {
                continue;
            }
            if orders::update_status(&order.order_code, Some(OrderStatus::Unpaid), OrderStatus::Paid, &mut tx).await? {
                payments::mark_initial_payment(payment_id, &order.order_code, &mut tx).await?;
                marked_paid.push(order.order_code.clone());
            }
        }
        let accrual = match (receipt.single_order_code(), pre_states.first()) {
            (Some(_), Some(OrderPreState { order: Some(order), .. })) if !pre_states[0].is_renewal() => {
                if attributable(order) {
                    // A later renewal against this payment must not credit the supplier again
                    payments::mark_supplier_credited(payment_id, &order.order_code, &mut tx).await?;
                    accrue_order_cost(order, today, &mut tx).await?
                } else {
                    debug!("🗃️ Order [{}] is {}. No amount attributed.", order.order_code, order.status);
                    None
                }
            },
            (None, _) if receipt.order_codes.len() > 1 => {
                info!(
                    "🗃️ Payment [{}] references {} orders. Skipping supplier attribution.",
                    receipt.provider_ref,
                    receipt.order_codes.len()
                );
                None
            },
            _ => None,
        };
        tx.commit().await?;
        Ok(PaymentApplication { receipt: inserted, pre_states, marked_paid, accrual })
    }

    async fn apply_renewal(&self, renewal: RenewalUpdate) -> Result<Option<Order>, LedgerError> {
        let mut tx = self.pool.begin().await?;
        let Some(credited) = payments::claim_for_renewal(renewal.payment_id, &renewal.order_code, &mut tx).await? else {
            debug!(
                "🗃️ Payment #{} is not available to renew order [{}]. It has already been applied.",
                renewal.payment_id, renewal.order_code
            );
            return Ok(None);
        };
        let order = match orders::renew_order(&renewal, &mut tx).await? {
            Some(order) => order,
            None => {
                debug!("🗃️ Order [{}] changed before the renewal could be written", renewal.order_code);
                return Ok(None);
            },
        };
        if credited {
            debug!("🗃️ Payment #{} already credited the supplier of [{}]", renewal.payment_id, order.order_code);
        } else {
            payments::mark_supplier_credited(renewal.payment_id, &order.order_code, &mut tx).await?;
            if let Some(accrual) = accrue_order_cost(&order, renewal.renewed_on, &mut tx).await? {
                trace!(
                    "🗃️ Renewal of [{}] credited {} to round #{}",
                    order.order_code,
                    accrual.amount,
                    accrual.round_id
                );
            }
        }
        tx.commit().await?;
        Ok(Some(order))
    }

    async fn run_daily_maintenance(&self, today: NaiveDate) -> Result<MaintenanceReport, LedgerError> {
        let mut tx = self.pool.begin().await?;
        let active = orders::fetch_active_orders(&mut tx).await?;
        let lapsed = active
            .iter()
            .filter(|o| o.status.is_expirable() && o.days_remaining(today).map(|d| d < 0).unwrap_or(false))
            .collect::<Vec<_>>();
        let mut report = MaintenanceReport::default();
        for order in &lapsed {
            archive_into(order, Partition::Expired, &mut tx).await?;
            report.archived.push(order.order_code.clone());
        }
        for order in &active {
            let in_window = order.days_remaining(today).map(|d| (0..=RENEWAL_WINDOW_DAYS).contains(&d)).unwrap_or(false);
            if order.status == OrderStatus::Paid &&
                in_window &&
                orders::update_status_by_id(order.id, OrderStatus::Paid, OrderStatus::Renewal, &mut tx).await?
            {
                report.moved_to_renewal.push(order.order_code.clone());
            }
        }
        let lapsed_ids = lapsed.iter().map(|o| o.id).collect::<Vec<_>>();
        let deleted = orders::delete_orders(&lapsed_ids, &mut tx).await?;
        trace!("🗃️ {deleted} archived orders removed from the active partition");
        for order in &active {
            let due_today = order.days_remaining(today) == Some(0);
            let now_renewal = order.status == OrderStatus::Renewal || report.moved_to_renewal.contains(&order.order_code);
            if due_today &&
                now_renewal &&
                orders::update_status_by_id(order.id, OrderStatus::Renewal, OrderStatus::Expired, &mut tx).await?
            {
                report.expired.push(order.order_code.clone());
            }
        }
        tx.commit().await?;
        Ok(report)
    }

    async fn orders_due_for_notice(&self, kind: NoticeKind, today: NaiveDate) -> Result<Vec<Order>, LedgerError> {
        let mut conn = self.pool.acquire().await?;
        let orders = orders::fetch_active_orders(&mut conn).await?;
        Ok(orders.into_iter().filter(|o| kind.selects(o, today)).collect())
    }
}

impl PricingProvider for SqliteDatabase {
    /// The listed price for the order's product and supplier, or the order's current price if none is listed.
    async fn current_price(&self, order: &Order, _as_of: NaiveDate) -> Result<Amount, PricingError> {
        let mut conn = self.pool.acquire().await.map_err(|e| PricingError::LookupFailed(e.to_string()))?;
        let listed = suppliers::fetch_product_price(&order.product_code, &order.supplier_name, &mut conn)
            .await
            .map_err(|e| PricingError::LookupFailed(e.to_string()))?;
        match listed {
            Some(price) => Ok(price),
            None if order.price_amount.is_positive() => Ok(order.price_amount),
            None => Err(PricingError::NoPrice(order.product_code.clone())),
        }
    }
}

impl SqliteDatabase {
    /// Creates a new database API object
    pub async fn new(max_connections: u32) -> Result<Self, sqlx::Error> {
        let url = db_url();
        SqliteDatabase::new_with_url(url.as_str(), max_connections).await
    }

    pub async fn new_with_url(url: &str, max_connections: u32) -> Result<Self, sqlx::Error> {
        trace!("Creating new database connection pool with url {url}");
        let pool = new_pool(url, max_connections).await?;
        let url = url.to_string();
        Ok(Self { url, pool })
    }

    /// Opens the ledger at `url`, creating the database if it does not exist yet, and brings its schema up to date
    /// with the embedded migrations.
    pub async fn open_and_migrate(url: &str, max_connections: u32) -> Result<Self, sqlx::Error> {
        if create_database_if_not_exist(url).await? {
            info!("🗃️ Created a new, empty ledger database");
        }
        let db = SqliteDatabase::new_with_url(url, max_connections).await?;
        db.migrate().await?;
        Ok(db)
    }

    /// Applies any embedded migrations that have not been run against this database yet.
    pub async fn migrate(&self) -> Result<(), sqlx::Error> {
        run_migrations(&self.pool).await?;
        Ok(())
    }

    /// Returns a reference to the database connection pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// A backup service writing into `dir`, sharing this database's pool.
    pub fn backup_service<P: AsRef<Path>>(&self, dir: P) -> SqliteBackup {
        SqliteBackup::new(self.pool.clone(), dir)
    }

    /// Sets the listed selling price of a product from a supplier. Renewals are priced from this list.
    pub async fn set_product_price(&self, product_code: &str, supplier_name: &str, price: Amount) -> Result<(), LedgerError> {
        let mut tx = self.pool.begin().await?;
        let supplier = suppliers::fetch_or_create_supplier(supplier_name, &mut tx).await?;
        suppliers::upsert_product_price(product_code, supplier.id, price, &mut tx).await?;
        tx.commit().await?;
        Ok(())
    }
}
