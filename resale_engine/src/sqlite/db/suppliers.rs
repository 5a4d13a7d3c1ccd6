use chrono::{DateTime, NaiveDate, Utc};
use log::{debug, trace};
use resale_common::Amount;
use sqlx::{FromRow, SqliteConnection};

use crate::{
    db_types::{RoundStatus, SettlementEvent, Supplier, SupplierPaymentRound},
    traits::LedgerError,
};

#[derive(Debug, FromRow)]
struct RoundRow {
    id: i64,
    supplier_id: i64,
    import_value: Amount,
    paid_amount: Amount,
    label: String,
    #[sqlx(try_from = "String")]
    status: RoundStatus,
    created_at: DateTime<Utc>,
}

impl RoundRow {
    fn with_history(self, history: Vec<SettlementEvent>) -> SupplierPaymentRound {
        SupplierPaymentRound {
            id: self.id,
            supplier_id: self.supplier_id,
            import_value: self.import_value,
            paid_amount: self.paid_amount,
            label: self.label,
            status: self.status,
            history,
            created_at: self.created_at,
        }
    }
}

pub async fn fetch_supplier_by_name(name: &str, conn: &mut SqliteConnection) -> Result<Option<Supplier>, LedgerError> {
    let supplier = sqlx::query_as("SELECT id, name FROM suppliers WHERE name = ?")
        .bind(name.trim())
        .fetch_optional(conn)
        .await?;
    Ok(supplier)
}

pub async fn fetch_supplier_by_id(id: i64, conn: &mut SqliteConnection) -> Result<Option<Supplier>, LedgerError> {
    let supplier = sqlx::query_as("SELECT id, name FROM suppliers WHERE id = ?").bind(id).fetch_optional(conn).await?;
    Ok(supplier)
}

pub async fn fetch_or_create_supplier(name: &str, conn: &mut SqliteConnection) -> Result<Supplier, LedgerError> {
    let result = sqlx::query("INSERT INTO suppliers (name) VALUES (?) ON CONFLICT (name) DO NOTHING")
        .bind(name.trim())
        .execute(&mut *conn)
        .await?;
    if result.rows_affected() > 0 {
        debug!("🗃️ Created supplier record for {name}");
    }
    let supplier = sqlx::query_as("SELECT id, name FROM suppliers WHERE name = ?").bind(name.trim()).fetch_one(conn).await?;
    Ok(supplier)
}

/// Makes sure a product supply record exists for the product/supplier pair. Existing records are left untouched.
pub async fn ensure_product_supply(
    product_code: &str,
    supplier_id: i64,
    cost: Amount,
    price: Amount,
    conn: &mut SqliteConnection,
) -> Result<bool, LedgerError> {
    let result = sqlx::query(
        r#"
        INSERT INTO product_supply (product_code, supplier_id, cost_amount, price_amount) VALUES (?, ?, ?, ?)
        ON CONFLICT (product_code, supplier_id) DO NOTHING
        "#,
    )
    .bind(product_code)
    .bind(supplier_id)
    .bind(cost)
    .bind(price)
    .execute(conn)
    .await?;
    Ok(result.rows_affected() > 0)
}

pub async fn upsert_product_price(
    product_code: &str,
    supplier_id: i64,
    price: Amount,
    conn: &mut SqliteConnection,
) -> Result<(), LedgerError> {
    sqlx::query(
        r#"
        INSERT INTO product_supply (product_code, supplier_id, price_amount) VALUES (?, ?, ?)
        ON CONFLICT (product_code, supplier_id) DO UPDATE SET price_amount = excluded.price_amount,
            updated_at = CURRENT_TIMESTAMP
        "#,
    )
    .bind(product_code)
    .bind(supplier_id)
    .bind(price)
    .execute(conn)
    .await?;
    Ok(())
}

/// The listed selling price for the product from the named supplier, if one has been recorded.
pub async fn fetch_product_price(
    product_code: &str,
    supplier_name: &str,
    conn: &mut SqliteConnection,
) -> Result<Option<Amount>, LedgerError> {
    let price: Option<(Amount,)> = sqlx::query_as(
        r#"
        SELECT ps.price_amount FROM product_supply ps
        JOIN suppliers s ON s.id = ps.supplier_id
        WHERE ps.product_code = ? AND s.name = ? AND ps.price_amount > 0
        "#,
    )
    .bind(product_code)
    .bind(supplier_name.trim())
    .fetch_optional(conn)
    .await?;
    Ok(price.map(|(p,)| p))
}

async fn fetch_history(round_id: i64, conn: &mut SqliteConnection) -> Result<Vec<SettlementEvent>, LedgerError> {
    let events = sqlx::query_as(
        "SELECT amount, settled_on FROM supplier_payment_events WHERE round_id = ? ORDER BY settled_on, id",
    )
    .bind(round_id)
    .fetch_all(conn)
    .await?;
    Ok(events)
}

pub async fn fetch_round(round_id: i64, conn: &mut SqliteConnection) -> Result<Option<SupplierPaymentRound>, LedgerError> {
    let row: Option<RoundRow> =
        sqlx::query_as("SELECT * FROM supplier_payments WHERE id = ?").bind(round_id).fetch_optional(&mut *conn).await?;
    match row {
        Some(row) => {
            let history = fetch_history(row.id, conn).await?;
            Ok(Some(row.with_history(history)))
        },
        None => Ok(None),
    }
}

pub async fn fetch_rounds_for_supplier(
    supplier_id: i64,
    conn: &mut SqliteConnection,
) -> Result<Vec<SupplierPaymentRound>, LedgerError> {
    let rows: Vec<RoundRow> = sqlx::query_as("SELECT * FROM supplier_payments WHERE supplier_id = ? ORDER BY id")
        .bind(supplier_id)
        .fetch_all(&mut *conn)
        .await?;
    let mut rounds = Vec::with_capacity(rows.len());
    for row in rows {
        let history = fetch_history(row.id, conn).await?;
        rounds.push(row.with_history(history));
    }
    Ok(rounds)
}

/// The supplier's open round, ignoring `exclude`. Used as the "at most one Unpaid round" check, so it must run in the
/// same transaction as the insert it gates.
pub async fn fetch_unpaid_round_id(
    supplier_id: i64,
    exclude: Option<i64>,
    conn: &mut SqliteConnection,
) -> Result<Option<i64>, LedgerError> {
    let id: Option<(i64,)> = sqlx::query_as(
        "SELECT id FROM supplier_payments WHERE supplier_id = ? AND status = ? AND id IS NOT ? ORDER BY id LIMIT 1",
    )
    .bind(supplier_id)
    .bind(RoundStatus::Unpaid.to_string())
    .bind(exclude)
    .fetch_optional(conn)
    .await?;
    Ok(id.map(|(id,)| id))
}

pub async fn insert_round(
    supplier_id: i64,
    import_value: Amount,
    label: &str,
    conn: &mut SqliteConnection,
) -> Result<i64, LedgerError> {
    let (id,): (i64,) = sqlx::query_as(
        "INSERT INTO supplier_payments (supplier_id, import_value, paid_amount, label, status) VALUES (?, ?, 0, ?, ?) \
         RETURNING id",
    )
    .bind(supplier_id)
    .bind(import_value)
    .bind(label)
    .bind(RoundStatus::Unpaid.to_string())
    .fetch_one(conn)
    .await?;
    trace!("🗃️ Opened supplier round #{id} for supplier #{supplier_id} owing {import_value}");
    Ok(id)
}

/// Adds `amount` to what is owed in the supplier's open round, opening a round if there is none.
pub async fn accrue_to_open_round(
    supplier_id: i64,
    amount: Amount,
    label: &str,
    conn: &mut SqliteConnection,
) -> Result<i64, LedgerError> {
    match fetch_unpaid_round_id(supplier_id, None, conn).await? {
        Some(id) => {
            sqlx::query("UPDATE supplier_payments SET import_value = import_value + ? WHERE id = ? AND status = ?")
                .bind(amount)
                .bind(id)
                .bind(RoundStatus::Unpaid.to_string())
                .execute(conn)
                .await?;
            trace!("🗃️ Added {amount} to supplier round #{id}");
            Ok(id)
        },
        None => insert_round(supplier_id, amount, label, conn).await,
    }
}

pub async fn mark_round_paid(round_id: i64, paid_amount: Amount, conn: &mut SqliteConnection) -> Result<(), LedgerError> {
    sqlx::query("UPDATE supplier_payments SET status = ?, paid_amount = ? WHERE id = ?")
        .bind(RoundStatus::Paid.to_string())
        .bind(paid_amount)
        .bind(round_id)
        .execute(conn)
        .await?;
    Ok(())
}

pub async fn insert_settlement_event(
    round_id: i64,
    amount: Amount,
    settled_on: NaiveDate,
    conn: &mut SqliteConnection,
) -> Result<(), LedgerError> {
    sqlx::query("INSERT INTO supplier_payment_events (round_id, amount, settled_on) VALUES (?, ?, ?)")
        .bind(round_id)
        .bind(amount)
        .bind(settled_on)
        .execute(conn)
        .await?;
    Ok(())
}
