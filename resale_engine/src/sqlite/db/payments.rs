use chrono::{DateTime, NaiveDate, Utc};
use log::debug;
use resale_common::Amount;
use sqlx::{FromRow, SqliteConnection};

use crate::{
    db_types::{NewPaymentReceipt, PaymentReceipt},
    traits::{InsertReceiptResult, LedgerError},
};

#[derive(Debug, FromRow)]
struct ReceiptRow {
    id: i64,
    provider_ref: String,
    paid_at: NaiveDate,
    amount: Amount,
    sender: String,
    receiver: String,
    note: String,
    created_at: DateTime<Utc>,
}

impl ReceiptRow {
    fn into_receipt(self, order_codes: Vec<String>) -> PaymentReceipt {
        PaymentReceipt {
            id: self.id,
            provider_ref: self.provider_ref,
            order_codes,
            paid_at: self.paid_at,
            amount: self.amount,
            sender: self.sender,
            receiver: self.receiver,
            note: self.note,
            created_at: self.created_at,
        }
    }
}

/// Inserts the receipt, unless one with the same provider reference is already stored. This is the idempotency
/// boundary for payment notifications: however many times a notification is retried, at most one row exists for it.
pub async fn idempotent_insert(
    receipt: &NewPaymentReceipt,
    conn: &mut SqliteConnection,
) -> Result<InsertReceiptResult, LedgerError> {
    let inserted: Option<(i64,)> = sqlx::query_as(
        r#"
        INSERT INTO payments (provider_ref, paid_at, amount, sender, receiver, note)
        VALUES ($1, $2, $3, $4, $5, $6)
        ON CONFLICT (provider_ref) DO NOTHING
        RETURNING id
        "#,
    )
    .bind(&receipt.provider_ref)
    .bind(receipt.paid_at)
    .bind(receipt.amount)
    .bind(&receipt.sender)
    .bind(&receipt.receiver)
    .bind(&receipt.note)
    .fetch_optional(&mut *conn)
    .await?;
    let id = match inserted {
        Some((id,)) => id,
        None => {
            let (id,): (i64,) = sqlx::query_as("SELECT id FROM payments WHERE provider_ref = ?")
                .bind(&receipt.provider_ref)
                .fetch_one(conn)
                .await?;
            debug!("🗃️ Payment [{}] already exists with id {id}", receipt.provider_ref);
            return Ok(InsertReceiptResult::AlreadyExists(id));
        },
    };
    for (position, code) in receipt.order_codes.iter().enumerate() {
        sqlx::query("INSERT INTO payment_orders (payment_id, position, order_code) VALUES (?, ?, ?)")
            .bind(id)
            .bind(i64::try_from(position).unwrap_or(i64::MAX))
            .bind(code)
            .execute(&mut *conn)
            .await?;
    }
    debug!("🗃️ Payment [{}] saved with id {id} for {} order(s)", receipt.provider_ref, receipt.order_codes.len());
    Ok(InsertReceiptResult::Inserted(id))
}

async fn order_codes_for(payment_id: i64, conn: &mut SqliteConnection) -> Result<Vec<String>, LedgerError> {
    let codes: Vec<(String,)> =
        sqlx::query_as("SELECT order_code FROM payment_orders WHERE payment_id = ? ORDER BY position")
            .bind(payment_id)
            .fetch_all(conn)
            .await?;
    Ok(codes.into_iter().map(|(c,)| c).collect())
}

pub async fn fetch_receipt(
    provider_ref: &str,
    conn: &mut SqliteConnection,
) -> Result<Option<PaymentReceipt>, LedgerError> {
    let row: Option<ReceiptRow> = sqlx::query_as("SELECT * FROM payments WHERE provider_ref = ?")
        .bind(provider_ref)
        .fetch_optional(&mut *conn)
        .await?;
    match row {
        Some(row) => {
            let codes = order_codes_for(row.id, conn).await?;
            Ok(Some(row.into_receipt(codes)))
        },
        None => Ok(None),
    }
}

pub async fn fetch_receipts_for_order(
    order_code: &str,
    conn: &mut SqliteConnection,
) -> Result<Vec<PaymentReceipt>, LedgerError> {
    let rows: Vec<ReceiptRow> = sqlx::query_as(
        r#"
        SELECT p.* FROM payments p
        JOIN payment_orders po ON po.payment_id = p.id
        WHERE po.order_code = ?
        ORDER BY p.id
        "#,
    )
    .bind(order_code.trim())
    .fetch_all(&mut *conn)
    .await?;
    let mut receipts = Vec::with_capacity(rows.len());
    for row in rows {
        let codes = order_codes_for(row.id, conn).await?;
        receipts.push(row.into_receipt(codes));
    }
    Ok(receipts)
}

/// Distinct order codes referenced by receipts paid on or after `since` that have not yet been applied to the order,
/// oldest receipt first.
pub async fn unapplied_order_codes(since: NaiveDate, conn: &mut SqliteConnection) -> Result<Vec<String>, LedgerError> {
    let codes: Vec<(String,)> = sqlx::query_as(
        r#"
        SELECT UPPER(po.order_code) AS code FROM payment_orders po
        JOIN payments p ON p.id = po.payment_id
        WHERE p.paid_at >= ? AND po.applied_as IS NULL
        GROUP BY code
        ORDER BY MIN(p.id)
        "#,
    )
    .bind(since)
    .fetch_all(conn)
    .await?;
    Ok(codes.into_iter().map(|(c,)| c).collect())
}

/// The oldest payment for the order that has not yet been applied to it.
pub async fn oldest_unapplied_payment(
    order_code: &str,
    conn: &mut SqliteConnection,
) -> Result<Option<i64>, LedgerError> {
    let id: Option<(i64,)> = sqlx::query_as(
        "SELECT payment_id FROM payment_orders WHERE order_code = ? AND applied_as IS NULL ORDER BY payment_id LIMIT 1",
    )
    .bind(order_code.trim())
    .fetch_optional(conn)
    .await?;
    Ok(id.map(|(id,)| id))
}

/// Records that the payment paid for the order outright. Returns false if the payment was already applied to it.
pub async fn mark_initial_payment(
    payment_id: i64,
    order_code: &str,
    conn: &mut SqliteConnection,
) -> Result<bool, LedgerError> {
    let result = sqlx::query(
        "UPDATE payment_orders SET applied_as = 'initial' WHERE payment_id = ? AND order_code = ? AND applied_as IS NULL",
    )
    .bind(payment_id)
    .bind(order_code.trim())
    .execute(conn)
    .await?;
    Ok(result.rows_affected() > 0)
}

/// Claims the payment for a renewal of the order. Returns `None` if there is no such payment, or it has already been
/// applied. Otherwise returns whether the payment has already credited the order's supplier.
pub async fn claim_for_renewal(
    payment_id: i64,
    order_code: &str,
    conn: &mut SqliteConnection,
) -> Result<Option<bool>, LedgerError> {
    let claimed: Option<(bool,)> = sqlx::query_as(
        r#"
        UPDATE payment_orders SET applied_as = 'renewal'
        WHERE payment_id = ? AND order_code = ? AND applied_as IS NULL
        RETURNING supplier_credited
        "#,
    )
    .bind(payment_id)
    .bind(order_code.trim())
    .fetch_optional(conn)
    .await?;
    Ok(claimed.map(|(credited,)| credited))
}

pub async fn mark_supplier_credited(
    payment_id: i64,
    order_code: &str,
    conn: &mut SqliteConnection,
) -> Result<(), LedgerError> {
    sqlx::query("UPDATE payment_orders SET supplier_credited = TRUE WHERE payment_id = ? AND order_code = ?")
        .bind(payment_id)
        .bind(order_code.trim())
        .execute(conn)
        .await?;
    Ok(())
}
