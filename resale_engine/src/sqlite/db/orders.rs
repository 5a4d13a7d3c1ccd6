use log::{debug, trace};
use sqlx::{QueryBuilder, Sqlite, SqliteConnection};

use crate::{
    db_types::{NewOrder, Order, OrderStatus, Partition},
    traits::{LedgerError, RenewalUpdate},
};

/// Columns shared by the active table and the archive partitions, in table order.
const ORDER_COLUMNS: &str = "id, order_code, product_code, customer_info, contact_link, slot, registration_date, \
                             duration_days, expiry_date, supplier_name, cost_amount, price_amount, note, status, \
                             check_flag, created_at, updated_at";

/// Inserts the order into the active partition, returning `false` in the second parameter if an order with the same
/// code already exists in any partition. Archived orders never come back.
pub async fn idempotent_insert(order: NewOrder, conn: &mut SqliteConnection) -> Result<(Order, bool), LedgerError> {
    if let Some(existing) = fetch_order(&order.order_code, conn).await? {
        return Ok((existing, false));
    }
    for partition in [Partition::Expired, Partition::Canceled] {
        if let Some(existing) = fetch_archived_order(&order.order_code, partition, conn).await? {
            debug!("🗃️ Order [{}] is already archived as {partition}. Not re-inserting it.", order.order_code);
            return Ok((existing, false));
        }
    }
    let order = insert_order(order, conn).await?;
    debug!("🗃️ Order [{}] inserted with id {}", order.order_code, order.id);
    Ok((order, true))
}

/// Inserts a new order into the active partition using the given connection. This is not atomic. You can embed this
/// call inside a transaction if you need to ensure atomicity, and pass `&mut *tx` as the connection argument.
async fn insert_order(order: NewOrder, conn: &mut SqliteConnection) -> Result<Order, LedgerError> {
    let status = order.status.unwrap_or(OrderStatus::Unpaid).to_string();
    let order = sqlx::query_as(
        r#"
            INSERT INTO orders (
                order_code,
                product_code,
                customer_info,
                contact_link,
                slot,
                registration_date,
                duration_days,
                expiry_date,
                supplier_name,
                cost_amount,
                price_amount,
                note,
                status
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            RETURNING *;
        "#,
    )
    .bind(&order.order_code)
    .bind(&order.product_code)
    .bind(&order.customer_info)
    .bind(&order.contact_link)
    .bind(&order.slot)
    .bind(order.registration_date())
    .bind(order.duration_days())
    .bind(order.expiry_date())
    .bind(order.supplier_name.trim())
    .bind(order.cost_amount())
    .bind(order.price_amount())
    .bind(&order.note)
    .bind(status)
    .fetch_one(conn)
    .await?;
    Ok(order)
}

pub async fn fetch_order(order_code: &str, conn: &mut SqliteConnection) -> Result<Option<Order>, LedgerError> {
    let order = sqlx::query_as("SELECT * FROM orders WHERE order_code = ?")
        .bind(order_code.trim())
        .fetch_optional(conn)
        .await?;
    Ok(order)
}

pub async fn fetch_archived_order(
    order_code: &str,
    partition: Partition,
    conn: &mut SqliteConnection,
) -> Result<Option<Order>, LedgerError> {
    let sql = format!("SELECT {ORDER_COLUMNS} FROM {} WHERE order_code = ?", partition.table_name());
    let order = sqlx::query_as(&sql).bind(order_code.trim()).fetch_optional(conn).await?;
    Ok(order)
}

/// Returns the partition holding the order. Partitions are mutually exclusive, so the first hit wins.
pub async fn locate_order(order_code: &str, conn: &mut SqliteConnection) -> Result<Option<Partition>, LedgerError> {
    for partition in [Partition::Active, Partition::Expired, Partition::Canceled] {
        let sql = format!("SELECT id FROM {} WHERE order_code = ?", partition.table_name());
        let found: Option<(i64,)> = sqlx::query_as(&sql).bind(order_code.trim()).fetch_optional(&mut *conn).await?;
        if found.is_some() {
            return Ok(Some(partition));
        }
    }
    Ok(None)
}

pub async fn fetch_active_orders(conn: &mut SqliteConnection) -> Result<Vec<Order>, LedgerError> {
    let orders = sqlx::query_as("SELECT * FROM orders ORDER BY id").fetch_all(conn).await?;
    Ok(orders)
}

/// Processing orders for a supplier, in settlement order: earliest registration first, orders without a registration
/// date last, then by id.
pub async fn fetch_processing_orders_for_supplier(
    supplier_name: &str,
    conn: &mut SqliteConnection,
) -> Result<Vec<Order>, LedgerError> {
    let orders = sqlx::query_as(
        r#"
        SELECT * FROM orders
        WHERE supplier_name = ? COLLATE NOCASE AND status = ?
        ORDER BY registration_date IS NULL, registration_date, id
        "#,
    )
    .bind(supplier_name)
    .bind(OrderStatus::Processing.to_string())
    .fetch_all(conn)
    .await?;
    Ok(orders)
}

/// Sets the status of an order. With `expected`, this is a conditional update that only lands while the order is still
/// in the expected status, so that two writers cannot both apply the same transition.
pub async fn update_status(
    order_code: &str,
    expected: Option<OrderStatus>,
    status: OrderStatus,
    conn: &mut SqliteConnection,
) -> Result<bool, LedgerError> {
    let mut builder = QueryBuilder::<Sqlite>::new("UPDATE orders SET status = ");
    builder.push_bind(status.to_string());
    builder.push(", updated_at = CURRENT_TIMESTAMP WHERE order_code = ");
    builder.push_bind(order_code.trim());
    if let Some(expected) = expected {
        builder.push(" AND status = ");
        builder.push_bind(expected.to_string());
    }
    let result = builder.build().execute(conn).await?;
    let changed = result.rows_affected() > 0;
    trace!("🗃️ Order [{order_code}] status -> {status}: changed={changed}");
    Ok(changed)
}

pub async fn update_status_by_id(
    id: i64,
    expected: OrderStatus,
    status: OrderStatus,
    conn: &mut SqliteConnection,
) -> Result<bool, LedgerError> {
    let result =
        sqlx::query("UPDATE orders SET status = ?, updated_at = CURRENT_TIMESTAMP WHERE id = ? AND status = ?")
            .bind(status.to_string())
            .bind(id)
            .bind(expected.to_string())
            .execute(conn)
            .await?;
    Ok(result.rows_affected() > 0)
}

pub async fn set_check_flag(
    order_code: &str,
    expected: Option<bool>,
    flag: Option<bool>,
    conn: &mut SqliteConnection,
) -> Result<bool, LedgerError> {
    let result = sqlx::query(
        "UPDATE orders SET check_flag = ?, updated_at = CURRENT_TIMESTAMP WHERE order_code = ? AND check_flag IS ?",
    )
    .bind(flag)
    .bind(order_code.trim())
    .bind(expected)
    .execute(conn)
    .await?;
    Ok(result.rows_affected() > 0)
}

/// Copies an active order into an archive partition. The insert tolerates the order already being there, so a retried
/// archive neither fails nor duplicates. The active row is left in place; see [`delete_orders`].
pub async fn archive_order(id: i64, partition: Partition, conn: &mut SqliteConnection) -> Result<(), LedgerError> {
    let sql = format!(
        "INSERT INTO {table} ({ORDER_COLUMNS}) SELECT {ORDER_COLUMNS} FROM orders WHERE id = ? ON CONFLICT DO NOTHING",
        table = partition.table_name()
    );
    sqlx::query(&sql).bind(id).execute(conn).await?;
    Ok(())
}

pub async fn delete_orders(ids: &[i64], conn: &mut SqliteConnection) -> Result<u64, LedgerError> {
    if ids.is_empty() {
        return Ok(0);
    }
    let mut builder = QueryBuilder::<Sqlite>::new("DELETE FROM orders WHERE id IN (");
    let mut separated = builder.separated(", ");
    for id in ids {
        separated.push_bind(*id);
    }
    separated.push_unseparated(")");
    let result = builder.build().execute(conn).await?;
    Ok(result.rows_affected())
}

/// The conditional renewal write. Returns `None` if the order is no longer in the state the renewal was computed from.
pub async fn renew_order(renewal: &RenewalUpdate, conn: &mut SqliteConnection) -> Result<Option<Order>, LedgerError> {
    let order = sqlx::query_as(
        r#"
        UPDATE orders SET
            expiry_date = ?,
            price_amount = ?,
            status = ?,
            check_flag = NULL,
            updated_at = CURRENT_TIMESTAMP
        WHERE order_code = ? AND status = ? AND expiry_date IS ?
        RETURNING *
        "#,
    )
    .bind(renewal.new_expiry_date)
    .bind(renewal.new_price)
    .bind(OrderStatus::Paid.to_string())
    .bind(renewal.order_code.trim())
    .bind(renewal.expected_status.to_string())
    .bind(renewal.expected_expiry_date)
    .fetch_optional(conn)
    .await?;
    Ok(order)
}
