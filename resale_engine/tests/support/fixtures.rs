use chrono::{Duration, NaiveDate};
use resale_engine::{
    db_types::{NewOrder, Order, OrderStatus},
    traits::OrderLedger,
    SqliteDatabase,
};

pub fn today() -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 3, 10).unwrap()
}

pub fn days_from_today(days: i64) -> NaiveDate {
    today() + Duration::days(days)
}

pub fn dmy(date: NaiveDate) -> String {
    date.format("%d/%m/%Y").to_string()
}

/// A 30-day order from "Acme" costing 50,000 and selling for 80,000, expiring `days` from today.
pub fn order_expiring_in(code: &str, days: i64, status: OrderStatus) -> NewOrder {
    NewOrder::new(code, "NETFLIX-1M")
        .with_registration(dmy(days_from_today(days - 29)), "30 days".to_string())
        .with_supplier("Acme", "50,000")
        .with_price("80,000")
        .with_customer("Jane", "fb.com/jane")
        .with_slot("A1")
        .with_status(status)
}

pub async fn seed(db: &SqliteDatabase, order: NewOrder) -> Order {
    let (order, inserted) = db.insert_order(order).await.expect("Error inserting order");
    assert!(inserted, "order {} was already present", order.order_code);
    order
}
