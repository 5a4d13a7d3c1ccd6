use std::{fmt::Display, str::FromStr};

use chrono::{DateTime, Days, NaiveDate, Utc};
use log::error;
use resale_common::Amount;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use thiserror::Error;

use crate::helpers::{format_dmy, parse_date, parse_duration_days, parse_money};

//--------------------------------------     OrderStatus       ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OrderStatus {
    /// The order has been created, and no payment has been matched to it yet.
    Unpaid,
    /// The customer has paid and the order is waiting on the supplier side to be settled.
    Processing,
    /// The order is paid up and in force.
    Paid,
    /// The order is inside the renewal window and waiting for the customer to top up.
    Renewal,
    /// The order reached its expiry date without being renewed.
    Expired,
    /// The order was cancelled by an operator.
    Canceled,
    /// The order was refunded.
    Refunded,
    /// A refund has been requested but not yet completed.
    PendingRefund,
}

impl OrderStatus {
    /// Lenient parsing of status text. Case, surrounding whitespace, and `_`/`-`/` ` separators are ignored, and the
    /// British spelling of "cancelled" is accepted.
    pub fn normalize(value: &str) -> Option<Self> {
        let key = value.trim().to_ascii_lowercase().replace(['_', '-', ' '], "");
        match key.as_str() {
            "unpaid" => Some(Self::Unpaid),
            "processing" => Some(Self::Processing),
            "paid" => Some(Self::Paid),
            "renewal" => Some(Self::Renewal),
            "expired" => Some(Self::Expired),
            "canceled" | "cancelled" => Some(Self::Canceled),
            "refunded" => Some(Self::Refunded),
            "pendingrefund" => Some(Self::PendingRefund),
            _ => None,
        }
    }

    /// Statuses that may be archived into the expired partition.
    pub fn is_expirable(&self) -> bool {
        matches!(self, Self::Paid | Self::Renewal | Self::Expired)
    }

    /// Statuses meaning "no money has been confirmed for this order yet".
    pub fn is_unpaid_like(&self) -> bool {
        matches!(self, Self::Unpaid | Self::Processing)
    }

    /// A payment arriving for a refunded order means the order has drifted out of sync with reality, and it has to
    /// be re-examined from scratch.
    pub fn needs_unpaid_reset(&self) -> bool {
        matches!(self, Self::Refunded | Self::PendingRefund)
    }
}

impl Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            OrderStatus::Unpaid => "Unpaid",
            OrderStatus::Processing => "Processing",
            OrderStatus::Paid => "Paid",
            OrderStatus::Renewal => "Renewal",
            OrderStatus::Expired => "Expired",
            OrderStatus::Canceled => "Canceled",
            OrderStatus::Refunded => "Refunded",
            OrderStatus::PendingRefund => "PendingRefund",
        };
        f.write_str(s)
    }
}

impl From<String> for OrderStatus {
    fn from(value: String) -> Self {
        value.parse().unwrap_or_else(|_| {
            error!("Invalid order status: {value}. But this conversion cannot fail. Defaulting to Unpaid");
            OrderStatus::Unpaid
        })
    }
}

#[derive(Debug, Clone, Error)]
#[error("Invalid status: {0}")]
pub struct ConversionError(String);

impl FromStr for OrderStatus {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::normalize(s).ok_or_else(|| ConversionError(s.to_string()))
    }
}

//--------------------------------------      Partition        ---------------------------------------------------------
/// The physical collection an order currently lives in. Orders only ever move from `Active` to one of the archives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Partition {
    Active,
    Expired,
    Canceled,
}

impl Partition {
    pub fn table_name(&self) -> &'static str {
        match self {
            Partition::Active => "orders",
            Partition::Expired => "orders_expired",
            Partition::Canceled => "orders_canceled",
        }
    }

    /// Whether an order in `status` may be moved into this partition.
    pub fn admits(&self, status: OrderStatus) -> bool {
        match self {
            Partition::Active => false,
            Partition::Expired => status.is_expirable(),
            Partition::Canceled => matches!(status, OrderStatus::Canceled | OrderStatus::Refunded),
        }
    }
}

impl Display for Partition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Partition::Active => write!(f, "active"),
            Partition::Expired => write!(f, "expired"),
            Partition::Canceled => write!(f, "canceled"),
        }
    }
}

//--------------------------------------        Order          ---------------------------------------------------------
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Order {
    pub id: i64,
    pub order_code: String,
    pub product_code: String,
    pub customer_info: String,
    pub contact_link: String,
    pub slot: String,
    pub registration_date: Option<NaiveDate>,
    pub duration_days: Option<i64>,
    pub expiry_date: Option<NaiveDate>,
    pub supplier_name: String,
    pub cost_amount: Amount,
    pub price_amount: Amount,
    pub note: String,
    #[sqlx(try_from = "String")]
    pub status: OrderStatus,
    /// `None`: never examined. `Some(false)`: examined and still unpaid. `Some(true)`: acknowledged by an operator.
    pub check_flag: Option<bool>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    /// The explicit expiry date if one is stored, otherwise `registration_date + duration_days - 1`.
    pub fn expiry(&self) -> Option<NaiveDate> {
        self.expiry_date.or_else(|| derive_expiry(self.registration_date?, self.duration_days?))
    }

    /// Whole days between `as_of` and the expiry date. Negative once the order has lapsed.
    pub fn days_remaining(&self, as_of: NaiveDate) -> Option<i64> {
        self.expiry().map(|expiry| (expiry - as_of).num_days())
    }

    /// True if every business field matches. Surrogate ids and bookkeeping timestamps are ignored.
    pub fn same_business_fields(&self, other: &Order) -> bool {
        self.order_code == other.order_code &&
            self.product_code == other.product_code &&
            self.customer_info == other.customer_info &&
            self.contact_link == other.contact_link &&
            self.slot == other.slot &&
            self.registration_date == other.registration_date &&
            self.duration_days == other.duration_days &&
            self.expiry() == other.expiry() &&
            self.supplier_name == other.supplier_name &&
            self.cost_amount == other.cost_amount &&
            self.price_amount == other.price_amount &&
            self.note == other.note &&
            self.status == other.status
    }
}

pub fn derive_expiry(registration: NaiveDate, duration_days: i64) -> Option<NaiveDate> {
    if duration_days <= 0 {
        return None;
    }
    registration.checked_add_days(Days::new(u64::try_from(duration_days - 1).ok()?))
}

//--------------------------------------       NewOrder        ---------------------------------------------------------
/// An order as it arrives from the order-creation flow. Dates, durations and amounts are free text and are normalized
/// on insert.
#[derive(Debug, Clone, Default)]
pub struct NewOrder {
    pub order_code: String,
    pub product_code: String,
    pub customer_info: String,
    pub contact_link: String,
    pub slot: String,
    pub registration: String,
    pub duration: String,
    pub expiry: Option<String>,
    pub supplier_name: String,
    pub cost: String,
    pub price: String,
    pub note: String,
    pub status: Option<OrderStatus>,
}

impl NewOrder {
    pub fn new<S: Into<String>>(order_code: S, product_code: S) -> Self {
        Self { order_code: order_code.into().trim().to_uppercase(), product_code: product_code.into(), ..Default::default() }
    }

    pub fn with_registration<S: Into<String>>(mut self, registration: S, duration: S) -> Self {
        self.registration = registration.into();
        self.duration = duration.into();
        self
    }

    pub fn with_expiry<S: Into<String>>(mut self, expiry: S) -> Self {
        self.expiry = Some(expiry.into());
        self
    }

    pub fn with_supplier<S: Into<String>>(mut self, supplier_name: S, cost: S) -> Self {
        self.supplier_name = supplier_name.into();
        self.cost = cost.into();
        self
    }

    pub fn with_price<S: Into<String>>(mut self, price: S) -> Self {
        self.price = price.into();
        self
    }

    pub fn with_customer<S: Into<String>>(mut self, customer_info: S, contact_link: S) -> Self {
        self.customer_info = customer_info.into();
        self.contact_link = contact_link.into();
        self
    }

    pub fn with_slot<S: Into<String>>(mut self, slot: S) -> Self {
        self.slot = slot.into();
        self
    }

    pub fn with_note<S: Into<String>>(mut self, note: S) -> Self {
        self.note = note.into();
        self
    }

    pub fn with_status(mut self, status: OrderStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn registration_date(&self) -> Option<NaiveDate> {
        parse_date(&self.registration)
    }

    pub fn duration_days(&self) -> Option<i64> {
        parse_duration_days(&self.duration)
    }

    pub fn expiry_date(&self) -> Option<NaiveDate> {
        self.expiry.as_deref().and_then(parse_date)
    }

    pub fn cost_amount(&self) -> Amount {
        parse_money(&self.cost, Amount::default())
    }

    pub fn price_amount(&self) -> Amount {
        parse_money(&self.price, Amount::default())
    }
}

//--------------------------------------    PaymentReceipt     ---------------------------------------------------------
#[derive(Debug, Clone, Serialize)]
pub struct PaymentReceipt {
    pub id: i64,
    /// The provider-level reference of the payment event. Unique across all receipts.
    pub provider_ref: String,
    pub order_codes: Vec<String>,
    pub paid_at: NaiveDate,
    pub amount: Amount,
    pub sender: String,
    pub receiver: String,
    pub note: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewPaymentReceipt {
    pub provider_ref: String,
    pub order_codes: Vec<String>,
    pub paid_at: NaiveDate,
    pub amount: Amount,
    pub sender: String,
    pub receiver: String,
    pub note: String,
}

impl NewPaymentReceipt {
    pub fn new(provider_ref: String, order_codes: Vec<String>, paid_at: NaiveDate, amount: Amount) -> Self {
        Self {
            provider_ref,
            order_codes,
            paid_at,
            amount,
            sender: String::default(),
            receiver: String::default(),
            note: String::default(),
        }
    }

    pub fn with_parties(mut self, sender: String, receiver: String) -> Self {
        self.sender = sender;
        self.receiver = receiver;
        self
    }

    pub fn with_note(mut self, note: String) -> Self {
        self.note = note;
        self
    }

    /// The amount can only be attributed to a single order. Transfers that mention several orders are ambiguous.
    pub fn single_order_code(&self) -> Option<&str> {
        match self.order_codes.as_slice() {
            [code] => Some(code.as_str()),
            _ => None,
        }
    }
}

//--------------------------------------       Supplier        ---------------------------------------------------------
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Supplier {
    pub id: i64,
    pub name: String,
}

//--------------------------------------      RoundStatus      ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RoundStatus {
    Unpaid,
    Paid,
}

impl Display for RoundStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RoundStatus::Unpaid => write!(f, "Unpaid"),
            RoundStatus::Paid => write!(f, "Paid"),
        }
    }
}

impl From<String> for RoundStatus {
    fn from(value: String) -> Self {
        match OrderStatus::normalize(&value) {
            Some(OrderStatus::Paid) => Self::Paid,
            Some(OrderStatus::Unpaid) => Self::Unpaid,
            _ => {
                error!("Invalid round status: {value}. Defaulting to Unpaid");
                Self::Unpaid
            },
        }
    }
}

//--------------------------------------    SettlementEvent    ---------------------------------------------------------
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize)]
pub struct SettlementEvent {
    pub amount: Amount,
    pub settled_on: NaiveDate,
}

impl Display for SettlementEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "paid {} on {}", self.amount, format_dmy(self.settled_on))
    }
}

//-------------------------------------- SupplierPaymentRound  ---------------------------------------------------------
#[derive(Debug, Clone, Serialize)]
pub struct SupplierPaymentRound {
    pub id: i64,
    pub supplier_id: i64,
    /// The amount owed to the supplier for this round.
    pub import_value: Amount,
    pub paid_amount: Amount,
    pub label: String,
    pub status: RoundStatus,
    /// Settlements applied to this round, oldest first.
    pub history: Vec<SettlementEvent>,
    pub created_at: DateTime<Utc>,
}

impl SupplierPaymentRound {
    /// Human-readable trail, e.g. `Round 3 | paid 60,000 VND on 05/03/2025`.
    pub fn display_label(&self) -> String {
        let mut parts = vec![self.label.clone()];
        parts.extend(self.history.iter().map(|e| e.to_string()));
        parts.retain(|p| !p.is_empty());
        parts.join(" | ")
    }
}

//--------------------------------------      NoticeKind       ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NoticeKind {
    /// Orders expiring today.
    SameDayExpiry,
    /// Orders four days out from expiry that are waiting for a renewal payment.
    AdvanceRenewal,
}

impl NoticeKind {
    pub fn days_remaining(&self) -> i64 {
        match self {
            NoticeKind::SameDayExpiry => 0,
            NoticeKind::AdvanceRenewal => 4,
        }
    }

    pub fn status(&self) -> OrderStatus {
        match self {
            NoticeKind::SameDayExpiry => OrderStatus::Expired,
            NoticeKind::AdvanceRenewal => OrderStatus::Renewal,
        }
    }

    pub fn selects(&self, order: &Order, today: NaiveDate) -> bool {
        order.status == self.status() && order.days_remaining(today) == Some(self.days_remaining())
    }
}

impl Display for NoticeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NoticeKind::SameDayExpiry => write!(f, "same-day expiry"),
            NoticeKind::AdvanceRenewal => write!(f, "advance renewal"),
        }
    }
}

//--------------------------------------      OrderNotice      ---------------------------------------------------------
/// An order record enriched for human consumption.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OrderNotice {
    pub order_code: String,
    pub product_code: String,
    pub customer_info: String,
    pub contact_link: String,
    pub slot: String,
    /// `DD/MM/YYYY`
    pub expiry_date: String,
    pub days_remaining: i64,
    pub price: Amount,
}

impl OrderNotice {
    pub fn from_order(order: &Order, today: NaiveDate) -> Self {
        Self {
            order_code: order.order_code.clone(),
            product_code: order.product_code.clone(),
            customer_info: order.customer_info.clone(),
            contact_link: order.contact_link.clone(),
            slot: order.slot.clone(),
            expiry_date: order.expiry().map(format_dmy).unwrap_or_default(),
            days_remaining: order.days_remaining(today).unwrap_or_default(),
            price: order.price_amount,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn order() -> Order {
        Order {
            id: 1,
            order_code: "MAVC0001".into(),
            product_code: "NETFLIX-1M".into(),
            customer_info: "Jane".into(),
            contact_link: "fb.com/jane".into(),
            slot: "A1".into(),
            registration_date: Some(date(2025, 3, 1)),
            duration_days: Some(30),
            expiry_date: None,
            supplier_name: "Acme".into(),
            cost_amount: Amount::from(50_000),
            price_amount: Amount::from(80_000),
            note: String::new(),
            status: OrderStatus::Paid,
            check_flag: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn status_normalization() {
        assert_eq!(OrderStatus::normalize(" PAID "), Some(OrderStatus::Paid));
        assert_eq!(OrderStatus::normalize("pending_refund"), Some(OrderStatus::PendingRefund));
        assert_eq!(OrderStatus::normalize("Pending Refund"), Some(OrderStatus::PendingRefund));
        assert_eq!(OrderStatus::normalize("cancelled"), Some(OrderStatus::Canceled));
        assert_eq!(OrderStatus::normalize("shipped"), None);
        assert_eq!(OrderStatus::from("garbage".to_string()), OrderStatus::Unpaid);
        assert_eq!(OrderStatus::PendingRefund.to_string().parse::<OrderStatus>().unwrap(), OrderStatus::PendingRefund);
    }

    #[test]
    fn expiry_is_derived_inclusively() {
        let o = order();
        assert_eq!(o.expiry(), Some(date(2025, 3, 30)));
        assert_eq!(o.days_remaining(date(2025, 3, 26)), Some(4));
        assert_eq!(o.days_remaining(date(2025, 3, 31)), Some(-1));
        let explicit = Order { expiry_date: Some(date(2025, 4, 10)), ..order() };
        assert_eq!(explicit.expiry(), Some(date(2025, 4, 10)));
        let unknown = Order { registration_date: None, ..order() };
        assert_eq!(unknown.expiry(), None);
        assert_eq!(derive_expiry(date(2025, 3, 1), 0), None);
    }

    #[test]
    fn partitions_admit_only_matching_statuses() {
        assert!(Partition::Expired.admits(OrderStatus::Renewal));
        assert!(!Partition::Expired.admits(OrderStatus::Unpaid));
        assert!(Partition::Canceled.admits(OrderStatus::Canceled));
        assert!(!Partition::Canceled.admits(OrderStatus::Paid));
        assert!(!Partition::Active.admits(OrderStatus::Paid));
    }

    #[test]
    fn new_order_normalizes_free_text() {
        let o = NewOrder::new(" mavc0002 ", "SPOTIFY")
            .with_registration("05/03/2025", "1 month")
            .with_supplier("Acme", "50.000đ")
            .with_price("80,000 VND");
        assert_eq!(o.order_code, "MAVC0002");
        assert_eq!(o.registration_date(), Some(date(2025, 3, 5)));
        assert_eq!(o.duration_days(), Some(30));
        assert_eq!(o.cost_amount(), Amount::from(50_000));
        assert_eq!(o.price_amount(), Amount::from(80_000));
        assert_eq!(o.expiry_date(), None);
    }

    #[test]
    fn round_label_is_derived_from_history() {
        let round = SupplierPaymentRound {
            id: 1,
            supplier_id: 1,
            import_value: Amount::from(100_000),
            paid_amount: Amount::from(60_000),
            label: "Round 1".into(),
            status: RoundStatus::Paid,
            history: vec![SettlementEvent { amount: Amount::from(60_000), settled_on: date(2025, 3, 5) }],
            created_at: Utc::now(),
        };
        assert_eq!(round.display_label(), "Round 1 | paid 60,000 VND on 05/03/2025");
    }

    #[test]
    fn notice_selection() {
        let today = date(2025, 3, 26);
        let renewal = Order { status: OrderStatus::Renewal, ..order() };
        assert!(NoticeKind::AdvanceRenewal.selects(&renewal, today));
        assert!(!NoticeKind::SameDayExpiry.selects(&renewal, today));
        let notice = OrderNotice::from_order(&renewal, today);
        assert_eq!(notice.expiry_date, "30/03/2025");
        assert_eq!(notice.days_remaining, 4);
    }
}
