//! Renewal eligibility.
//!
//! The same window drives the daily sweep (Paid orders with 0 to 4 days left become Renewal) and the payment path,
//! so an order that the sweep would flag for renewal is also treated as a renewal when money arrives for it.
use chrono::NaiveDate;
use serde::Serialize;

use crate::db_types::{Order, OrderStatus};

/// Days before expiry at which a Paid order enters the renewal window. Inclusive.
pub const RENEWAL_WINDOW_DAYS: i64 = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RenewalEligibility {
    pub eligible: bool,
    /// The order is being renewed from Paid, without having been flagged for renewal by the daily sweep.
    pub force_renewal: bool,
    /// The order has already expired and is renewed back out of the Expired status.
    pub needs_status_reset: bool,
    /// The status the order must still be in when the renewal is written.
    pub status_norm: OrderStatus,
    pub days_remaining: Option<i64>,
}

impl RenewalEligibility {
    fn no(status: OrderStatus, days_remaining: Option<i64>) -> Self {
        Self { eligible: false, force_renewal: false, needs_status_reset: false, status_norm: status, days_remaining }
    }
}

/// Decides whether a payment for an order in the given state renews it.
///
/// `force` is the operator override from the manual retry path. It ignores the check flag and the renewal window,
/// but never renews an order that is unpaid, canceled or refunded.
pub fn renewal_eligibility(
    status: OrderStatus,
    check_flag: Option<bool>,
    expiry: Option<NaiveDate>,
    today: NaiveDate,
    force: bool,
) -> RenewalEligibility {
    let days_remaining = expiry.map(|e| (e - today).num_days());
    let no = RenewalEligibility::no(status, days_remaining);
    if days_remaining.is_none() {
        return no;
    }
    if check_flag == Some(true) && !force {
        return no;
    }
    let in_window = days_remaining.map(|d| d <= RENEWAL_WINDOW_DAYS).unwrap_or(false);
    match status {
        OrderStatus::Renewal => RenewalEligibility { eligible: true, ..no },
        OrderStatus::Expired => RenewalEligibility { eligible: true, needs_status_reset: true, ..no },
        OrderStatus::Paid if in_window || force => RenewalEligibility { eligible: true, force_renewal: true, ..no },
        _ => no,
    }
}

pub fn order_renewal_eligibility(order: &Order, today: NaiveDate, force: bool) -> RenewalEligibility {
    renewal_eligibility(order.status, order.check_flag, order.expiry(), today, force)
}
