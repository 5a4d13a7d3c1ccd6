use std::fmt::Debug;

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use log::*;
use serde::Serialize;

use crate::{
    db_types::{NoticeKind, OrderNotice},
    ledger_api::{capabilities::Notifier, errors::LedgerApiError, maintenance_api::MaintenanceJobState},
    traits::ReconciliationDatabase,
};

/// Renders a notice as plain text, one line per order.
pub fn format_notice(kind: NoticeKind, notices: &[OrderNotice]) -> String {
    let title = match kind {
        NoticeKind::SameDayExpiry => "Orders expiring today",
        NoticeKind::AdvanceRenewal => "Orders due for renewal",
    };
    let mut text = format!("{title} ({})", notices.len());
    for n in notices {
        text.push_str(&format!(
            "\n{} | {} | {} | {} | slot {} | expires {} ({} days) | {}",
            n.order_code, n.product_code, n.customer_info, n.contact_link, n.slot, n.expiry_date, n.days_remaining, n.price
        ));
    }
    text
}

/// When the notices last went out.
///
/// A day's notices wait for that day's maintenance run to succeed. The same-day expiry query only sees the orders the
/// run expires once it has committed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NoticeJobState {
    pub last_sent: Option<NaiveDate>,
}

impl NoticeJobState {
    pub fn is_due(&self, now: NaiveDateTime, run_at: NaiveTime, maintenance: &MaintenanceJobState) -> bool {
        self.is_scheduled(now, run_at) && maintenance.last_success == Some(now.date())
    }

    /// The notices would be due, but today's maintenance run has not succeeded yet.
    pub fn is_waiting_for_maintenance(
        &self,
        now: NaiveDateTime,
        run_at: NaiveTime,
        maintenance: &MaintenanceJobState,
    ) -> bool {
        self.is_scheduled(now, run_at) && maintenance.last_success != Some(now.date())
    }

    pub fn record_sent(&mut self, day: NaiveDate) {
        self.last_sent = Some(day);
    }

    fn is_scheduled(&self, now: NaiveDateTime, run_at: NaiveTime) -> bool {
        now.time() >= run_at && self.last_sent.map(|d| d < now.date()).unwrap_or(true)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct NoticeRun {
    pub kind: NoticeKind,
    pub selected: usize,
    pub delivered: bool,
}

/// The advance-notice queries. These never write to the ledger.
pub struct NoticeApi<B, N> {
    db: B,
    notifier: N,
}

impl<B, N> Debug for NoticeApi<B, N> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "NoticeApi")
    }
}

impl<B, N> NoticeApi<B, N> {
    pub fn new(db: B, notifier: N) -> Self {
        Self { db, notifier }
    }
}

impl<B, N> NoticeApi<B, N>
where
    B: ReconciliationDatabase,
    N: Notifier,
{
    pub async fn collect(&self, kind: NoticeKind, today: NaiveDate) -> Result<Vec<OrderNotice>, LedgerApiError> {
        let orders = self.db.orders_due_for_notice(kind, today).await?;
        Ok(orders.iter().map(|o| OrderNotice::from_order(o, today)).collect())
    }

    /// Selects the orders for `kind` and hands them to the notifier in one call. Notifier failures are logged and
    /// reported as undelivered; there is no automatic retry.
    pub async fn send(&self, kind: NoticeKind, today: NaiveDate) -> Result<NoticeRun, LedgerApiError> {
        let notices = self.collect(kind, today).await?;
        let mut run = NoticeRun { kind, selected: notices.len(), delivered: false };
        if notices.is_empty() {
            debug!("📣️ No orders need a {kind} notice on {today}");
            return Ok(run);
        }
        match self.notifier.send_notice(kind, &notices).await {
            Ok(()) => {
                info!("📣️ Sent {kind} notice for {} orders", notices.len());
                run.delivered = true;
            },
            Err(e) => error!("📣️ Could not send the {kind} notice for {} orders. {e}", notices.len()),
        }
        Ok(run)
    }

    /// Runs both notice queries. A failure in one does not stop the other.
    pub async fn send_all(&self, today: NaiveDate) -> Vec<NoticeRun> {
        let mut runs = Vec::with_capacity(2);
        for kind in [NoticeKind::SameDayExpiry, NoticeKind::AdvanceRenewal] {
            match self.send(kind, today).await {
                Ok(run) => runs.push(run),
                Err(e) => error!("📣️ The {kind} notice query failed. {e}"),
            }
        }
        runs
    }
}
