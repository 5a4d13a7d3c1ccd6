use std::fmt::Debug;

use chrono::{Days, NaiveDate};
use log::*;

use crate::{
    db_types::{NewPaymentReceipt, Order, OrderStatus},
    helpers::{extract_order_codes, OrderCodePattern},
    ledger_api::{
        capabilities::PricingProvider,
        errors::LedgerApiError,
        payment_objects::{
            NotificationOutcome,
            PaymentSummary,
            PostCommitFailure,
            PostCommitStage,
            RenewalNote,
            RenewalResult,
            RetrySummary,
            TransferNotification,
        },
        renewal::{order_renewal_eligibility, RenewalEligibility},
    },
    traits::{CancelOutcome, OrderPreState, ReconciliationDatabase, RenewalUpdate},
};

/// `PaymentFlowApi` handles incoming payment notifications and the renewals they trigger.
///
/// The ledger write for a payment happens in one transaction in the backend. Everything that follows it (renewals,
/// check flags, status resets) is best-effort: failures are logged and reported in the [`PaymentSummary`], and can be
/// recovered with [`PaymentFlowApi::retry_renewals`].
pub struct PaymentFlowApi<B, P> {
    db: B,
    pricing: P,
    pattern: OrderCodePattern,
}

impl<B, P> Debug for PaymentFlowApi<B, P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "PaymentFlowApi ({})", self.pattern.as_str())
    }
}

impl<B, P> PaymentFlowApi<B, P> {
    pub fn new(db: B, pricing: P, pattern: OrderCodePattern) -> Self {
        Self { db, pricing, pattern }
    }

    pub fn db(&self) -> &B {
        &self.db
    }
}

/// The length of one renewal period: the order's duration, or failing that, the span of its current term.
fn renewal_period(order: &Order) -> Option<i64> {
    order.duration_days.filter(|d| *d > 0).or_else(|| {
        let span = (order.expiry()? - order.registration_date?).num_days() + 1;
        (span > 0).then_some(span)
    })
}

/// Operator-supplied codes, trimmed, upper-cased and de-duplicated.
fn normalize_codes(codes: &[String]) -> Vec<String> {
    let mut unique = Vec::with_capacity(codes.len());
    for code in codes.iter().map(|c| c.trim().to_uppercase()).filter(|c| !c.is_empty()) {
        if !unique.contains(&code) {
            unique.push(code);
        }
    }
    unique
}

fn record_failure(summary: &mut PaymentSummary, order_code: &str, stage: PostCommitStage, reason: String) {
    error!("💸️ Post-commit {stage:?} failed for order {order_code} (payment {}): {reason}", summary.provider_ref);
    summary.failures.push(PostCommitFailure { order_code: order_code.to_string(), stage, reason });
}

impl<B, P> PaymentFlowApi<B, P>
where
    B: ReconciliationDatabase,
    P: PricingProvider,
{
    /// Applies a provider notification. Outgoing transfers are ignored. Notifications that mention no order code
    /// fail with [`LedgerApiError::NoOrderReference`], and nothing is written.
    pub async fn process_notification(
        &self,
        notification: &TransferNotification,
        today: NaiveDate,
    ) -> Result<NotificationOutcome, LedgerApiError> {
        if notification.is_outgoing() {
            debug!("💸️ Ignoring outgoing transfer {}", notification.provider_reference());
            return Ok(NotificationOutcome::Ignored("outgoing transfer".to_string()));
        }
        let codes = extract_order_codes(&notification.memo(), &self.pattern);
        if codes.is_empty() {
            info!("💸️ No order code found in transfer memo '{}'", notification.memo());
            return Err(LedgerApiError::NoOrderReference);
        }
        let receipt = notification.to_receipt(codes, today);
        let summary = self.process_receipt(receipt, today).await?;
        Ok(NotificationOutcome::Applied(summary))
    }

    /// Applies a normalized payment receipt, then runs the post-commit phase for every order it references.
    pub async fn process_receipt(
        &self,
        receipt: NewPaymentReceipt,
        today: NaiveDate,
    ) -> Result<PaymentSummary, LedgerApiError> {
        let provider_ref = receipt.provider_ref.clone();
        let order_codes = receipt.order_codes.clone();
        let application = self.db.apply_payment(receipt, today).await.map_err(|e| {
            error!("💸️ Payment [{provider_ref}] could not be applied. It is safe to retry. {e}");
            LedgerApiError::from(e)
        })?;
        let mut summary = PaymentSummary {
            provider_ref,
            order_codes,
            inserted: application.receipt.inserted(),
            marked_paid: application.marked_paid,
            accrual: application.accrual,
            ..Default::default()
        };
        if !summary.inserted {
            info!("💸️ Payment [{}] has already been applied. Nothing to do.", summary.provider_ref);
            return Ok(summary);
        }
        info!(
            "💸️ Payment [{}] applied to {}. {} marked paid.",
            summary.provider_ref,
            summary.order_codes.join(", "),
            summary.marked_paid.len()
        );
        let payment_id = application.receipt.id();
        for state in &application.pre_states {
            self.post_commit(state, payment_id, today, &mut summary).await;
        }
        Ok(summary)
    }

    async fn post_commit(
        &self,
        state: &OrderPreState,
        payment_id: i64,
        today: NaiveDate,
        summary: &mut PaymentSummary,
    ) {
        let code = state.order_code.as_str();
        let fresh = match self.db.fetch_order(code).await {
            Ok(Some(order)) => order,
            Ok(None) => {
                debug!("💸️ Order {code} is not an active order. Nothing more to do.");
                return;
            },
            Err(e) => return record_failure(summary, code, PostCommitStage::Refetch, e.to_string()),
        };
        match state.eligibility {
            Some(eligibility) if eligibility.eligible => match self.renew(&fresh, eligibility, payment_id, today).await {
                Ok(RenewalResult::Renewed(order)) => {
                    info!("🔁️ Order {code} renewed until {:?}", order.expiry());
                    summary.renewed.push(order.order_code);
                },
                Ok(RenewalResult::Skipped(reason)) => record_failure(summary, code, PostCommitStage::Renewal, reason),
                Err(e) => record_failure(summary, code, PostCommitStage::Renewal, e.to_string()),
            },
            _ if fresh.status.is_unpaid_like() && fresh.check_flag.is_none() => {
                match self.db.set_check_flag(code, None, Some(false)).await {
                    Ok(true) => summary.flagged.push(fresh.order_code.clone()),
                    Ok(false) => trace!("💸️ Check flag for {code} was set concurrently"),
                    Err(e) => record_failure(summary, code, PostCommitStage::CheckFlag, e.to_string()),
                }
            },
            _ => {},
        }
        if fresh.status.needs_unpaid_reset() {
            match self.db.transition_status(code, Some(fresh.status), OrderStatus::Unpaid).await {
                Ok(true) => {
                    info!("💸️ Order {code} was {} when paid. Reset to Unpaid.", fresh.status);
                    summary.reset.push(fresh.order_code.clone());
                },
                Ok(false) => trace!("💸️ Order {code} changed status before it could be reset"),
                Err(e) => record_failure(summary, code, PostCommitStage::StatusReset, e.to_string()),
            }
        }
    }

    /// Renews an order outside the webhook path. `force` overrides the check flag and the renewal window.
    ///
    /// Every renewal is paid for by a receipt. The oldest receipt for the order that has not already paid for it or
    /// renewed it is used, and an order without one is skipped.
    pub async fn apply_renewal(
        &self,
        order_code: &str,
        force: bool,
        today: NaiveDate,
    ) -> Result<RenewalResult, LedgerApiError> {
        let order = match self.db.fetch_order(order_code).await? {
            Some(order) => order,
            None => return Ok(RenewalResult::Skipped("not an active order".to_string())),
        };
        let eligibility = order_renewal_eligibility(&order, today, force);
        if !eligibility.eligible {
            let reason = format!("not eligible for renewal while {} (check flag {:?})", order.status, order.check_flag);
            return Ok(RenewalResult::Skipped(reason));
        }
        let Some(payment_id) = self.db.unapplied_payment_id(order_code).await? else {
            return Ok(RenewalResult::Skipped("no payment is waiting to be applied to the order".to_string()));
        };
        if eligibility.force_renewal {
            debug!("🔁️ Renewing {order_code} directly from Paid");
        }
        self.renew(&order, eligibility, payment_id, today).await
    }

    async fn renew(
        &self,
        order: &Order,
        eligibility: RenewalEligibility,
        payment_id: i64,
        today: NaiveDate,
    ) -> Result<RenewalResult, LedgerApiError> {
        let Some(expiry) = order.expiry() else {
            return Ok(RenewalResult::Skipped("the order has no expiry date".to_string()));
        };
        let Some(period) = renewal_period(order) else {
            return Ok(RenewalResult::Skipped("the order has no duration".to_string()));
        };
        let new_expiry_date = u64::try_from(period)
            .ok()
            .and_then(|p| expiry.checked_add_days(Days::new(p)))
            .ok_or_else(|| LedgerApiError::Renewal {
                order_code: order.order_code.clone(),
                reason: format!("cannot extend {expiry} by {period} days"),
            })?;
        let new_price = self.pricing.current_price(order, today).await?;
        let update = RenewalUpdate {
            order_code: order.order_code.clone(),
            payment_id,
            expected_status: eligibility.status_norm,
            expected_expiry_date: order.expiry_date,
            new_expiry_date,
            new_price,
            renewed_on: today,
        };
        trace!("🔁️ Renewing {}: {expiry} -> {new_expiry_date} at {new_price}", order.order_code);
        match self.db.apply_renewal(update).await? {
            Some(order) => Ok(RenewalResult::Renewed(order)),
            None => Ok(RenewalResult::Skipped("the order or its payment changed while it was being renewed".to_string())),
        }
    }

    /// Operator-driven renewal recovery. With no explicit codes, re-examines every order referenced by a payment in
    /// the last `rescan_days` days that has not yet been applied to it.
    pub async fn retry_renewals(
        &self,
        order_codes: Option<Vec<String>>,
        force: bool,
        today: NaiveDate,
        rescan_days: u64,
    ) -> Result<RetrySummary, LedgerApiError> {
        let codes = match order_codes {
            Some(codes) if !codes.is_empty() => normalize_codes(&codes),
            _ => {
                let since = today.checked_sub_days(Days::new(rescan_days)).unwrap_or(today);
                self.db.unapplied_receipt_order_codes(since).await?
            },
        };
        let mut summary = RetrySummary::default();
        for code in codes {
            summary.processed += 1;
            match self.apply_renewal(&code, force, today).await {
                Ok(RenewalResult::Renewed(_)) => {
                    info!("🔁️ Manual retry renewed {code}");
                    summary.renewed.push(code);
                },
                Ok(RenewalResult::Skipped(reason)) => {
                    debug!("🔁️ Manual retry skipped {code}: {reason}");
                    summary.skipped.push(RenewalNote { order_code: code, reason });
                },
                Err(e) => {
                    warn!("🔁️ Manual retry failed for {code}: {e}");
                    summary.failed.push(RenewalNote { order_code: code, reason: e.to_string() });
                },
            }
        }
        Ok(summary)
    }

    /// Moves the given orders into the canceled partition. Orders that are unknown, or not in a cancellable status,
    /// are reported back as rejected.
    pub async fn cancel_orders(&self, order_codes: &[String]) -> Result<CancelOutcome, LedgerApiError> {
        let codes = normalize_codes(order_codes);
        if codes.is_empty() {
            return Err(LedgerApiError::InvalidRequest("No order codes were given".to_string()));
        }
        let outcome = self.db.cancel_orders(&codes).await?;
        if !outcome.rejected.is_empty() {
            warn!("🗃️ Could not cancel {}", outcome.rejected.join(", "));
        }
        Ok(outcome)
    }
}
