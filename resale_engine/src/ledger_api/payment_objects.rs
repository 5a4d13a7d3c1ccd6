use blake2::{Blake2b512, Digest};
use chrono::NaiveDate;
use resale_common::Amount;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{
    db_types::{NewPaymentReceipt, Order},
    helpers::{parse_date, parse_money},
    traits::SupplierAccrual,
};

/// A bank transfer notification as posted by the payment provider.
///
/// Providers are loose about types: ids and amounts arrive as numbers or strings, and any field may be missing.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferNotification {
    #[serde(default)]
    pub id: Option<Value>,
    #[serde(default)]
    pub gateway: Option<String>,
    #[serde(default)]
    pub transaction_date: Option<String>,
    #[serde(default)]
    pub account_number: Option<String>,
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub transfer_type: Option<String>,
    #[serde(default)]
    pub transfer_amount: Option<Value>,
    #[serde(default)]
    pub reference_code: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

impl TransferNotification {
    /// Money leaving the account. These are acknowledged but never applied.
    pub fn is_outgoing(&self) -> bool {
        non_empty(&self.transfer_type).map(|t| t.eq_ignore_ascii_case("out")).unwrap_or(false)
    }

    /// The free text in which the customer mentions their order codes.
    pub fn memo(&self) -> String {
        [&self.content, &self.description, &self.code].into_iter().filter_map(non_empty).collect::<Vec<_>>().join(" ")
    }

    pub fn amount(&self) -> Amount {
        match &self.transfer_amount {
            Some(Value::Number(n)) => match (n.as_i64(), n.as_f64()) {
                (Some(v), _) if v >= 0 => Amount::from(v),
                #[allow(clippy::cast_possible_truncation)]
                (None, Some(v)) if v >= 0.0 => Amount::from(v.trunc() as i64),
                _ => Amount::default(),
            },
            Some(Value::String(s)) => parse_money(s, Amount::default()),
            _ => Amount::default(),
        }
    }

    fn event_id(&self) -> Option<String> {
        match &self.id {
            Some(Value::String(s)) if !s.trim().is_empty() => Some(s.trim().to_string()),
            Some(Value::Number(n)) => Some(n.to_string()),
            _ => None,
        }
    }

    /// The provider-level identity of the payment event: `gateway:id` when the provider supplies an event id, the
    /// bank reference code otherwise, and failing both, a digest of the fields that describe the transfer.
    pub fn provider_reference(&self) -> String {
        if let Some(id) = self.event_id() {
            let gateway = non_empty(&self.gateway).unwrap_or("unknown");
            return format!("{gateway}:{id}");
        }
        if let Some(reference) = non_empty(&self.reference_code) {
            return format!("ref:{reference}");
        }
        let canonical = format!(
            "{}|{}|{}|{}|{}",
            non_empty(&self.gateway).unwrap_or_default(),
            non_empty(&self.transaction_date).unwrap_or_default(),
            non_empty(&self.account_number).unwrap_or_default(),
            self.amount().value(),
            self.memo()
        );
        let digest = Blake2b512::digest(canonical.as_bytes());
        let hex = digest.iter().take(16).map(|b| format!("{b:02x}")).collect::<String>();
        format!("digest:{hex}")
    }

    /// The transaction date, or `today` if the provider did not send a usable one.
    pub fn paid_at(&self, today: NaiveDate) -> NaiveDate {
        non_empty(&self.transaction_date).and_then(parse_date).unwrap_or(today)
    }

    pub fn to_receipt(&self, order_codes: Vec<String>, today: NaiveDate) -> NewPaymentReceipt {
        let sender = non_empty(&self.gateway).unwrap_or_default().to_string();
        let receiver = non_empty(&self.account_number).unwrap_or_default().to_string();
        NewPaymentReceipt::new(self.provider_reference(), order_codes, self.paid_at(today), self.amount())
            .with_parties(sender, receiver)
            .with_note(self.memo())
    }
}

/// Which post-commit step failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PostCommitStage {
    Refetch,
    Renewal,
    CheckFlag,
    StatusReset,
}

/// A side effect that failed after the payment was committed. These are never returned as errors; they are logged,
/// reported here and recovered through the manual retry entry point.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PostCommitFailure {
    pub order_code: String,
    pub stage: PostCommitStage,
    pub reason: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct PaymentSummary {
    pub provider_ref: String,
    pub order_codes: Vec<String>,
    /// False if the payment had been applied before and this notification was a replay.
    pub inserted: bool,
    pub marked_paid: Vec<String>,
    pub renewed: Vec<String>,
    /// Unpaid orders marked as examined.
    pub flagged: Vec<String>,
    /// Orders reset to Unpaid.
    pub reset: Vec<String>,
    pub accrual: Option<SupplierAccrual>,
    pub failures: Vec<PostCommitFailure>,
}

#[derive(Debug, Clone, Serialize)]
pub enum NotificationOutcome {
    Ignored(String),
    Applied(PaymentSummary),
}

#[derive(Debug, Clone)]
pub enum RenewalResult {
    Renewed(Order),
    Skipped(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RenewalNote {
    pub order_code: String,
    pub reason: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct RetrySummary {
    pub processed: usize,
    pub renewed: Vec<String>,
    pub skipped: Vec<RenewalNote>,
    pub failed: Vec<RenewalNote>,
}
