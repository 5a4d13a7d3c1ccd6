use std::fmt::Display;

use resale_common::Amount;
use resale_engine::helpers::parse_money;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;

use crate::errors::ServerError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonResponse {
    pub message: String,
}

impl JsonResponse {
    pub fn new<S: Display>(message: S) -> Self {
        Self { message: message.to_string() }
    }

    /// The acknowledgement the payment provider expects for every accepted notification.
    pub fn ok() -> Self {
        Self::new("OK")
    }
}

/// Body of `POST /api/renewals/retry`. An empty body retries every order paid in the last few days.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RetryRequest {
    #[serde(default)]
    pub order_codes: Option<Vec<String>>,
    #[serde(default)]
    pub force: bool,
}

/// Body of `POST /api/supplier_rounds/{id}/settle`. Without an amount the round is settled in full.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SettleRequest {
    #[serde(default)]
    pub paid_amount: Option<Value>,
}

impl SettleRequest {
    /// The amount paid, accepting numbers as well as money strings like `"60,000"`.
    pub fn paid_amount(&self) -> Result<Option<Amount>, String> {
        match &self.paid_amount {
            None | Some(Value::Null) => Ok(None),
            Some(Value::Number(n)) => n.as_i64().map(|v| Some(Amount::from(v))).ok_or_else(|| format!("{n} is not a whole amount")),
            Some(Value::String(s)) if s.trim().is_empty() => Ok(None),
            Some(Value::String(s)) => {
                // Negative or digit-less input falls back to the sentinel, which is never a valid payment
                let amount = parse_money(s, Amount::from(-1));
                if amount.value() < 0 {
                    Err(format!("'{s}' is not a valid amount"))
                } else {
                    Ok(Some(amount))
                }
            },
            Some(v) => Err(format!("{v} is not a valid amount")),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CancelRequest {
    pub order_codes: Vec<String>,
}

/// Parses a JSON request body. An empty body is read as `T::default()`.
pub fn parse_optional_body<T: DeserializeOwned + Default>(body: &[u8]) -> Result<T, ServerError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(T::default());
    }
    parse_body(body)
}

pub fn parse_body<T: DeserializeOwned>(body: &[u8]) -> Result<T, ServerError> {
    serde_json::from_slice(body).map_err(|e| ServerError::CouldNotDeserializePayload(e.to_string()))
}
