use regex::{Regex, RegexBuilder};
use thiserror::Error;

pub const DEFAULT_ORDER_CODE_PATTERN: &str = r"MAV[A-Z]{0,3}\d{3,}";

#[derive(Debug, Clone, Error)]
#[error("Invalid order code pattern {pattern}: {reason}")]
pub struct OrderCodePatternError {
    pattern: String,
    reason: String,
}

/// The shape of an order code as it appears in a transfer memo. Matching is case-insensitive.
#[derive(Debug, Clone)]
pub struct OrderCodePattern(Regex);

impl OrderCodePattern {
    pub fn new(pattern: &str) -> Result<Self, OrderCodePatternError> {
        RegexBuilder::new(pattern)
            .case_insensitive(true)
            .build()
            .map(Self)
            .map_err(|e| OrderCodePatternError { pattern: pattern.to_string(), reason: e.to_string() })
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl Default for OrderCodePattern {
    fn default() -> Self {
        Self::new(DEFAULT_ORDER_CODE_PATTERN).expect("Default order code pattern is a valid regex")
    }
}

/// All order codes mentioned in `memo`, upper-cased, without duplicates, in order of first appearance.
pub fn extract_order_codes(memo: &str, pattern: &OrderCodePattern) -> Vec<String> {
    let mut codes = Vec::new();
    for m in pattern.0.find_iter(memo) {
        let code = m.as_str().to_uppercase();
        if !codes.contains(&code) {
            codes.push(code);
        }
    }
    codes
}
