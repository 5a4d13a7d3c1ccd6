mod normalize;
mod order_codes;

pub use normalize::{format_dmy, normalize_date, parse_date, parse_duration_days, parse_int, parse_money, DateValue};
pub use order_codes::{extract_order_codes, OrderCodePattern, OrderCodePatternError, DEFAULT_ORDER_CODE_PATTERN};
