//! Date and money normalization.
//!
//! Order data arrives as free text from spreadsheets, chat messages and bank notifications. Everything that crosses
//! into the ledger goes through these functions first, so that the database only ever sees canonical values.
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use resale_common::Amount;

/// A date-ish value in any of the shapes the ledger receives.
#[derive(Debug, Clone, PartialEq)]
pub enum DateValue {
    Date(NaiveDate),
    Timestamp(DateTime<Utc>),
    Local(NaiveDateTime),
    Text(String),
}

impl From<&str> for DateValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<NaiveDate> for DateValue {
    fn from(value: NaiveDate) -> Self {
        Self::Date(value)
    }
}

pub fn normalize_date(value: &DateValue) -> Option<NaiveDate> {
    match value {
        DateValue::Date(d) => Some(*d),
        DateValue::Timestamp(ts) => Some(ts.date_naive()),
        DateValue::Local(dt) => Some(dt.date()),
        DateValue::Text(s) => parse_date(s),
    }
}

/// Parses `DD/MM/YYYY`, `DD-MM-YYYY`, `YYYY-MM-DD`, `YYYY/MM/DD` or `YYYYMMDD`, optionally followed by a time of day
/// (separated by a space or `T`). Returns `None` for anything else.
pub fn parse_date(value: &str) -> Option<NaiveDate> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }
    let (date_part, time_part) = match value.find([' ', 'T']) {
        Some(i) => (&value[..i], Some(value[i + 1..].trim())),
        None => (value, None),
    };
    if let Some(time) = time_part {
        if !is_time_of_day(time) {
            return None;
        }
    }
    if date_part.len() == 8 && date_part.bytes().all(|b| b.is_ascii_digit()) {
        return ymd(&date_part[..4], &date_part[4..6], &date_part[6..]);
    }
    let sep = if date_part.contains('/') { '/' } else { '-' };
    let parts = date_part.split(sep).collect::<Vec<_>>();
    match parts.as_slice() {
        [y, m, d] if y.len() == 4 => ymd(y, m, d),
        [d, m, y] if y.len() == 4 => ymd(y, m, d),
        _ => None,
    }
}

fn ymd(y: &str, m: &str, d: &str) -> Option<NaiveDate> {
    let all_digits = |s: &str| !s.is_empty() && s.len() <= 4 && s.bytes().all(|b| b.is_ascii_digit());
    if !(all_digits(y) && all_digits(m) && all_digits(d)) {
        return None;
    }
    NaiveDate::from_ymd_opt(y.parse().ok()?, m.parse().ok()?, d.parse().ok()?)
}

fn is_time_of_day(value: &str) -> bool {
    let value = value.trim_end_matches('Z');
    ["%H:%M", "%H:%M:%S", "%H:%M:%S%.f"].iter().any(|f| NaiveTime::parse_from_str(value, f).is_ok())
}

pub fn format_dmy(date: NaiveDate) -> String {
    date.format("%d/%m/%Y").to_string()
}

/// The signed integer spelled by the whole of `value`, ignoring surrounding whitespace.
pub fn parse_int(value: &str) -> Option<i64> {
    value.trim().parse::<i64>().ok()
}

/// Extracts a non-negative amount from free text such as `"80,000 VND"`, `"50.000đ"` or `"120000"`.
///
/// `.` and `,` are treated as thousands separators, except that a trailing group of one or two digits is taken to be
/// a fractional part and dropped. Negative or digit-less input yields `fallback`.
pub fn parse_money(value: &str, fallback: Amount) -> Amount {
    let value = value.trim();
    let first_digit = match value.find(|c: char| c.is_ascii_digit()) {
        Some(i) => i,
        None => return fallback,
    };
    if value[..first_digit].contains('-') {
        return fallback;
    }
    let numeric = value[first_digit..].trim_end_matches(|c: char| !c.is_ascii_digit());
    let integral = match numeric.rfind(['.', ',']) {
        Some(i) if (1..=2).contains(&(numeric.len() - i - 1)) => &numeric[..i],
        _ => numeric,
    };
    let digits = integral.chars().filter(char::is_ascii_digit).collect::<String>();
    digits.parse::<i64>().map(Amount::from).unwrap_or(fallback)
}

/// A subscription length in days. Bare numbers are days; months count as 30 days and years as 365. Whole years
/// spelled in months (`"12 months"`) count as years.
pub fn parse_duration_days(value: &str) -> Option<i64> {
    let value = value.trim().to_ascii_lowercase();
    let split = value.find(|c: char| !c.is_ascii_digit()).unwrap_or(value.len());
    let count = value[..split].parse::<i64>().ok()?;
    let unit = value[split..].trim();
    match unit {
        "" | "d" | "day" | "days" => Some(count),
        "m" | "month" | "months" if count % 12 == 0 => (count / 12).checked_mul(365),
        "m" | "month" | "months" => count.checked_mul(30),
        "y" | "year" | "years" => count.checked_mul(365),
        _ => None,
    }
}
