use chrono::{FixedOffset, NaiveDate, NaiveDateTime, Utc};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;

/// The base64-encoded HMAC-SHA256 of `data`, keyed with `secret`. Returns `None` if the secret is unusable.
pub fn calculate_hmac(secret: &str, data: &[u8]) -> Option<String> {
    let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes()).ok()?;
    mac.update(data);
    Some(base64::encode(mac.finalize().into_bytes()))
}

/// Compares two credentials in constant time. The lengths are not secret.
pub fn constant_time_eq(a: &str, b: &str) -> bool {
    a.len() == b.len() && bool::from(a.as_bytes().ct_eq(b.as_bytes()))
}

/// The current wall-clock time in the business timezone.
pub fn local_now(offset: FixedOffset) -> NaiveDateTime {
    Utc::now().with_timezone(&offset).naive_local()
}

/// Today's date in the business timezone.
pub fn local_today(offset: FixedOffset) -> NaiveDate {
    local_now(offset).date()
}
