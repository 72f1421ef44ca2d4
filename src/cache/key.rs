use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Build a unique artifact key: `{city}_{unix_millis:013}-{8 hex}`.
///
/// The suffix keeps keys distinct when two writes for one city land in the
/// same millisecond.
pub fn artifact_key(city: &str, at: DateTime<Utc>) -> String {
    let nonce = Uuid::new_v4().simple().to_string();
    format!("{}_{:013}-{}", city, at.timestamp_millis(), &nonce[..8])
}

/// Listing prefix covering every artifact for `city`.
pub fn city_prefix(city: &str) -> String {
    format!("{}_", city)
}

/// Whether `key` was written for exactly `city`. Guards against prefix
/// overlap such as `new` vs `new_york`.
pub fn belongs_to(key: &str, city: &str) -> bool {
    match key.rsplit_once('_') {
        Some((owner, stamp)) => owner == city && is_stamp(stamp),
        None => false,
    }
}

fn is_stamp(stamp: &str) -> bool {
    match stamp.split_once('-') {
        Some((millis, nonce)) => {
            !millis.is_empty()
                && millis.bytes().all(|b| b.is_ascii_digit())
                && !nonce.is_empty()
                && nonce.bytes().all(|b| b.is_ascii_hexdigit())
        }
        None => false,
    }
}
