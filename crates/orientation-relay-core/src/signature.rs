//! Timestamp-bound webhook signature verification.
//!
//! The storefront signs `"{timestamp}:{raw_body}"` with HMAC-SHA256 using the
//! shared webhook secret and sends the hex digest alongside the timestamp.
//! Binding the timestamp into the signed message stops a captured signature
//! from being replayed against a different body or a different timestamp.
//!
//! Verification never errors: any missing input, malformed hex, or length
//! mismatch is simply a failed verification.

use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::time::Duration;
use subtle::ConstantTimeEq;

type HmacSha256 = Hmac<Sha256>;

/// Compute the hex-encoded signature for a webhook body.
///
/// # Examples
///
/// ```rust
/// use orientation_relay_core::signature::sign;
///
/// let signature = sign("secret", "1700000000", b"{}");
/// assert_eq!(signature.len(), 64);
/// ```
pub fn sign(secret: &str, timestamp: &str, body: &[u8]) -> String {
    compute_mac(secret, timestamp, body)
        .map(hex::encode)
        .unwrap_or_default()
}

/// Verify a webhook signature.
///
/// Returns `false` when the signature, timestamp, or secret is absent or
/// empty, when the signature is not valid hex, or when the digest does not
/// match. The digest comparison runs in constant time.
pub fn verify(
    raw_body: &[u8],
    signature: Option<&str>,
    timestamp: Option<&str>,
    secret: Option<&str>,
) -> bool {
    let (Some(signature), Some(timestamp), Some(secret)) = (
        non_empty(signature),
        non_empty(timestamp),
        non_empty(secret),
    ) else {
        return false;
    };

    let Ok(provided) = hex::decode(signature.trim()) else {
        return false;
    };

    let Some(expected) = compute_mac(secret, timestamp, raw_body) else {
        return false;
    };
    constant_time_compare(&provided, &expected)
}

/// Check that a signature timestamp lies within `max_age` of `now`.
///
/// Accepts Unix timestamps in seconds or milliseconds. Unparseable
/// timestamps are rejected.
pub fn timestamp_within_window(timestamp: &str, now: DateTime<Utc>, max_age: Duration) -> bool {
    let Ok(raw) = timestamp.trim().parse::<i64>() else {
        return false;
    };

    // Values past the year 33658 in seconds are millisecond timestamps
    let millis = if raw.unsigned_abs() >= 1_000_000_000_000 {
        raw
    } else {
        raw.saturating_mul(1000)
    };

    let skew_ms = now.timestamp_millis().saturating_sub(millis).unsigned_abs();
    skew_ms <= max_age.as_millis() as u64
}

fn compute_mac(secret: &str, timestamp: &str, body: &[u8]) -> Option<Vec<u8>> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).ok()?;
    mac.update(timestamp.as_bytes());
    mac.update(b":");
    mac.update(body);
    Some(mac.finalize().into_bytes().to_vec())
}

fn constant_time_compare(a: &[u8], b: &[u8]) -> bool {
    // Lengths are not secret
    if a.len() != b.len() {
        return false;
    }

    a.ct_eq(b).into()
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.trim().is_empty())
}

#[cfg(test)]
#[path = "signature_tests.rs"]
mod tests;
