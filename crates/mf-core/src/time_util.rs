//! Wall-clock helpers.
//!
//! Window scores are whole Unix seconds; quotes and stats carry a full
//! `chrono` timestamp.

use std::time::{SystemTime, UNIX_EPOCH};

use chrono::{DateTime, Utc};

#[inline]
fn since_epoch() -> std::time::Duration {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default()
}

/// Current time as **seconds** since Unix epoch. This is the window score unit.
#[inline]
pub fn now_secs() -> i64 {
    since_epoch().as_secs() as i64
}

/// Current time as **milliseconds** since Unix epoch.
#[inline]
pub fn now_ms() -> u64 {
    since_epoch().as_millis() as u64
}

/// Current time as a UTC timestamp.
#[inline]
pub fn now_utc() -> DateTime<Utc> {
    Utc::now()
}
