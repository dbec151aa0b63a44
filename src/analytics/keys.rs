//! Store key layout and retention periods
//!
//! These strings are the persistence contract; changing them orphans
//! existing data.

use chrono::NaiveDate;
use std::time::Duration;

use crate::analytics::models::ClickTarget;

/// Counters and visitor sets are kept for 90 days after their last write
pub const COUNTER_TTL: Duration = Duration::from_secs(86_400 * 90);

/// Daily salts live for one day
pub const SALT_TTL: Duration = Duration::from_secs(86_400);

/// Rate-limit counters outlive their one-minute window
pub const RATE_LIMIT_TTL: Duration = Duration::from_secs(120);

pub fn pageviews(date: NaiveDate) -> String {
    format!("analytics:pageviews:{}", date.format("%Y-%m-%d"))
}

pub fn unique_visitors(date: NaiveDate) -> String {
    format!("analytics:unique:{}", date.format("%Y-%m-%d"))
}

pub fn clicks(target: ClickTarget, date: NaiveDate) -> String {
    format!("analytics:clicks:{}:{}", target, date.format("%Y-%m-%d"))
}

pub fn salt(date: NaiveDate) -> String {
    format!("salt:{}", date.format("%Y-%m-%d"))
}

pub fn rate_limit(address: &str, window: i64) -> String {
    format!("rl:{address}:{window}")
}
