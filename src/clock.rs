//! Injectable time source
//!
//! Every component that needs "now" or "today" takes an `Arc<dyn Clock>` so
//! tests can drive day rollovers and window boundaries deterministically.

use chrono::{DateTime, FixedOffset, NaiveDate, Offset, Utc};
use std::sync::atomic::{AtomicI64, Ordering};

pub trait Clock: Send + Sync {
    /// Milliseconds since the Unix epoch
    fn now_millis(&self) -> i64;

    /// Offset used to decide where one calendar day ends and the next begins
    fn utc_offset(&self) -> FixedOffset {
        Utc.fix()
    }

    /// Calendar date of the current instant in the clock's offset
    fn today(&self) -> NaiveDate {
        date_at(self.now_millis(), self.utc_offset())
    }

    /// Index of the fixed window of `window_ms` containing the current instant
    fn window_index(&self, window_ms: i64) -> i64 {
        self.now_millis().div_euclid(window_ms)
    }
}

fn date_at(millis: i64, offset: FixedOffset) -> NaiveDate {
    DateTime::<Utc>::from_timestamp_millis(millis)
        .unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
        .with_timezone(&offset)
        .date_naive()
}

/// Wall-clock time
#[derive(Debug, Clone, Copy)]
pub struct SystemClock {
    offset: FixedOffset,
}

impl SystemClock {
    pub fn new() -> Self {
        Self::with_offset_minutes(0)
    }

    /// Day boundaries shifted by `minutes` east of UTC. Out-of-range values fall back to UTC.
    pub fn with_offset_minutes(minutes: i32) -> Self {
        let offset = FixedOffset::east_opt(minutes.saturating_mul(60)).unwrap_or_else(|| {
            tracing::warn!(minutes, "day boundary offset out of range, using UTC");
            Utc.fix()
        });
        Self { offset }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now_millis(&self) -> i64 {
        Utc::now().timestamp_millis()
    }

    fn utc_offset(&self) -> FixedOffset {
        self.offset
    }
}

/// Hand-driven clock for tests and replay tooling
#[derive(Debug)]
pub struct ManualClock {
    millis: AtomicI64,
    offset: FixedOffset,
}

impl ManualClock {
    pub fn new(millis: i64) -> Self {
        Self {
            millis: AtomicI64::new(millis),
            offset: Utc.fix(),
        }
    }

    /// Start at midnight UTC of the given date plus `millis_into_day`
    pub fn at(date: NaiveDate, millis_into_day: i64) -> Self {
        let midnight = date
            .and_hms_opt(0, 0, 0)
            .map(|dt| dt.and_utc().timestamp_millis())
            .unwrap_or(0);
        Self::new(midnight + millis_into_day)
    }

    pub fn with_offset(mut self, offset: FixedOffset) -> Self {
        self.offset = offset;
        self
    }

    pub fn set(&self, millis: i64) {
        self.millis.store(millis, Ordering::SeqCst);
    }

    pub fn advance(&self, millis: i64) {
        self.millis.fetch_add(millis, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_millis(&self) -> i64 {
        self.millis.load(Ordering::SeqCst)
    }

    fn utc_offset(&self) -> FixedOffset {
        self.offset
    }
}
