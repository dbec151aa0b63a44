//! Trailing-window rollup of the daily counters
//!
//! Read-only: builds a `StatsReport` from whatever the store holds for each
//! of the last N days. Missing keys read as zero.

use chrono::{Days, NaiveDate};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::warn;

use crate::analytics::keys;
use crate::analytics::models::{ClickTarget, DailyStats, StatsReport};
use crate::clock::Clock;
use crate::storage::{parse_count, parse_set, CounterStore, StorageResult};

/// Days covered by a report when the caller does not say otherwise
pub const DEFAULT_WINDOW_DAYS: u32 = 30;

/// Counters are retained for 90 days, so a longer window would only add zero rows
pub const MAX_WINDOW_DAYS: u32 = 90;

pub struct Aggregator {
    store: Arc<dyn CounterStore>,
    clock: Arc<dyn Clock>,
}

impl Aggregator {
    pub fn new(store: Arc<dyn CounterStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// Report for today and the `window_days - 1` days before it, today first
    pub async fn report(&self, window_days: u32) -> StorageResult<StatsReport> {
        let today = self.clock.today();
        let mut report = StatsReport {
            days: Vec::with_capacity(window_days as usize),
            total_pageviews: 0,
            total_uniques: 0,
            total_clicks: BTreeMap::new(),
        };

        for offset in 0..window_days {
            let Some(date) = today.checked_sub_days(Days::new(offset.into())) else {
                break;
            };
            let day = self.daily_stats(date).await?;

            report.total_pageviews += day.pageviews;
            report.total_uniques += day.unique_visitors;
            for (target, count) in &day.clicks {
                *report.total_clicks.entry(*target).or_insert(0) += count;
            }
            report.days.push(day);
        }

        Ok(report)
    }

    /// Counters for one date
    pub async fn daily_stats(&self, date: NaiveDate) -> StorageResult<DailyStats> {
        let mut day = DailyStats::empty(date);

        day.pageviews = parse_count(self.store.get(&keys::pageviews(date)).await?.as_deref());

        let unique_key = keys::unique_visitors(date);
        let raw = self.store.get(&unique_key).await?;
        day.unique_visitors = match parse_set(&unique_key, raw.as_deref()) {
            Ok(members) => members.len() as u64,
            Err(err) => {
                warn!(error = %err, "skipping unreadable visitor set");
                0
            }
        };

        for target in ClickTarget::ALL {
            let count = parse_count(self.store.get(&keys::clicks(target, date)).await?.as_deref());
            if count > 0 {
                day.clicks.insert(target, count);
            }
        }

        Ok(day)
    }
}
