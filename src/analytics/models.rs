//! Data models for analytics

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Outbound-link destinations a click beacon may report
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClickTarget {
    Github,
    Twitter,
    Discord,
    Youtube,
    Twitch,
    Instagram,
    Tiktok,
    Linkedin,
    Spotify,
    Steam,
    Kick,
}

impl ClickTarget {
    pub const ALL: [ClickTarget; 11] = [
        ClickTarget::Github,
        ClickTarget::Twitter,
        ClickTarget::Discord,
        ClickTarget::Youtube,
        ClickTarget::Twitch,
        ClickTarget::Instagram,
        ClickTarget::Tiktok,
        ClickTarget::Linkedin,
        ClickTarget::Spotify,
        ClickTarget::Steam,
        ClickTarget::Kick,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ClickTarget::Github => "github",
            ClickTarget::Twitter => "twitter",
            ClickTarget::Discord => "discord",
            ClickTarget::Youtube => "youtube",
            ClickTarget::Twitch => "twitch",
            ClickTarget::Instagram => "instagram",
            ClickTarget::Tiktok => "tiktok",
            ClickTarget::Linkedin => "linkedin",
            ClickTarget::Spotify => "spotify",
            ClickTarget::Steam => "steam",
            ClickTarget::Kick => "kick",
        }
    }
}

impl fmt::Display for ClickTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ClickTarget {
    type Err = ();

    /// Exact match against the lower-case identifiers
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ClickTarget::ALL
            .into_iter()
            .find(|target| target.as_str() == s)
            .ok_or(())
    }
}

/// Beacon event kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    Pageview,
    Click,
}

impl EventKind {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pageview" => Some(EventKind::Pageview),
            "click" => Some(EventKind::Click),
            _ => None,
        }
    }
}

/// A beacon that passed the structural check
#[derive(Debug, Clone, PartialEq)]
pub struct RawEvent {
    pub kind: EventKind,
    /// Client timestamp in epoch milliseconds
    pub ts: f64,
    pub target: Option<String>,
    /// `document.referrer`, accepted but not stored
    pub referrer: Option<String>,
    /// IANA timezone name, accepted but not stored
    pub tz: Option<String>,
}

/// Result of validating and recording one beacon
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Accepted,
    RejectedMalformed,
    RejectedStale,
    RejectedTooLarge,
    RejectedUnknownTarget,
}

impl Outcome {
    pub fn is_accepted(&self) -> bool {
        matches!(self, Outcome::Accepted)
    }

    /// Short reason string used for logs and response bodies
    pub fn reason(&self) -> &'static str {
        match self {
            Outcome::Accepted => "accepted",
            Outcome::RejectedMalformed => "Invalid payload",
            Outcome::RejectedStale => "Timestamp expired",
            Outcome::RejectedTooLarge => "Payload too large",
            Outcome::RejectedUnknownTarget => "Invalid target",
        }
    }
}

/// Counters for a single calendar day
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DailyStats {
    pub date: NaiveDate,
    pub pageviews: u64,
    pub unique_visitors: u64,
    /// Targets with zero clicks are left out
    pub clicks: BTreeMap<ClickTarget, u64>,
}

impl DailyStats {
    pub fn empty(date: NaiveDate) -> Self {
        Self {
            date,
            pageviews: 0,
            unique_visitors: 0,
            clicks: BTreeMap::new(),
        }
    }
}

/// Rollup over a trailing window of days, most recent day first
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsReport {
    pub days: Vec<DailyStats>,
    pub total_pageviews: u64,
    /// Sum of daily unique counts, not deduplicated across days
    pub total_uniques: u64,
    pub total_clicks: BTreeMap<ClickTarget, u64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_click_target_round_trips_through_str() {
        for target in ClickTarget::ALL {
            assert_eq!(target.as_str().parse::<ClickTarget>(), Ok(target));
        }
        assert!("facebook".parse::<ClickTarget>().is_err());
        assert!("GitHub".parse::<ClickTarget>().is_err());
    }

    #[test]
    fn test_report_serializes_camel_case() {
        let date = NaiveDate::from_ymd_opt(2024, 5, 1).unwrap();
        let mut day = DailyStats::empty(date);
        day.pageviews = 3;
        day.unique_visitors = 2;
        day.clicks.insert(ClickTarget::Github, 1);

        let report = StatsReport {
            days: vec![day],
            total_pageviews: 3,
            total_uniques: 2,
            total_clicks: BTreeMap::from([(ClickTarget::Github, 1)]),
        };

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "days": [{
                    "date": "2024-05-01",
                    "pageviews": 3,
                    "uniqueVisitors": 2,
                    "clicks": { "github": 1 }
                }],
                "totalPageviews": 3,
                "totalUniques": 2,
                "totalClicks": { "github": 1 }
            })
        );
    }
}
