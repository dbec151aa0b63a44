//! Beacon validation and counter updates
//!
//! Checks run in a fixed order and stop at the first failure: shape, size,
//! freshness, then click target. Only events that pass every check touch the
//! store.

use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::debug;

use crate::analytics::anonymizer::Anonymizer;
use crate::analytics::keys;
use crate::analytics::models::{ClickTarget, EventKind, Outcome, RawEvent};
use crate::clock::Clock;
use crate::storage::{CounterStore, StorageResult};

/// Largest accepted event, measured as re-serialized JSON
pub const MAX_EVENT_BYTES: usize = 512;

/// Accepted distance between the client timestamp and now, either direction
pub const MAX_EVENT_AGE_MS: f64 = 30_000.0;

/// Click targets are compared after truncation to this many characters
const MAX_TARGET_CHARS: usize = 30;

pub struct Recorder {
    store: Arc<dyn CounterStore>,
    clock: Arc<dyn Clock>,
    anonymizer: Anonymizer,
}

impl Recorder {
    pub fn new(store: Arc<dyn CounterStore>, clock: Arc<dyn Clock>) -> Self {
        let anonymizer = Anonymizer::new(Arc::clone(&store), Arc::clone(&clock));
        Self {
            store,
            clock,
            anonymizer,
        }
    }

    /// Parse a request body and record it. Bodies that are not JSON are malformed.
    pub async fn record_bytes(&self, body: &[u8], address: &str) -> StorageResult<Outcome> {
        match serde_json::from_slice::<Value>(body) {
            Ok(value) => self.record(&value, address).await,
            Err(err) => {
                debug!(error = %err, "beacon body is not JSON");
                Ok(Outcome::RejectedMalformed)
            }
        }
    }

    /// Validate one beacon and update today's counters
    pub async fn record(&self, body: &Value, address: &str) -> StorageResult<Outcome> {
        let event = match parse_event(body) {
            Some(event) => event,
            None => return Ok(reject(Outcome::RejectedMalformed)),
        };

        if serialized_len(body) > MAX_EVENT_BYTES {
            return Ok(reject(Outcome::RejectedTooLarge));
        }

        if !is_fresh(event.ts, self.clock.now_millis()) {
            return Ok(reject(Outcome::RejectedStale));
        }

        match event.kind {
            EventKind::Pageview => self.record_pageview(address).await?,
            EventKind::Click => match click_target(event.target.as_deref()) {
                Some(target) => self.record_click(target).await?,
                None => return Ok(reject(Outcome::RejectedUnknownTarget)),
            },
        }

        Ok(Outcome::Accepted)
    }

    async fn record_pageview(&self, address: &str) -> StorageResult<()> {
        let today = self.clock.today();
        let views = self
            .store
            .increment(&keys::pageviews(today), keys::COUNTER_TTL)
            .await?;

        let token = self.anonymizer.anonymize(address).await?;
        let new_visitor = self
            .store
            .add_to_set(&keys::unique_visitors(today), &token, keys::COUNTER_TTL)
            .await?;

        debug!(%today, views, new_visitor, "recorded pageview");
        Ok(())
    }

    async fn record_click(&self, target: ClickTarget) -> StorageResult<()> {
        let today = self.clock.today();
        let clicks = self
            .store
            .increment(&keys::clicks(target, today), keys::COUNTER_TTL)
            .await?;

        debug!(%today, %target, clicks, "recorded click");
        Ok(())
    }
}

fn reject(outcome: Outcome) -> Outcome {
    debug!(reason = outcome.reason(), "beacon rejected");
    outcome
}

/// Structural check: an object with a known `type`, a numeric `ts` and
/// optional string `target`, `ref` and `tz`
pub fn parse_event(body: &Value) -> Option<RawEvent> {
    let fields = body.as_object()?;
    let kind = EventKind::parse(fields.get("type")?.as_str()?)?;
    let ts = fields.get("ts")?.as_f64()?;

    Some(RawEvent {
        kind,
        ts,
        target: optional_string(fields, "target")?,
        referrer: optional_string(fields, "ref")?,
        tz: optional_string(fields, "tz")?,
    })
}

/// `Some(None)` when absent, `None` when present with a non-string value
fn optional_string(fields: &Map<String, Value>, name: &str) -> Option<Option<String>> {
    match fields.get(name) {
        None => Some(None),
        Some(Value::String(s)) => Some(Some(s.clone())),
        Some(_) => None,
    }
}

fn serialized_len(body: &Value) -> usize {
    serde_json::to_string(body).map(|s| s.len()).unwrap_or(usize::MAX)
}

fn is_fresh(ts: f64, now_ms: i64) -> bool {
    (now_ms as f64 - ts).abs() < MAX_EVENT_AGE_MS
}

/// Lower-case, truncate, then look up in the known set
pub fn click_target(raw: Option<&str>) -> Option<ClickTarget> {
    let normalized: String = raw?
        .to_lowercase()
        .chars()
        .take(MAX_TARGET_CHARS)
        .collect();
    normalized.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::storage::MemoryStore;
    use chrono::NaiveDate;
    use serde_json::json;

    const NOON: i64 = 12 * 3_600_000;

    fn setup() -> (Arc<ManualClock>, Arc<MemoryStore>, Recorder) {
        let date = NaiveDate::from_ymd_opt(2024, 6, 1).unwrap();
        let clock = Arc::new(ManualClock::at(date, NOON));
        let store = Arc::new(MemoryStore::with_clock(clock.clone()));
        let recorder = Recorder::new(store.clone(), clock.clone());
        (clock, store, recorder)
    }

    fn now(clock: &ManualClock) -> i64 {
        clock.now_millis()
    }

    #[test]
    fn test_parse_event_shapes() {
        assert!(parse_event(&json!({"type": "pageview", "ts": 1})).is_some());
        assert!(parse_event(&json!({"type": "click", "ts": 1.5, "target": "x"})).is_some());
        assert!(parse_event(&json!({"type": "pageview", "ts": 1, "ref": "", "tz": "UTC"})).is_some());

        assert!(parse_event(&json!([])).is_none());
        assert!(parse_event(&json!("pageview")).is_none());
        assert!(parse_event(&json!({"type": "purchase", "ts": 1})).is_none());
        assert!(parse_event(&json!({"type": "pageview"})).is_none());
        assert!(parse_event(&json!({"type": "pageview", "ts": "1"})).is_none());
        assert!(parse_event(&json!({"type": "click", "ts": 1, "target": 5})).is_none());
        assert!(parse_event(&json!({"type": "pageview", "ts": 1, "ref": null})).is_none());
        assert!(parse_event(&json!({"type": "pageview", "ts": 1, "tz": ["UTC"]})).is_none());
    }

    #[test]
    fn test_click_target_normalization() {
        assert_eq!(click_target(Some("GitHub")), Some(ClickTarget::Github));
        assert_eq!(click_target(Some("KICK")), Some(ClickTarget::Kick));
        assert_eq!(click_target(Some("facebook")), None);
        assert_eq!(click_target(Some("")), None);
        assert_eq!(click_target(None), None);
        let long = format!("github{}", "x".repeat(40));
        assert_eq!(click_target(Some(&long)), None);
    }

    #[tokio::test]
    async fn test_pageviews_count_and_dedupe_visitors() {
        let (clock, store, recorder) = setup();
        for address in ["192.0.2.1", "192.0.2.1", "192.0.2.2"] {
            let event = json!({"type": "pageview", "ts": now(&clock)});
            assert_eq!(recorder.record(&event, address).await.unwrap(), Outcome::Accepted);
        }

        assert_eq!(
            store.get("analytics:pageviews:2024-06-01").await.unwrap().as_deref(),
            Some("3")
        );
        let uniques: Vec<String> = serde_json::from_str(
            &store.get("analytics:unique:2024-06-01").await.unwrap().unwrap(),
        )
        .unwrap();
        assert_eq!(uniques.len(), 2);
        assert!(uniques.iter().all(|t| !t.contains("192.0.2")));
    }

    #[tokio::test]
    async fn test_repeated_clicks_touch_only_their_target() {
        let (clock, store, recorder) = setup();
        for _ in 0..5 {
            let event = json!({"type": "click", "ts": now(&clock), "target": "github"});
            assert_eq!(recorder.record(&event, "192.0.2.1").await.unwrap(), Outcome::Accepted);
        }

        assert_eq!(
            store.get("analytics:clicks:github:2024-06-01").await.unwrap().as_deref(),
            Some("5")
        );
        for target in ClickTarget::ALL.iter().filter(|t| **t != ClickTarget::Github) {
            let key = keys::clicks(*target, clock.today());
            assert_eq!(store.get(&key).await.unwrap(), None);
        }
        assert_eq!(store.get("analytics:pageviews:2024-06-01").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_freshness_boundary() {
        let (clock, _, recorder) = setup();
        let t = now(&clock);

        let cases = [
            (t - 29_999, Outcome::Accepted),
            (t + 29_999, Outcome::Accepted),
            (t - 30_000, Outcome::RejectedStale),
            (t + 30_000, Outcome::RejectedStale),
            (t - 3_600_000, Outcome::RejectedStale),
        ];
        for (ts, expected) in cases {
            let event = json!({"type": "pageview", "ts": ts});
            assert_eq!(recorder.record(&event, "192.0.2.1").await.unwrap(), expected, "ts={ts}");
        }
    }

    #[tokio::test]
    async fn test_unknown_target_is_rejected_without_writes() {
        let (clock, store, recorder) = setup();
        let event = json!({"type": "click", "ts": now(&clock), "target": "facebook"});
        assert_eq!(
            recorder.record(&event, "192.0.2.1").await.unwrap(),
            Outcome::RejectedUnknownTarget
        );

        let missing = json!({"type": "click", "ts": now(&clock)});
        assert_eq!(
            recorder.record(&missing, "192.0.2.1").await.unwrap(),
            Outcome::RejectedUnknownTarget
        );
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_validation_order() {
        let (clock, _, recorder) = setup();
        let padding = "x".repeat(600);

        // oversized and stale: size is checked first
        let event = json!({"type": "pageview", "ts": 0, "ref": padding});
        assert_eq!(
            recorder.record(&event, "192.0.2.1").await.unwrap(),
            Outcome::RejectedTooLarge
        );

        // stale click with an unknown target: freshness is checked first
        let event = json!({"type": "click", "ts": 0, "target": "facebook"});
        assert_eq!(
            recorder.record(&event, "192.0.2.1").await.unwrap(),
            Outcome::RejectedStale
        );

        // malformed wins over everything
        let event = json!({"type": "click", "ts": now(&clock), "tz": 3, "ref": padding});
        assert_eq!(
            recorder.record(&event, "192.0.2.1").await.unwrap(),
            Outcome::RejectedMalformed
        );
    }

    #[tokio::test]
    async fn test_size_limit_is_inclusive() {
        let (clock, _, recorder) = setup();
        let base = json!({"type": "pageview", "ts": now(&clock), "ref": ""});
        let room = MAX_EVENT_BYTES - serialized_len(&base);

        let exact = json!({"type": "pageview", "ts": now(&clock), "ref": "r".repeat(room)});
        assert_eq!(serialized_len(&exact), MAX_EVENT_BYTES);
        assert_eq!(recorder.record(&exact, "192.0.2.1").await.unwrap(), Outcome::Accepted);

        let over = json!({"type": "pageview", "ts": now(&clock), "ref": "r".repeat(room + 1)});
        assert_eq!(
            recorder.record(&over, "192.0.2.1").await.unwrap(),
            Outcome::RejectedTooLarge
        );
    }

    #[tokio::test]
    async fn test_record_bytes_rejects_invalid_json() {
        let (_, store, recorder) = setup();
        assert_eq!(
            recorder.record_bytes(b"{not json", "192.0.2.1").await.unwrap(),
            Outcome::RejectedMalformed
        );
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_counters_roll_over_with_the_day() {
        let (clock, store, recorder) = setup();
        let event = json!({"type": "pageview", "ts": now(&clock)});
        recorder.record(&event, "192.0.2.1").await.unwrap();

        clock.advance(86_400_000);
        let event = json!({"type": "pageview", "ts": now(&clock)});
        recorder.record(&event, "192.0.2.1").await.unwrap();

        let day1: Vec<String> = serde_json::from_str(
            &store.get("analytics:unique:2024-06-01").await.unwrap().unwrap(),
        )
        .unwrap();
        let day2: Vec<String> = serde_json::from_str(
            &store.get("analytics:unique:2024-06-02").await.unwrap().unwrap(),
        )
        .unwrap();
        assert_eq!(day1.len(), 1);
        assert_eq!(day2.len(), 1);
        assert_ne!(day1[0], day2[0]);
    }
}
