//! Beacon analytics
//!
//! Ingestion (validation, anonymized visitor counting, click counting) and
//! the read-only rollup report, both built on the shared `CounterStore`.

pub mod aggregator;
pub mod anonymizer;
pub mod bot;
pub mod ingest;
pub mod ip_extractor;
pub mod keys;
pub mod models;

pub use aggregator::Aggregator;
pub use anonymizer::Anonymizer;
pub use ingest::Recorder;
pub use ip_extractor::extract_client_ip;
pub use models::{ClickTarget, DailyStats, EventKind, Outcome, RawEvent, StatsReport};
