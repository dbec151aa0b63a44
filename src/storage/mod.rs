pub mod lossy;
pub mod memory;
pub mod postgres;
pub mod retry;
pub mod sqlite;
pub mod sweeper;
pub mod trait_def;

pub use lossy::LossyStore;
pub use memory::MemoryStore;
pub use postgres::PostgresStore;
pub use retry::RetryingStore;
pub use sqlite::SqliteStore;
pub use sweeper::ExpirySweeper;
pub use trait_def::{parse_count, parse_set, CounterStore, StorageError, StorageResult};

use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use crate::clock::Clock;
use crate::config::{CounterMode, StoreBackend, StoreConfig};

/// Build the configured backend with its wrappers applied.
///
/// The lossy wrapper sits innermost so retries replay the same
/// read-modify-write sequence a single attempt would.
pub async fn build_store(
    config: &StoreConfig,
    clock: Arc<dyn Clock>,
) -> StorageResult<Arc<dyn CounterStore>> {
    let mut store: Arc<dyn CounterStore> = match config.backend {
        StoreBackend::Memory => {
            info!("Using in-memory store");
            Arc::new(MemoryStore::with_clock(clock))
        }
        StoreBackend::Sqlite => {
            info!("Using SQLite store: {}", config.url);
            Arc::new(SqliteStore::with_clock(&config.url, config.max_connections, clock).await?)
        }
        StoreBackend::Postgres => {
            info!("Using PostgreSQL store");
            Arc::new(PostgresStore::with_clock(&config.url, config.max_connections, clock).await?)
        }
    };

    if config.counter_mode == CounterMode::Lossy {
        info!("Counter mode: lossy (separate read and write)");
        store = Arc::new(LossyStore::new(store));
    }

    if config.retry_attempts > 0 {
        store = Arc::new(RetryingStore::new(
            store,
            config.retry_attempts,
            Duration::from_millis(config.retry_base_ms),
        ));
    }

    Ok(store)
}
