use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

use crate::storage::{CounterStore, StorageResult};

/// Forces the plain get/put behaviour on top of any backend.
///
/// Only the primitive operations are forwarded, so `increment`,
/// `put_if_absent` and `add_to_set` run as separate reads and writes and can
/// lose updates when requests race. This is what `COUNTER_MODE=lossy` selects.
pub struct LossyStore {
    inner: Arc<dyn CounterStore>,
}

impl LossyStore {
    pub fn new(inner: Arc<dyn CounterStore>) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl CounterStore for LossyStore {
    async fn init(&self) -> StorageResult<()> {
        self.inner.init().await
    }

    async fn get(&self, key: &str) -> StorageResult<Option<String>> {
        self.inner.get(key).await
    }

    async fn put(&self, key: &str, value: &str, ttl: Duration) -> StorageResult<()> {
        self.inner.put(key, value, ttl).await
    }

    async fn purge_expired(&self) -> StorageResult<u64> {
        self.inner.purge_expired().await
    }
}
