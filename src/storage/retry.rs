use async_trait::async_trait;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

use crate::storage::{CounterStore, StorageResult};

/// Retries individual store calls that fail with `StorageError::Unavailable`.
///
/// Each call is retried on its own; a retried increment whose first attempt
/// actually landed is counted twice, which is within the counting tolerance
/// the service already accepts.
pub struct RetryingStore {
    inner: Arc<dyn CounterStore>,
    attempts: u32,
    base_delay: Duration,
}

impl RetryingStore {
    /// `attempts` is the number of retries after the first failure
    pub fn new(inner: Arc<dyn CounterStore>, attempts: u32, base_delay: Duration) -> Self {
        Self {
            inner,
            attempts,
            base_delay,
        }
    }

    async fn run<T, F, Fut>(&self, op: &'static str, key: &str, mut call: F) -> StorageResult<T>
    where
        F: FnMut() -> Fut + Send,
        Fut: Future<Output = StorageResult<T>> + Send,
        T: Send,
    {
        let mut retry = 0;
        loop {
            match call().await {
                Err(err) if err.is_retryable() && retry < self.attempts => {
                    let delay = self.base_delay * 2u32.saturating_pow(retry);
                    retry += 1;
                    warn!(op, key, retry, delay_ms = delay.as_millis() as u64, error = %err, "store call failed, retrying");
                    tokio::time::sleep(delay).await;
                }
                result => return result,
            }
        }
    }
}

#[async_trait]
impl CounterStore for RetryingStore {
    async fn init(&self) -> StorageResult<()> {
        self.inner.init().await
    }

    async fn get(&self, key: &str) -> StorageResult<Option<String>> {
        self.run("get", key, || self.inner.get(key)).await
    }

    async fn put(&self, key: &str, value: &str, ttl: Duration) -> StorageResult<()> {
        self.run("put", key, || self.inner.put(key, value, ttl)).await
    }

    async fn increment(&self, key: &str, ttl: Duration) -> StorageResult<u64> {
        self.run("increment", key, || self.inner.increment(key, ttl))
            .await
    }

    async fn put_if_absent(&self, key: &str, value: &str, ttl: Duration) -> StorageResult<String> {
        self.run("put_if_absent", key, || {
            self.inner.put_if_absent(key, value, ttl)
        })
        .await
    }

    async fn add_to_set(&self, key: &str, member: &str, ttl: Duration) -> StorageResult<bool> {
        self.run("add_to_set", key, || self.inner.add_to_set(key, member, ttl))
            .await
    }

    async fn purge_expired(&self) -> StorageResult<u64> {
        self.run("purge_expired", "*", || self.inner.purge_expired())
            .await
    }
}
