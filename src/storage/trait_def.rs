use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    /// The backing store could not be reached or failed the operation
    #[error("counter store unavailable: {0}")]
    Unavailable(#[source] anyhow::Error),
    /// A stored value could not be interpreted
    #[error("corrupt value under key {key}: {reason}")]
    Corrupt { key: String, reason: String },
}

impl StorageError {
    pub fn unavailable(err: impl Into<anyhow::Error>) -> Self {
        StorageError::Unavailable(err.into())
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, StorageError::Unavailable(_))
    }
}

impl From<sqlx::Error> for StorageError {
    fn from(err: sqlx::Error) -> Self {
        StorageError::Unavailable(err.into())
    }
}

pub type StorageResult<T> = Result<T, StorageError>;

/// Parse a stored counter. Missing or unparseable values count as zero.
pub fn parse_count(raw: Option<&str>) -> u64 {
    raw.and_then(|v| v.trim().parse::<u64>().ok()).unwrap_or(0)
}

/// Parse a stored JSON-array set. Missing values are the empty set.
pub fn parse_set(key: &str, raw: Option<&str>) -> StorageResult<Vec<String>> {
    match raw {
        None => Ok(Vec::new()),
        Some(raw) => serde_json::from_str(raw).map_err(|e| StorageError::Corrupt {
            key: key.to_string(),
            reason: e.to_string(),
        }),
    }
}

/// Key-value store with per-key expiration.
///
/// Only `get`, `put` and `purge_expired` are required. The compound
/// operations have read-modify-write defaults that can lose updates when
/// callers race on the same key; backends that can do better override them
/// with single atomic statements.
#[async_trait]
pub trait CounterStore: Send + Sync {
    /// Initialize the storage (create tables, etc.)
    async fn init(&self) -> StorageResult<()> {
        Ok(())
    }

    /// Fetch a value. Expired entries are reported as absent.
    async fn get(&self, key: &str) -> StorageResult<Option<String>>;

    /// Store a value that expires `ttl` from now
    async fn put(&self, key: &str, value: &str, ttl: Duration) -> StorageResult<()>;

    /// Add one to the counter under `key` and refresh its expiry. Returns the new count.
    async fn increment(&self, key: &str, ttl: Duration) -> StorageResult<u64> {
        let next = parse_count(self.get(key).await?.as_deref()) + 1;
        self.put(key, &next.to_string(), ttl).await?;
        Ok(next)
    }

    /// Store `value` only when nothing live is stored under `key`.
    /// Returns whatever value is in place afterwards.
    async fn put_if_absent(&self, key: &str, value: &str, ttl: Duration) -> StorageResult<String> {
        if let Some(existing) = self.get(key).await? {
            return Ok(existing);
        }
        self.put(key, value, ttl).await?;
        Ok(value.to_string())
    }

    /// Insert `member` into the JSON-array set under `key`. Returns true if it was new.
    /// An unreadable stored set is replaced.
    async fn add_to_set(&self, key: &str, member: &str, ttl: Duration) -> StorageResult<bool> {
        let mut members = parse_set(key, self.get(key).await?.as_deref()).unwrap_or_else(|err| {
            tracing::warn!(key, error = %err, "replacing unreadable set");
            Vec::new()
        });
        if members.iter().any(|m| m == member) {
            return Ok(false);
        }
        members.push(member.to_string());
        let encoded = serde_json::to_string(&members).map_err(StorageError::unavailable)?;
        self.put(key, &encoded, ttl).await?;
        Ok(true)
    }

    /// Drop expired entries. Returns how many were removed.
    async fn purge_expired(&self) -> StorageResult<u64>;
}
