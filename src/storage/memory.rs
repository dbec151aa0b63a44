use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;

use crate::clock::{Clock, SystemClock};
use crate::storage::trait_def::{parse_count, parse_set};
use crate::storage::{CounterStore, StorageError, StorageResult};

#[derive(Debug, Clone)]
struct StoredValue {
    value: String,
    expires_at_ms: i64,
}

/// In-process store backed by a `DashMap`.
///
/// Expiry is evaluated against the injected clock, so tests can jump past a
/// TTL without sleeping. Compound operations hold the shard lock for the key
/// and are therefore atomic.
pub struct MemoryStore {
    entries: DashMap<String, StoredValue>,
    clock: Arc<dyn Clock>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock::new()))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: DashMap::new(),
            clock,
        }
    }

    /// Number of entries held, expired ones included
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn expiry(&self, ttl: Duration) -> i64 {
        self.clock.now_millis() + ttl.as_millis() as i64
    }

    fn is_live(&self, stored: &StoredValue) -> bool {
        stored.expires_at_ms > self.clock.now_millis()
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CounterStore for MemoryStore {
    async fn get(&self, key: &str) -> StorageResult<Option<String>> {
        Ok(self
            .entries
            .get(key)
            .filter(|entry| self.is_live(entry.value()))
            .map(|entry| entry.value().value.clone()))
    }

    async fn put(&self, key: &str, value: &str, ttl: Duration) -> StorageResult<()> {
        self.entries.insert(
            key.to_string(),
            StoredValue {
                value: value.to_string(),
                expires_at_ms: self.expiry(ttl),
            },
        );
        Ok(())
    }

    async fn increment(&self, key: &str, ttl: Duration) -> StorageResult<u64> {
        let expires_at_ms = self.expiry(ttl);
        let mut entry = self
            .entries
            .entry(key.to_string())
            .or_insert_with(|| StoredValue {
                value: "0".to_string(),
                expires_at_ms,
            });

        let current = if self.is_live(entry.value()) {
            parse_count(Some(&entry.value().value))
        } else {
            0
        };
        let next = current + 1;
        *entry.value_mut() = StoredValue {
            value: next.to_string(),
            expires_at_ms,
        };
        Ok(next)
    }

    async fn put_if_absent(&self, key: &str, value: &str, ttl: Duration) -> StorageResult<String> {
        let fresh = StoredValue {
            value: value.to_string(),
            expires_at_ms: self.expiry(ttl),
        };

        match self.entries.entry(key.to_string()) {
            Entry::Occupied(mut occupied) => {
                if self.is_live(occupied.get()) {
                    Ok(occupied.get().value.clone())
                } else {
                    occupied.insert(fresh);
                    Ok(value.to_string())
                }
            }
            Entry::Vacant(vacant) => {
                vacant.insert(fresh);
                Ok(value.to_string())
            }
        }
    }

    async fn add_to_set(&self, key: &str, member: &str, ttl: Duration) -> StorageResult<bool> {
        let expires_at_ms = self.expiry(ttl);
        let mut entry = self
            .entries
            .entry(key.to_string())
            .or_insert_with(|| StoredValue {
                value: "[]".to_string(),
                expires_at_ms,
            });

        let mut members = if self.is_live(entry.value()) {
            parse_set(key, Some(&entry.value().value)).unwrap_or_else(|err| {
                tracing::warn!(key, error = %err, "replacing unreadable set");
                Vec::new()
            })
        } else {
            Vec::new()
        };
        if members.iter().any(|m| m == member) {
            return Ok(false);
        }
        members.push(member.to_string());

        *entry.value_mut() = StoredValue {
            value: serde_json::to_string(&members).map_err(StorageError::unavailable)?,
            expires_at_ms,
        };
        Ok(true)
    }

    async fn purge_expired(&self) -> StorageResult<u64> {
        let now = self.clock.now_millis();
        let before = self.entries.len();
        self.entries.retain(|_, stored| stored.expires_at_ms > now);
        Ok(before.saturating_sub(self.entries.len()) as u64)
    }
}
