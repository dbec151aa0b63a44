use async_trait::async_trait;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use std::sync::Arc;
use std::time::Duration;

use crate::clock::{Clock, SystemClock};
use crate::storage::{CounterStore, StorageError, StorageResult};

pub struct PostgresStore {
    pool: Arc<PgPool>,
    clock: Arc<dyn Clock>,
}

impl PostgresStore {
    pub async fn new(database_url: &str, max_connections: u32) -> StorageResult<Self> {
        Self::with_clock(database_url, max_connections, Arc::new(SystemClock::new())).await
    }

    pub async fn with_clock(
        database_url: &str,
        max_connections: u32,
        clock: Arc<dyn Clock>,
    ) -> StorageResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;
        Ok(Self {
            pool: Arc::new(pool),
            clock,
        })
    }

    fn now(&self) -> i64 {
        self.clock.now_millis()
    }

    fn expiry(&self, ttl: Duration) -> i64 {
        self.now() + ttl.as_millis() as i64
    }
}

#[async_trait]
impl CounterStore for PostgresStore {
    async fn init(&self) -> StorageResult<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS kv_entries (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                expires_at BIGINT NOT NULL
            )
            "#,
        )
        .execute(self.pool.as_ref())
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_kv_expires_at ON kv_entries(expires_at)")
            .execute(self.pool.as_ref())
            .await?;

        Ok(())
    }

    async fn get(&self, key: &str) -> StorageResult<Option<String>> {
        let value = sqlx::query_scalar::<_, String>(
            "SELECT value FROM kv_entries WHERE key = $1 AND expires_at > $2",
        )
        .bind(key)
        .bind(self.now())
        .fetch_optional(self.pool.as_ref())
        .await?;

        Ok(value)
    }

    async fn put(&self, key: &str, value: &str, ttl: Duration) -> StorageResult<()> {
        sqlx::query(
            r#"
            INSERT INTO kv_entries (key, value, expires_at)
            VALUES ($1, $2, $3)
            ON CONFLICT (key) DO UPDATE SET
                value = EXCLUDED.value,
                expires_at = EXCLUDED.expires_at
            "#,
        )
        .bind(key)
        .bind(value)
        .bind(self.expiry(ttl))
        .execute(self.pool.as_ref())
        .await?;

        Ok(())
    }

    async fn increment(&self, key: &str, ttl: Duration) -> StorageResult<u64> {
        let count = sqlx::query_scalar::<_, String>(
            r#"
            INSERT INTO kv_entries (key, value, expires_at)
            VALUES ($1, '1', $2)
            ON CONFLICT (key) DO UPDATE SET
                value = CASE
                    WHEN kv_entries.expires_at <= $3 OR kv_entries.value !~ '^[0-9]+$' THEN '1'
                    ELSE (kv_entries.value::BIGINT + 1)::TEXT
                END,
                expires_at = EXCLUDED.expires_at
            RETURNING value
            "#,
        )
        .bind(key)
        .bind(self.expiry(ttl))
        .bind(self.now())
        .fetch_one(self.pool.as_ref())
        .await?;

        Ok(count.parse::<u64>().unwrap_or(0))
    }

    async fn put_if_absent(&self, key: &str, value: &str, ttl: Duration) -> StorageResult<String> {
        let stored = sqlx::query_scalar::<_, String>(
            r#"
            INSERT INTO kv_entries (key, value, expires_at)
            VALUES ($1, $2, $3)
            ON CONFLICT (key) DO UPDATE SET
                value = CASE WHEN kv_entries.expires_at <= $4 THEN EXCLUDED.value ELSE kv_entries.value END,
                expires_at = CASE WHEN kv_entries.expires_at <= $4 THEN EXCLUDED.expires_at ELSE kv_entries.expires_at END
            RETURNING value
            "#,
        )
        .bind(key)
        .bind(value)
        .bind(self.expiry(ttl))
        .bind(self.now())
        .fetch_one(self.pool.as_ref())
        .await?;

        Ok(stored)
    }

    async fn add_to_set(&self, key: &str, member: &str, ttl: Duration) -> StorageResult<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO kv_entries (key, value, expires_at)
            VALUES ($1, jsonb_build_array($2::TEXT)::TEXT, $3)
            ON CONFLICT (key) DO UPDATE SET
                value = CASE
                    WHEN kv_entries.expires_at <= $4 THEN jsonb_build_array($2::TEXT)::TEXT
                    ELSE (kv_entries.value::JSONB || jsonb_build_array($2::TEXT))::TEXT
                END,
                expires_at = EXCLUDED.expires_at
            WHERE kv_entries.expires_at <= $4
                OR NOT (kv_entries.value::JSONB @> jsonb_build_array($2::TEXT))
            "#,
        )
        .bind(key)
        .bind(member)
        .bind(self.expiry(ttl))
        .bind(self.now())
        .execute(self.pool.as_ref())
        .await;

        match result {
            Ok(result) => Ok(result.rows_affected() > 0),
            Err(e) if is_invalid_json(&e) => {
                tracing::warn!(key, "replacing unreadable set");
                let fresh = serde_json::to_string(&[member]).map_err(StorageError::unavailable)?;
                self.put(key, &fresh, ttl).await?;
                Ok(true)
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn purge_expired(&self) -> StorageResult<u64> {
        let result = sqlx::query("DELETE FROM kv_entries WHERE expires_at <= $1")
            .bind(self.now())
            .execute(self.pool.as_ref())
            .await?;

        Ok(result.rows_affected())
    }
}

/// `invalid_text_representation`, raised when a stored set is not JSON
fn is_invalid_json(err: &sqlx::Error) -> bool {
    err.as_database_error()
        .and_then(|db| db.code())
        .is_some_and(|code| code == "22P02")
}
