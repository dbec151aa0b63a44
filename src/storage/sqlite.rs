use async_trait::async_trait;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;
use std::sync::Arc;
use std::time::Duration;

use crate::clock::{Clock, SystemClock};
use crate::storage::{CounterStore, StorageResult};

pub struct SqliteStore {
    pool: Arc<SqlitePool>,
    clock: Arc<dyn Clock>,
}

impl SqliteStore {
    pub async fn new(database_url: &str, max_connections: u32) -> StorageResult<Self> {
        Self::with_clock(database_url, max_connections, Arc::new(SystemClock::new())).await
    }

    pub async fn with_clock(
        database_url: &str,
        max_connections: u32,
        clock: Arc<dyn Clock>,
    ) -> StorageResult<Self> {
        let pool = SqlitePoolOptions::new()
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
impl CounterStore for SqliteStore {
    async fn init(&self) -> StorageResult<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS kv_entries (
                key TEXT PRIMARY KEY NOT NULL,
                value TEXT NOT NULL,
                expires_at INTEGER NOT NULL
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
            r#"
            SELECT value FROM kv_entries
            WHERE key = ? AND expires_at > ?
            "#,
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
            VALUES (?, ?, ?)
            ON CONFLICT(key) DO UPDATE SET
                value = excluded.value,
                expires_at = excluded.expires_at
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
        let count = sqlx::query_scalar::<_, i64>(
            r#"
            INSERT INTO kv_entries (key, value, expires_at)
            VALUES (?1, '1', ?2)
            ON CONFLICT(key) DO UPDATE SET
                value = CASE
                    WHEN kv_entries.expires_at <= ?3 THEN '1'
                    ELSE CAST(COALESCE(CAST(kv_entries.value AS INTEGER), 0) + 1 AS TEXT)
                END,
                expires_at = excluded.expires_at
            RETURNING CAST(value AS INTEGER)
            "#,
        )
        .bind(key)
        .bind(self.expiry(ttl))
        .bind(self.now())
        .fetch_one(self.pool.as_ref())
        .await?;

        Ok(count.max(0) as u64)
    }

    async fn put_if_absent(&self, key: &str, value: &str, ttl: Duration) -> StorageResult<String> {
        let stored = sqlx::query_scalar::<_, String>(
            r#"
            INSERT INTO kv_entries (key, value, expires_at)
            VALUES (?1, ?2, ?3)
            ON CONFLICT(key) DO UPDATE SET
                value = CASE WHEN kv_entries.expires_at <= ?4 THEN excluded.value ELSE kv_entries.value END,
                expires_at = CASE WHEN kv_entries.expires_at <= ?4 THEN excluded.expires_at ELSE kv_entries.expires_at END
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
        // A live set that already holds the member is left untouched; an
        // expired or unreadable one is replaced.
        let result = sqlx::query(
            r#"
            INSERT INTO kv_entries (key, value, expires_at)
            VALUES (?1, json_array(?2), ?3)
            ON CONFLICT(key) DO UPDATE SET
                value = CASE
                    WHEN kv_entries.expires_at <= ?4 OR json_valid(kv_entries.value) = 0
                        THEN json_array(?2)
                    ELSE json_insert(kv_entries.value, '$[#]', ?2)
                END,
                expires_at = excluded.expires_at
            WHERE kv_entries.expires_at <= ?4
                OR json_valid(kv_entries.value) = 0
                OR NOT EXISTS (
                    SELECT 1 FROM json_each(kv_entries.value) AS m WHERE m.value = ?2
                )
            "#,
        )
        .bind(key)
        .bind(member)
        .bind(self.expiry(ttl))
        .bind(self.now())
        .execute(self.pool.as_ref())
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn purge_expired(&self) -> StorageResult<u64> {
        let result = sqlx::query("DELETE FROM kv_entries WHERE expires_at <= ?")
            .bind(self.now())
            .execute(self.pool.as_ref())
            .await?;

        Ok(result.rows_affected())
    }
}
