//! Integration tests for the SQL counter stores
//!
//! Tests can be filtered by database backend using the DATABASE_BACKEND environment variable:
//! - `DATABASE_BACKEND=sqlite cargo test` - Run only SQLite tests
//! - `DATABASE_BACKEND=postgres cargo test` - Run only PostgreSQL tests (needs DATABASE_URL)
//! - By default, both backends are tested

use beacon::clock::{Clock, ManualClock};
use beacon::storage::{CounterStore, PostgresStore, SqliteStore};
use std::sync::Arc;
use std::time::Duration;

const TTL: Duration = Duration::from_secs(60);

/// Get the database backend to test from environment variable
fn should_test_backend(backend: &str) -> bool {
    match std::env::var("DATABASE_BACKEND") {
        Ok(val) => val.to_lowercase() == backend.to_lowercase(),
        Err(_) => true, // Test all backends if not specified
    }
}

/// Helper to create SQLite test storage.
///
/// Each in-memory connection is a separate database, so the pool is capped at one.
async fn create_sqlite_store(clock: Arc<dyn Clock>) -> Arc<dyn CounterStore> {
    let store = SqliteStore::with_clock("sqlite::memory:", 1, clock)
        .await
        .unwrap();
    store.init().await.unwrap();
    Arc::new(store)
}

/// Helper to create PostgreSQL test storage
async fn create_postgres_store(clock: Arc<dyn Clock>) -> Option<Arc<dyn CounterStore>> {
    let db_url = std::env::var("DATABASE_URL").ok()?;
    if !db_url.starts_with("postgres") {
        return None;
    }
    let store = PostgresStore::with_clock(&db_url, 5, clock).await.ok()?;
    store.init().await.ok()?;
    Some(Arc::new(store))
}

/// Keys unique to one test run so shared Postgres databases don't collide
fn key(name: &str) -> String {
    format!("test:{}:{}", std::process::id(), name)
}

async fn check_put_get_and_expiry(store: &dyn CounterStore, clock: &ManualClock) {
    let k = key("put");
    store.put(&k, "hello", Duration::from_secs(10)).await.unwrap();
    assert_eq!(store.get(&k).await.unwrap().as_deref(), Some("hello"));

    store.put(&k, "world", Duration::from_secs(10)).await.unwrap();
    assert_eq!(store.get(&k).await.unwrap().as_deref(), Some("world"));

    clock.advance(10_000);
    assert_eq!(store.get(&k).await.unwrap(), None);
    assert_eq!(store.get(&key("missing")).await.unwrap(), None);
}

async fn check_increment(store: &dyn CounterStore, clock: &ManualClock) {
    let k = key("incr");
    assert_eq!(store.increment(&k, Duration::from_secs(5)).await.unwrap(), 1);
    assert_eq!(store.increment(&k, Duration::from_secs(5)).await.unwrap(), 2);
    assert_eq!(store.get(&k).await.unwrap().as_deref(), Some("2"));

    // An expired counter starts over
    clock.advance(5_000);
    assert_eq!(store.increment(&k, Duration::from_secs(5)).await.unwrap(), 1);

    // A non-numeric value counts as zero
    let junk = key("incr-junk");
    store.put(&junk, "abc", TTL).await.unwrap();
    assert_eq!(store.increment(&junk, TTL).await.unwrap(), 1);
}

async fn check_put_if_absent(store: &dyn CounterStore, clock: &ManualClock) {
    let k = key("salt");
    assert_eq!(
        store.put_if_absent(&k, "first", Duration::from_secs(5)).await.unwrap(),
        "first"
    );
    assert_eq!(
        store.put_if_absent(&k, "second", Duration::from_secs(5)).await.unwrap(),
        "first"
    );

    clock.advance(5_000);
    assert_eq!(
        store.put_if_absent(&k, "third", Duration::from_secs(5)).await.unwrap(),
        "third"
    );
}

async fn check_add_to_set(store: &dyn CounterStore) {
    let k = key("set");
    assert!(store.add_to_set(&k, "a", TTL).await.unwrap());
    assert!(store.add_to_set(&k, "b", TTL).await.unwrap());
    assert!(!store.add_to_set(&k, "a", TTL).await.unwrap());

    let raw = store.get(&k).await.unwrap().unwrap();
    let mut members: Vec<String> = serde_json::from_str(&raw).unwrap();
    members.sort();
    assert_eq!(members, vec!["a", "b"]);

    // Members with JSON metacharacters are stored verbatim
    assert!(store.add_to_set(&k, "quote\"d", TTL).await.unwrap());
    let raw = store.get(&k).await.unwrap().unwrap();
    let members: Vec<String> = serde_json::from_str(&raw).unwrap();
    assert!(members.contains(&"quote\"d".to_string()));

    // An unreadable set is replaced
    let corrupt = key("set-corrupt");
    store.put(&corrupt, "{not json", TTL).await.unwrap();
    assert!(store.add_to_set(&corrupt, "a", TTL).await.unwrap());
    let raw = store.get(&corrupt).await.unwrap().unwrap();
    let members: Vec<String> = serde_json::from_str(&raw).unwrap();
    assert_eq!(members, vec!["a"]);
}

async fn check_purge_expired(store: &dyn CounterStore, clock: &ManualClock) {
    let short = key("purge-short");
    let long = key("purge-long");
    store.put(&short, "1", Duration::from_secs(1)).await.unwrap();
    store.put(&long, "1", Duration::from_secs(3600)).await.unwrap();

    clock.advance(2_000);
    assert!(store.purge_expired().await.unwrap() >= 1);
    assert_eq!(store.get(&long).await.unwrap().as_deref(), Some("1"));
    assert_eq!(store.get(&short).await.unwrap(), None);
}

#[tokio::test]
async fn test_sqlite_store_operations() {
    if !should_test_backend("sqlite") {
        return;
    }

    let clock = Arc::new(ManualClock::new(1_700_000_000_000));
    let store = create_sqlite_store(clock.clone()).await;

    check_put_get_and_expiry(store.as_ref(), &clock).await;
    check_increment(store.as_ref(), &clock).await;
    check_put_if_absent(store.as_ref(), &clock).await;
    check_add_to_set(store.as_ref()).await;
    check_purge_expired(store.as_ref(), &clock).await;
}

#[tokio::test]
async fn test_sqlite_init_is_idempotent() {
    if !should_test_backend("sqlite") {
        return;
    }

    let clock = Arc::new(ManualClock::new(0));
    let store = create_sqlite_store(clock).await;
    store.put("k", "v", TTL).await.unwrap();
    store.init().await.unwrap();
    assert_eq!(store.get("k").await.unwrap().as_deref(), Some("v"));
}

#[tokio::test]
async fn test_postgres_store_operations() {
    if !should_test_backend("postgres") {
        return;
    }

    let clock = Arc::new(ManualClock::new(1_700_000_000_000));
    let Some(store) = create_postgres_store(clock.clone()).await else {
        eprintln!("Skipping PostgreSQL test: DATABASE_URL not set or unreachable");
        return;
    };

    check_put_get_and_expiry(store.as_ref(), &clock).await;
    check_increment(store.as_ref(), &clock).await;
    check_put_if_absent(store.as_ref(), &clock).await;
    check_add_to_set(store.as_ref()).await;
    check_purge_expired(store.as_ref(), &clock).await;
}
