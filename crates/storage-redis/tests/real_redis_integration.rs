//! Integration tests for the Redis storage backend with a real Redis server.
//!
//! These tests require a running Redis instance. They are skipped unless the
//! `GATEHOUSE_REDIS_TESTS` environment variable is set.
//!
//! # Running the tests
//!
//! ```bash
//! # Start a local Redis
//! redis-server --port 6379 &
//!
//! # Run tests
//! GATEHOUSE_REDIS_TESTS=1 \
//! REDIS_HOST=127.0.0.1 \
//! REDIS_PORT=6379 \
//! cargo test -p gatehouse-storage-redis --test real_redis_integration
//! ```
//!
//! Keys are namespaced per process (`gh-it-<pid>-`) so concurrent runs
//! against a shared server do not interfere; each test cleans up after
//! itself on the happy path.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::{sync::Arc, time::Duration};

use gatehouse_storage::{testutil::make_key, StorageError, StorageHandler};
use gatehouse_storage_redis::{RedisStorage, RedisStorageConfig};

/// Builds a storage handler for the test server, or `None` when the suite
/// is not enabled.
fn test_storage(hash_keys: bool) -> Option<RedisStorage> {
    if std::env::var("GATEHOUSE_REDIS_TESTS").is_err() {
        eprintln!("skipping: set GATEHOUSE_REDIS_TESTS=1 to run real-Redis tests");
        return None;
    }

    let host = std::env::var("REDIS_HOST").unwrap_or_else(|_| "127.0.0.1".to_owned());
    let port = std::env::var("REDIS_PORT").ok().and_then(|p| p.parse().ok()).unwrap_or(6379);

    let config = RedisStorageConfig::builder()
        .host(host)
        .port(port)
        .key_prefix(format!("gh-it-{}-", std::process::id()))
        .hash_keys(hash_keys)
        .build()
        .expect("valid config");

    Some(RedisStorage::new(config).expect("backend creation should succeed"))
}

// ============================================================================
// Records and TTLs
// ============================================================================

#[tokio::test]
async fn set_get_delete_roundtrip() {
    let Some(storage) = test_storage(false) else { return };

    storage.set_key("it:roundtrip", r#"{"state":"live"}"#, 0).await.expect("set_key");
    let record = storage.get_key("it:roundtrip").await.expect("get_key");
    assert_eq!(record, r#"{"state":"live"}"#);

    assert!(storage.delete_key("it:roundtrip").await.expect("delete_key"));
    let result = storage.get_key("it:roundtrip").await;
    assert!(matches!(result, Err(StorageError::NotFound { .. })), "got: {result:?}");
}

#[tokio::test]
async fn get_exp_reports_ttl_and_distinguishes_no_expiry() {
    let Some(storage) = test_storage(false) else { return };

    storage.set_key("it:ttl", "v", 60).await.expect("set with ttl");
    let remaining = storage.get_exp("it:ttl").await.expect("get_exp");
    assert!(remaining > 0 && remaining <= 60, "remaining = {remaining}");

    storage.set_key("it:nottl", "v", 0).await.expect("set without ttl");
    assert_eq!(storage.get_exp("it:nottl").await.expect("get_exp"), -1);

    let missing = storage.get_exp("it:never-set").await;
    assert!(matches!(missing, Err(StorageError::NotFound { .. })), "got: {missing:?}");

    storage
        .delete_keys(&["it:ttl".to_owned(), "it:nottl".to_owned()])
        .await
        .expect("cleanup");
}

// ============================================================================
// Counters
// ============================================================================

#[tokio::test]
async fn increment_with_expire_is_self_expiring() {
    let Some(storage) = test_storage(false) else { return };

    // Physical key: this operation bypasses the codec.
    let key = format!("gh-it-{}-counter", std::process::id());
    storage.delete_raw_key(&key).await.expect("reset counter");

    assert_eq!(storage.increment_with_expire(&key, 5).await.expect("first incr"), 1);
    assert_eq!(storage.increment_with_expire(&key, 5).await.expect("second incr"), 2);

    storage.delete_raw_key(&key).await.expect("cleanup");
}

// ============================================================================
// Listings and bulk deletes
// ============================================================================

#[tokio::test]
async fn get_keys_sees_only_the_filtered_prefix() {
    let Some(storage) = test_storage(false) else { return };

    let listed = [make_key("it:list", 0), make_key("it:list", 1)];
    storage.set_key(&listed[0], "1", 60).await.expect("set_key");
    storage.set_key(&listed[1], "2", 60).await.expect("set_key");
    storage.set_key("it:other:c", "3", 60).await.expect("set_key");

    let mut keys = storage.get_keys("it:list").await.expect("get_keys");
    keys.sort();
    assert_eq!(keys, listed);

    let values = storage.get_keys_and_values_with_filter("it:list").await.expect("dump");
    assert_eq!(values.len(), 2);
    assert_eq!(values.get(listed[0].as_str()).map(String::as_str), Some("1"));

    storage
        .delete_keys(&[listed[0].clone(), listed[1].clone(), "it:other:c".to_owned()])
        .await
        .expect("cleanup");
}

#[tokio::test]
async fn delete_keys_on_empty_input_is_a_noop() {
    let Some(storage) = test_storage(false) else { return };
    assert!(storage.delete_keys(&[]).await.expect("empty bulk delete"));
}

// ============================================================================
// Key hashing
// ============================================================================

#[tokio::test]
async fn hashed_writes_are_readable_through_an_equally_configured_handler() {
    let Some(writer) = test_storage(true) else { return };
    let Some(reader) = test_storage(true) else { return };

    writer.set_key("it:hashed", "opaque", 60).await.expect("set_key");
    assert_eq!(reader.get_key("it:hashed").await.expect("get_key"), "opaque");

    writer.delete_key("it:hashed").await.expect("cleanup");
}

// ============================================================================
// Rolling window
// ============================================================================

#[tokio::test]
async fn rolling_window_counts_prior_events_only() {
    let Some(storage) = test_storage(false) else { return };

    let key = format!("gh-it-{}-window", std::process::id());
    storage.delete_raw_key(&key).await.expect("reset window");

    assert_eq!(storage.set_rolling_window(&key, 10, 10).await.expect("first"), 0);
    assert_eq!(storage.set_rolling_window(&key, 10, 10).await.expect("second"), 1);

    storage.delete_raw_key(&key).await.expect("cleanup");
}

#[tokio::test]
async fn rolling_window_purges_after_the_period() {
    let Some(storage) = test_storage(false) else { return };

    let key = format!("gh-it-{}-window-purge", std::process::id());
    storage.delete_raw_key(&key).await.expect("reset window");

    assert_eq!(storage.set_rolling_window(&key, 1, 1).await.expect("first"), 0);
    tokio::time::sleep(Duration::from_millis(1100)).await;
    assert_eq!(
        storage.set_rolling_window(&key, 1, 1).await.expect("after period"),
        0,
        "events older than the period must be purged"
    );

    storage.delete_raw_key(&key).await.expect("cleanup");
}

#[tokio::test]
async fn concurrent_window_calls_never_share_a_count() {
    const TASKS: usize = 8;

    let Some(storage) = test_storage(false) else { return };
    let storage = Arc::new(storage);

    let key = format!("gh-it-{}-window-contended", std::process::id());
    storage.delete_raw_key(&key).await.expect("reset window");

    let mut handles = Vec::with_capacity(TASKS);
    for _ in 0..TASKS {
        let storage = Arc::clone(&storage);
        let key = key.clone();
        handles.push(tokio::spawn(async move {
            storage.set_rolling_window(&key, 30, 30).await.expect("window")
        }));
    }

    let mut counts = Vec::with_capacity(TASKS);
    for handle in handles {
        counts.push(handle.await.expect("join"));
    }
    counts.sort_unstable();

    let expected: Vec<usize> = (0..TASKS).collect();
    assert_eq!(counts, expected, "MULTI/EXEC must serialize concurrent window updates");

    storage.delete_raw_key(&key).await.expect("cleanup");
}

// ============================================================================
// Pub/sub
// ============================================================================

#[tokio::test]
async fn publish_reaches_a_live_subscription() {
    let Some(storage) = test_storage(false) else { return };

    let channel = format!("gh-it-{}-invalidate", std::process::id());
    let mut subscription = storage.subscribe(&channel).await.expect("subscribe");

    // The publish may race the SUBSCRIBE taking effect server-side; give it
    // a moment and retry a few times.
    let mut received = None;
    for _ in 0..10 {
        storage.publish(&channel, "flush:apikey:123").await.expect("publish");
        match tokio::time::timeout(Duration::from_millis(300), subscription.recv()).await {
            Ok(message) => {
                received = message;
                break;
            }
            Err(_elapsed) => continue,
        }
    }
    assert_eq!(received.as_deref(), Some("flush:apikey:123"));

    subscription.stop();
    // Drain anything the retry loop over-published, then join.
    while let Some(_extra) = subscription.recv().await {}
    subscription.join().await.expect("clean stop");
}
