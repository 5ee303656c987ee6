//! Redis-backed storage handler implementation.
//!
//! [`RedisStorage`] implements the
//! [`StorageHandler`](gatehouse_storage::StorageHandler) contract against a
//! shared Redis instance through the checkout/release pool. Every operation
//! borrows a connection for its round trips, releases it on success, and is
//! wrapped in the bounded retry loop so brief backend unavailability heals
//! transparently instead of failing the request.

use std::{
    collections::HashMap,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    time::{SystemTime, UNIX_EPOCH},
};

use async_trait::async_trait;
use gatehouse_storage::{KeyCodec, StorageError, StorageHandler, StorageResult};
use redis::AsyncCommands;

use crate::{
    config::{RedisStorageConfig, RetryConfig},
    error::{Result, redis_error_to_storage_error},
    pool::ConnectionPool,
    pubsub::Subscription,
    retry::with_retry,
};

/// Process-wide sequence disambiguating window members recorded at the same
/// timestamp. Nanosecond clocks can repeat under bursts (or be coarser than
/// advertised); the suffix keeps every recorded event distinct.
static WINDOW_SEQ: AtomicU64 = AtomicU64::new(0);

/// Epoch timestamp in nanoseconds. A pre-epoch system clock degrades to 0.
fn epoch_nanos() -> i64 {
    SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_nanos() as i64).unwrap_or(0)
}

/// Lower bound of the live window: scores at or below this are expired.
fn cutoff_ns(now_ns: i64, period_secs: i64) -> i64 {
    now_ns - period_secs.saturating_mul(1_000_000_000)
}

/// Sorted-set member for an event recorded at `now_ns`.
fn window_member(now_ns: i64) -> String {
    format!("{now_ns}-{}", WINDOW_SEQ.fetch_add(1, Ordering::Relaxed))
}

/// Redis implementation of [`StorageHandler`].
///
/// Cheaply cloneable; all clones share one connection pool. The handler
/// itself holds no locks — concurrency safety comes from single-command
/// atomicity, the MULTI/EXEC batch used by
/// [`set_rolling_window`](StorageHandler::set_rolling_window), and the
/// pool's internal synchronization.
///
/// # Example
///
/// ```no_run
/// use gatehouse_storage::StorageHandler;
/// use gatehouse_storage_redis::{RedisStorage, RedisStorageConfig};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let config = RedisStorageConfig::builder()
///     .host("127.0.0.1")
///     .key_prefix("gatehouse-")
///     .build()?;
/// let storage = RedisStorage::new(config)?;
///
/// storage.set_key("session:42", r#"{"quota":100}"#, 60).await?;
/// let record = storage.get_key("session:42").await?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct RedisStorage {
    pool: Arc<ConnectionPool>,
    codec: KeyCodec,
    retry: RetryConfig,
    config: RedisStorageConfig,
}

impl std::fmt::Debug for RedisStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisStorage")
            .field("target", &format!("{}:{}", self.config.host(), self.config.port()))
            .field("key_prefix", &self.config.key_prefix())
            .field("hash_keys", &self.config.hash_keys())
            .finish_non_exhaustive()
    }
}

impl RedisStorage {
    /// Creates a handler for the configured Redis target.
    ///
    /// No connection is dialed here — the pool establishes connections
    /// lazily on first use.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration produces an invalid connection
    /// target.
    pub fn new(config: RedisStorageConfig) -> Result<Self> {
        let codec = KeyCodec::new(config.key_prefix(), config.hash_keys());
        let pool = Arc::new(ConnectionPool::new(&config)?);
        Ok(Self { pool, codec, retry: config.retry(), config })
    }

    /// Returns the codec this handler encodes keys with.
    #[must_use]
    pub fn codec(&self) -> &KeyCodec {
        &self.codec
    }

    /// Subscribes to a pub/sub channel on a dedicated connection.
    ///
    /// See [`Subscription`] for delivery, stop, and terminal-error
    /// semantics. The subscription connection is separate from the command
    /// pool; a transport failure there does not disturb command traffic.
    pub async fn subscribe(&self, channel: &str) -> StorageResult<Subscription> {
        let client =
            redis::Client::open(self.config.connection_info()).map_err(redis_error_to_storage_error)?;
        Subscription::start(client, channel).await
    }

    /// Drives `on_message` for every message published on `channel` until
    /// the subscription ends.
    ///
    /// Blocks the calling task: each payload is handed to `on_message`
    /// synchronously before the next is awaited. Returns `Ok(())` only if
    /// the subscription was stopped cleanly; a transport failure surfaces
    /// as the terminal error, and reconnecting is the caller's decision.
    pub async fn listen<F>(&self, channel: &str, mut on_message: F) -> StorageResult<()>
    where
        F: FnMut(String) + Send,
    {
        let mut subscription = self.subscribe(channel).await?;
        while let Some(message) = subscription.recv().await {
            on_message(message);
        }
        subscription.join().await
    }

    /// Bulk read of `physical_keys`, paired with decoded logical names.
    async fn multi_get(
        &self,
        physical_keys: Vec<String>,
    ) -> StorageResult<HashMap<String, String>> {
        if physical_keys.is_empty() {
            return Ok(HashMap::new());
        }

        let mut conn = self.pool.checkout().await?;
        let values: Vec<Option<String>> = redis::cmd("MGET")
            .arg(&physical_keys)
            .query_async(&mut conn)
            .await
            .map_err(redis_error_to_storage_error)?;
        self.pool.release(conn);

        // A key deleted between KEYS and MGET reads as nil; skip it.
        Ok(physical_keys
            .into_iter()
            .zip(values)
            .filter_map(|(key, value)| value.map(|v| (self.codec.decode(&key), v)))
            .collect())
    }

    /// KEYS glob for the given pattern.
    async fn scan_pattern(&self, pattern: &str) -> StorageResult<Vec<String>> {
        let mut conn = self.pool.checkout().await?;
        let keys: Vec<String> =
            conn.keys(pattern).await.map_err(redis_error_to_storage_error)?;
        self.pool.release(conn);
        Ok(keys)
    }
}

#[async_trait]
impl StorageHandler for RedisStorage {
    async fn connect(&self) -> StorageResult<()> {
        tracing::info!(
            host = self.config.host(),
            port = self.config.port(),
            "initializing redis connection pool"
        );
        // Connections are dialed lazily; re-initializing means discarding
        // whatever idle state the pool accumulated.
        self.pool.reset();
        Ok(())
    }

    async fn get_key(&self, key_name: &str) -> StorageResult<String> {
        let physical = self.codec.encode(key_name);
        tracing::debug!(key = %physical, "GET");

        with_retry(&self.retry, "get_key", || {
            let physical = physical.clone();
            async move {
                let mut conn = self.pool.checkout().await?;
                let value: Option<String> =
                    conn.get(&physical).await.map_err(redis_error_to_storage_error)?;
                self.pool.release(conn);
                value.ok_or_else(|| StorageError::not_found(key_name))
            }
        })
        .await
    }

    async fn set_key(&self, key_name: &str, value: &str, ttl_secs: i64) -> StorageResult<()> {
        let physical = self.codec.encode(key_name);
        tracing::debug!(key = %physical, ttl_secs, "SET");

        with_retry(&self.retry, "set_key", || {
            let physical = physical.clone();
            async move {
                let mut conn = self.pool.checkout().await?;
                let _: () =
                    conn.set(&physical, value).await.map_err(redis_error_to_storage_error)?;
                if ttl_secs > 0 {
                    let _: i64 = conn
                        .expire(&physical, ttl_secs)
                        .await
                        .map_err(redis_error_to_storage_error)?;
                }
                self.pool.release(conn);
                Ok(())
            }
        })
        .await
    }

    async fn get_exp(&self, key_name: &str) -> StorageResult<i64> {
        let physical = self.codec.encode(key_name);
        tracing::debug!(key = %physical, "TTL");

        with_retry(&self.retry, "get_exp", || {
            let physical = physical.clone();
            async move {
                let mut conn = self.pool.checkout().await?;
                let ttl: i64 = conn.ttl(&physical).await.map_err(redis_error_to_storage_error)?;
                self.pool.release(conn);
                // -2 is the backend's "no such key"; -1 (no expiry) passes
                // through so callers can tell the cases apart.
                if ttl == -2 {
                    return Err(StorageError::not_found(key_name));
                }
                Ok(ttl)
            }
        })
        .await
    }

    async fn get_keys(&self, filter: &str) -> StorageResult<Vec<String>> {
        let pattern = format!("{}{}*", self.codec.prefix(), self.codec.hash(filter));
        tracing::debug!(pattern = %pattern, "KEYS");

        with_retry(&self.retry, "get_keys", || {
            let pattern = pattern.clone();
            async move {
                let keys = self.scan_pattern(&pattern).await?;
                Ok(keys.iter().map(|key| self.codec.decode(key)).collect())
            }
        })
        .await
    }

    async fn get_keys_and_values(&self) -> StorageResult<HashMap<String, String>> {
        let pattern = format!("{}*", self.codec.prefix());
        tracing::debug!(pattern = %pattern, "KEYS + MGET full scan");

        with_retry(&self.retry, "get_keys_and_values", || {
            let pattern = pattern.clone();
            async move {
                let keys = self.scan_pattern(&pattern).await?;
                self.multi_get(keys).await
            }
        })
        .await
    }

    async fn get_keys_and_values_with_filter(
        &self,
        filter: &str,
    ) -> StorageResult<HashMap<String, String>> {
        let pattern = format!("{}{}*", self.codec.prefix(), self.codec.hash(filter));
        tracing::debug!(pattern = %pattern, "KEYS + MGET filtered scan");

        with_retry(&self.retry, "get_keys_and_values_with_filter", || {
            let pattern = pattern.clone();
            async move {
                let keys = self.scan_pattern(&pattern).await?;
                self.multi_get(keys).await
            }
        })
        .await
    }

    async fn delete_key(&self, key_name: &str) -> StorageResult<bool> {
        let physical = self.codec.encode(key_name);
        tracing::debug!(key = %physical, "DEL");

        with_retry(&self.retry, "delete_key", || {
            let physical = physical.clone();
            async move {
                let mut conn = self.pool.checkout().await?;
                let removed: i64 =
                    conn.del(&physical).await.map_err(redis_error_to_storage_error)?;
                self.pool.release(conn);
                Ok(removed > 0)
            }
        })
        .await
    }

    async fn delete_raw_key(&self, key_name: &str) -> StorageResult<bool> {
        tracing::debug!(key = %key_name, "DEL raw");

        with_retry(&self.retry, "delete_raw_key", || async move {
            let mut conn = self.pool.checkout().await?;
            let removed: i64 = conn.del(key_name).await.map_err(redis_error_to_storage_error)?;
            self.pool.release(conn);
            Ok(removed > 0)
        })
        .await
    }

    async fn delete_keys(&self, keys: &[String]) -> StorageResult<bool> {
        if keys.is_empty() {
            tracing::debug!("bulk DEL with nothing to delete");
            return Ok(true);
        }

        let physical: Vec<String> = keys.iter().map(|key| self.codec.encode(key)).collect();
        tracing::debug!(count = physical.len(), "bulk DEL");

        with_retry(&self.retry, "delete_keys", || {
            let physical = physical.clone();
            async move {
                let mut conn = self.pool.checkout().await?;
                let _: i64 = conn.del(&physical).await.map_err(redis_error_to_storage_error)?;
                self.pool.release(conn);
                Ok(true)
            }
        })
        .await
    }

    async fn delete_raw_keys(&self, keys: &[String], prefix: &str) -> StorageResult<bool> {
        if keys.is_empty() {
            tracing::debug!("bulk raw DEL with nothing to delete");
            return Ok(true);
        }

        let physical: Vec<String> = keys.iter().map(|key| format!("{prefix}{key}")).collect();
        tracing::debug!(count = physical.len(), "bulk raw DEL");

        with_retry(&self.retry, "delete_raw_keys", || {
            let physical = physical.clone();
            async move {
                let mut conn = self.pool.checkout().await?;
                let _: i64 = conn.del(&physical).await.map_err(redis_error_to_storage_error)?;
                self.pool.release(conn);
                Ok(true)
            }
        })
        .await
    }

    async fn decrement(&self, key_name: &str) -> StorageResult<()> {
        let physical = self.codec.encode(key_name);
        tracing::debug!(key = %physical, "DECR");

        with_retry(&self.retry, "decrement", || {
            let physical = physical.clone();
            async move {
                let mut conn = self.pool.checkout().await?;
                let _: i64 = conn.decr(&physical, 1).await.map_err(redis_error_to_storage_error)?;
                self.pool.release(conn);
                Ok(())
            }
        })
        .await
    }

    async fn increment_with_expire(&self, key_name: &str, ttl_secs: i64) -> StorageResult<i64> {
        // Physical-key operation: no codec.
        tracing::debug!(key = %key_name, ttl_secs, "INCR");

        with_retry(&self.retry, "increment_with_expire", || async move {
            let mut conn = self.pool.checkout().await?;
            let value: i64 = conn.incr(key_name, 1).await.map_err(redis_error_to_storage_error)?;
            // First writer sets the expiry; later increments leave it alone.
            if value == 1 && ttl_secs > 0 {
                let _: i64 =
                    conn.expire(key_name, ttl_secs).await.map_err(redis_error_to_storage_error)?;
            }
            self.pool.release(conn);
            Ok(value)
        })
        .await
    }

    async fn set_rolling_window(
        &self,
        key_name: &str,
        period_secs: i64,
        _ttl_secs: i64,
    ) -> StorageResult<usize> {
        tracing::debug!(key = %key_name, period_secs, "rolling window");

        with_retry(&self.retry, "set_rolling_window", || async move {
            let now_ns = epoch_nanos();
            let cutoff = cutoff_ns(now_ns, period_secs);
            let member = window_member(now_ns);

            let mut conn = self.pool.checkout().await?;
            // One atomic batch: purge the stale tail, snapshot the surviving
            // window, record this event, and refresh the set's lifetime.
            // Concurrent callers serialize on the EXEC, so no two observe
            // the same pre-insert snapshot.
            let (_purged, snapshot, _added, _refreshed): (i64, Vec<String>, i64, i64) =
                redis::pipe()
                    .atomic()
                    .cmd("ZREMRANGEBYSCORE")
                    .arg(key_name)
                    .arg("-inf")
                    .arg(cutoff)
                    .cmd("ZRANGE")
                    .arg(key_name)
                    .arg(0)
                    .arg(-1)
                    .cmd("ZADD")
                    .arg(key_name)
                    .arg(now_ns)
                    .arg(&member)
                    .cmd("EXPIRE")
                    .arg(key_name)
                    .arg(period_secs)
                    .query_async(&mut conn)
                    .await
                    .map_err(redis_error_to_storage_error)?;
            self.pool.release(conn);

            // Occupancy before the event just recorded.
            Ok(snapshot.len())
        })
        .await
    }

    async fn publish(&self, channel: &str, message: &str) -> StorageResult<()> {
        with_retry(&self.retry, "publish", || async move {
            let mut conn = self.pool.checkout().await?;
            let receivers: i64 =
                conn.publish(channel, message).await.map_err(redis_error_to_storage_error)?;
            self.pool.release(conn);
            tracing::debug!(channel, receivers, "PUBLISH");
            Ok(())
        })
        .await
    }
}
