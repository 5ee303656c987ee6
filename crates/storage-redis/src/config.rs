//! Configuration for the Redis storage backend.
//!
//! [`RedisStorageConfig`] carries everything the backend needs — target
//! address, credentials, logical database, key namespace policy, pool
//! sizing, and retry tuning — as an explicit value passed to the
//! constructor. Nothing is read from process-wide state at call time.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{RedisStorageError, Result};

/// Default maximum number of idle connections kept in the pool.
pub const DEFAULT_MAX_IDLE: usize = 100;

/// How long an idle connection may sit in the pool before it is discarded
/// instead of reused.
pub const IDLE_TIMEOUT: Duration = Duration::from_secs(240);

/// Default maximum retry attempts after the initial try.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Default initial retry backoff.
pub const DEFAULT_INITIAL_BACKOFF: Duration = Duration::from_millis(50);

/// Default retry backoff cap.
pub const DEFAULT_MAX_BACKOFF: Duration = Duration::from_secs(2);

/// Configuration for [`RedisStorage`](crate::RedisStorage).
///
/// # Key namespace
///
/// `key_prefix` namespaces this handler's keys within a shared Redis
/// keyspace; `hash_keys` additionally replaces logical key names with a
/// one-way 32-bit digest. Both must be consistent across every writer and
/// reader of a deployment's keyspace or lookups silently miss.
///
/// # Example
///
/// ```
/// use gatehouse_storage_redis::RedisStorageConfig;
///
/// let config = RedisStorageConfig::builder()
///     .host("redis.internal")
///     .port(6379)
///     .key_prefix("gatehouse-")
///     .build()?;
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RedisStorageConfig {
    /// Redis host.
    pub(crate) host: String,

    /// Redis port.
    pub(crate) port: u16,

    /// Password sent on each new physical connection, when set.
    pub(crate) password: Option<String>,

    /// Logical database index selected on each new physical connection.
    pub(crate) database: i64,

    /// Namespace prefix prepended to every physical key.
    pub(crate) key_prefix: String,

    /// Whether logical keys are replaced by a one-way 32-bit digest.
    pub(crate) hash_keys: bool,

    /// Maximum idle connections retained by the pool.
    pub(crate) max_idle: usize,

    /// Retry tuning for transient failures.
    #[serde(default)]
    pub(crate) retry: RetryConfig,
}

/// Bounded-retry tuning for transient failures.
///
/// The backend retries an operation only on transient errors (connection,
/// timeout), waiting `initial_backoff * 2^attempt` capped at `max_backoff`
/// plus up to 50% jitter between attempts. After `max_retries` additional
/// attempts the last error is returned to the caller.
#[derive(Debug, Clone, Copy, bon::Builder, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RetryConfig {
    /// Maximum number of retry attempts after the initial try.
    #[serde(default = "default_max_retries")]
    #[builder(default = default_max_retries())]
    pub max_retries: u32,

    /// Initial backoff duration.
    #[serde(with = "humantime_serde", default = "default_initial_backoff")]
    #[builder(default = default_initial_backoff())]
    pub initial_backoff: Duration,

    /// Maximum backoff duration.
    #[serde(with = "humantime_serde", default = "default_max_backoff")]
    #[builder(default = default_max_backoff())]
    pub max_backoff: Duration,
}

fn default_max_retries() -> u32 {
    DEFAULT_MAX_RETRIES
}

fn default_initial_backoff() -> Duration {
    DEFAULT_INITIAL_BACKOFF
}

fn default_max_backoff() -> Duration {
    DEFAULT_MAX_BACKOFF
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            initial_backoff: default_initial_backoff(),
            max_backoff: default_max_backoff(),
        }
    }
}

#[bon::bon]
impl RedisStorageConfig {
    /// Creates a new configuration, validating required fields.
    ///
    /// # Optional Fields
    ///
    /// * `host` - Redis host (default: `127.0.0.1`).
    /// * `port` - Redis port (default: 6379).
    /// * `password` - Auth password (default: none).
    /// * `database` - Logical database index (default: 0).
    /// * `key_prefix` - Namespace prefix (default: empty).
    /// * `hash_keys` - One-way key hashing (default: off).
    /// * `max_idle` - Idle-pool cap (default: 100).
    /// * `retry` - Retry tuning (default: 3 attempts, 50 ms..2 s backoff).
    ///
    /// # Errors
    ///
    /// Returns an error if the host is empty or the database index is
    /// negative.
    #[builder]
    pub fn new(
        #[builder(into, default = "127.0.0.1".to_owned())] host: String,
        #[builder(default = 6379)] port: u16,
        #[builder(into)] password: Option<String>,
        #[builder(default = 0)] database: i64,
        #[builder(into, default = String::new())] key_prefix: String,
        #[builder(default = false)] hash_keys: bool,
        #[builder(default = DEFAULT_MAX_IDLE)] max_idle: usize,
        #[builder(default)] retry: RetryConfig,
    ) -> Result<Self> {
        if host.is_empty() {
            return Err(RedisStorageError::Config("host cannot be empty".into()));
        }
        if database < 0 {
            return Err(RedisStorageError::Config("database index cannot be negative".into()));
        }

        Ok(Self { host, port, password, database, key_prefix, hash_keys, max_idle, retry })
    }

    /// Returns the Redis host.
    #[must_use]
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Returns the Redis port.
    #[must_use]
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Returns the namespace prefix.
    #[must_use]
    pub fn key_prefix(&self) -> &str {
        &self.key_prefix
    }

    /// Whether one-way key hashing is enabled.
    #[must_use]
    pub fn hash_keys(&self) -> bool {
        self.hash_keys
    }

    /// Returns the idle-pool cap.
    #[must_use]
    pub fn max_idle(&self) -> usize {
        self.max_idle
    }

    /// Returns the retry tuning.
    #[must_use]
    pub fn retry(&self) -> RetryConfig {
        self.retry
    }

    /// Builds the client connection info. Authentication and database
    /// selection ride along on every new physical connection dialed from
    /// this info, not on individual operations.
    pub(crate) fn connection_info(&self) -> redis::ConnectionInfo {
        redis::ConnectionInfo {
            addr: redis::ConnectionAddr::Tcp(self.host.clone(), self.port),
            redis: redis::RedisConnectionInfo {
                db: self.database,
                username: None,
                password: self.password.clone(),
                protocol: redis::ProtocolVersion::RESP2,
            },
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_reference_tuning() {
        let config = RedisStorageConfig::builder().build().unwrap();
        assert_eq!(config.host(), "127.0.0.1");
        assert_eq!(config.port(), 6379);
        assert_eq!(config.max_idle(), DEFAULT_MAX_IDLE);
        assert!(!config.hash_keys());
        assert_eq!(config.retry().max_retries, 3);
    }

    #[test]
    fn empty_host_is_rejected() {
        let result = RedisStorageConfig::builder().host("").build();
        assert!(matches!(result, Err(RedisStorageError::Config(_))));
    }

    #[test]
    fn negative_database_is_rejected() {
        let result = RedisStorageConfig::builder().database(-1).build();
        assert!(matches!(result, Err(RedisStorageError::Config(_))));
    }

    #[test]
    fn retry_config_deserializes_humantime_durations() {
        let json = r#"{"max_retries":5,"initial_backoff":"100ms","max_backoff":"1s"}"#;
        let retry: RetryConfig = serde_json::from_str(json).unwrap();
        assert_eq!(retry.max_retries, 5);
        assert_eq!(retry.initial_backoff, Duration::from_millis(100));
        assert_eq!(retry.max_backoff, Duration::from_secs(1));
    }

    #[test]
    fn unknown_config_fields_are_rejected() {
        let json = r#"{"max_retries":5,"initial_backoff":"100ms","max_backoff":"1s","oops":1}"#;
        let result: std::result::Result<RetryConfig, _> = serde_json::from_str(json);
        assert!(result.is_err());
    }
}
