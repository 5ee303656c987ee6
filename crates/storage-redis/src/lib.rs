//! Redis-backed implementation of
//! [`StorageHandler`](gatehouse_storage::StorageHandler) for Gatehouse.
//!
//! This crate provides [`RedisStorage`], the production storage backend for
//! the gateway's session, quota, and rate-limiting state. It reaches a
//! shared Redis instance through a checkout/release connection pool,
//! namespaces keys through the shared
//! [`KeyCodec`](gatehouse_storage::KeyCodec), and wraps every operation in a
//! bounded retry loop so brief backend unavailability heals transparently.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                 Gateway request handlers                    │
//! ├─────────────────────────────────────────────────────────────┤
//! │                    RedisStorage                             │
//! │           (implements StorageHandler trait)                 │
//! ├──────────────────────────────┬──────────────────────────────┤
//! │        ConnectionPool        │        Subscription          │
//! │  checkout / PING / release   │   dedicated pub/sub task     │
//! ├──────────────────────────────┴──────────────────────────────┤
//! │                         Redis                               │
//! │   strings │ counters │ sorted sets (rate windows) │ pub/sub │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Quick Start
//!
//! ```no_run
//! use gatehouse_storage::StorageHandler;
//! use gatehouse_storage_redis::{RedisStorage, RedisStorageConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = RedisStorageConfig::builder()
//!         .host("127.0.0.1")
//!         .key_prefix("gatehouse-")
//!         .build()?;
//!     let storage = RedisStorage::new(config)?;
//!
//!     storage.set_key("session:42", r#"{"quota":100}"#, 60).await?;
//!     let record = storage.get_key("session:42").await?;
//!     assert_eq!(record, r#"{"quota":100}"#);
//!
//!     Ok(())
//! }
//! ```
//!
//! # Atomicity
//!
//! Single-key operations rely on Redis command atomicity. The sliding
//! rate-limit window is a single MULTI/EXEC batch (purge, snapshot, insert,
//! refresh TTL), so concurrent callers against one key observe strictly
//! increasing occupancy counts with no lost updates.
//!
//! # Failure model
//!
//! Transient failures (dial refused, dropped connection, timeout) are
//! retried with exponential backoff and jitter up to the configured attempt
//! budget, then surfaced as typed
//! [`StorageError`](gatehouse_storage::StorageError)s. Command failures are
//! never retried. Pub/sub transport failures terminate the subscription and
//! are reported through [`Subscription::join`].

#![warn(missing_docs)]

mod backend;
mod config;
mod error;
mod pool;
mod pubsub;
mod retry;

pub use backend::RedisStorage;
pub use config::{
    DEFAULT_INITIAL_BACKOFF, DEFAULT_MAX_BACKOFF, DEFAULT_MAX_IDLE, DEFAULT_MAX_RETRIES,
    IDLE_TIMEOUT, RedisStorageConfig, RetryConfig,
};
pub use error::{RedisStorageError, Result};
pub use pubsub::Subscription;
