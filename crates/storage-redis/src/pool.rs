//! Connection pool with checkout/release semantics.
//!
//! The pool owns the long-lived connection lifecycle; individual operations
//! borrow. A checkout hands out the most recently released idle connection
//! after a liveness probe, discarding stale or dead ones, and dials a fresh
//! connection when no idle survivor remains. Authentication and logical
//! database selection ride on the dial (they are part of the connection
//! info), so they happen once per physical connection, never per operation.
//!
//! The idle list is guarded by a [`parking_lot::Mutex`] held only for list
//! manipulation — probing and dialing happen outside the lock, so slow
//! network work never blocks other checkouts.

use std::time::Instant;

use gatehouse_storage::{StorageError, StorageResult};
use parking_lot::Mutex;
use redis::aio::MultiplexedConnection;

use crate::{
    config::{IDLE_TIMEOUT, RedisStorageConfig},
    error::{Result, redis_error_to_storage_error},
};

/// An idle connection plus the instant it was released.
struct IdleConnection {
    conn: MultiplexedConnection,
    since: Instant,
}

/// Pool of reusable connections to one Redis target.
///
/// Process-wide shared state, safe for concurrent checkout; a checked-out
/// connection is used by exactly one operation at a time.
pub(crate) struct ConnectionPool {
    client: redis::Client,
    idle: Mutex<Vec<IdleConnection>>,
    max_idle: usize,
    target: String,
}

impl ConnectionPool {
    /// Builds a pool for the configured target. No connection is dialed
    /// here; the first checkout establishes one.
    pub(crate) fn new(config: &RedisStorageConfig) -> Result<Self> {
        let target = format!("{}:{}", config.host(), config.port());
        let client = redis::Client::open(config.connection_info())?;
        Ok(Self { client, idle: Mutex::new(Vec::new()), max_idle: config.max_idle(), target })
    }

    /// Borrows a usable connection.
    ///
    /// Idle connections are validated with a `PING` probe before being
    /// handed out; failures and connections idle past [`IDLE_TIMEOUT`] are
    /// discarded and the next candidate tried. When the idle list is
    /// exhausted a fresh connection is dialed.
    pub(crate) async fn checkout(&self) -> StorageResult<MultiplexedConnection> {
        loop {
            let candidate = self.idle.lock().pop();
            let Some(IdleConnection { mut conn, since }) = candidate else {
                break;
            };

            if since.elapsed() >= IDLE_TIMEOUT {
                tracing::debug!(target = %self.target, "discarding connection idle past timeout");
                continue;
            }

            match redis::cmd("PING").query_async::<String>(&mut conn).await {
                Ok(_) => return Ok(conn),
                Err(err) => {
                    tracing::debug!(target = %self.target, error = %err, "idle connection failed liveness probe, discarding");
                }
            }
        }

        tracing::debug!(target = %self.target, "dialing new connection");
        self.client
            .get_multiplexed_async_connection()
            .await
            .map_err(redis_error_to_storage_error)
            .map_err(|err| match err {
                StorageError::Connection { message, source } => StorageError::Connection {
                    message: format!("dial {} failed: {message}", self.target),
                    source,
                },
                other => other,
            })
    }

    /// Returns a connection to the idle list, dropping it instead when the
    /// list is already at the configured cap.
    pub(crate) fn release(&self, conn: MultiplexedConnection) {
        let mut idle = self.idle.lock();
        if idle.len() < self.max_idle {
            idle.push(IdleConnection { conn, since: Instant::now() });
        }
    }

    /// Discards every idle connection. The next checkout dials fresh.
    pub(crate) fn reset(&self) {
        self.idle.lock().clear();
    }
}
