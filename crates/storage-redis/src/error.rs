//! Error types for the Redis storage backend.
//!
//! Maps the Redis client's errors onto the canonical
//! [`StorageError`](gatehouse_storage::StorageError) taxonomy so that
//! callers of the [`StorageHandler`](gatehouse_storage::StorageHandler)
//! contract never see client-specific types.

use gatehouse_storage::StorageError;
use thiserror::Error;

/// Result type alias for Redis backend construction and configuration.
pub type Result<T> = std::result::Result<T, RedisStorageError>;

/// Errors specific to the Redis storage backend.
#[derive(Debug, Error)]
pub enum RedisStorageError {
    /// Error from the Redis client.
    #[error("Redis client error: {0}")]
    Client(#[from] redis::RedisError),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),
}

impl From<RedisStorageError> for StorageError {
    fn from(err: RedisStorageError) -> Self {
        match err {
            RedisStorageError::Client(source) => redis_error_to_storage_error(source),
            RedisStorageError::Config(message) => {
                StorageError::command(format!("Config: {message}"))
            }
        }
    }
}

/// Converts a Redis client error to a canonical storage error.
///
/// Transport-class failures (dial, dropped connection, I/O, timeout) become
/// `Connection`/`Timeout` — the transient classes the retry loop acts on.
/// Everything else — a rejected command, a type mismatch in the reply, an
/// aborted transaction — is a `Command` failure and is not retried.
pub(crate) fn redis_error_to_storage_error(err: redis::RedisError) -> StorageError {
    if err.is_timeout() {
        return StorageError::timeout();
    }
    if err.is_connection_refusal() || err.is_connection_dropped() || err.is_io_error() {
        return StorageError::connection_with_source(err.to_string(), err);
    }
    StorageError::command_with_source(err.to_string(), err)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn io_error(kind: std::io::ErrorKind) -> redis::RedisError {
        redis::RedisError::from(std::io::Error::new(kind, "boom"))
    }

    #[test]
    fn io_errors_map_to_transient_connection() {
        let err = redis_error_to_storage_error(io_error(std::io::ErrorKind::ConnectionReset));
        assert!(matches!(err, StorageError::Connection { .. }));
        assert!(err.is_transient());
    }

    #[test]
    fn reply_type_errors_map_to_command() {
        let redis_err =
            redis::RedisError::from((redis::ErrorKind::TypeError, "unexpected reply type"));
        let err = redis_error_to_storage_error(redis_err);
        assert!(matches!(err, StorageError::Command { .. }));
        assert!(!err.is_transient());
    }

    #[test]
    fn config_errors_surface_as_command() {
        let err: StorageError = RedisStorageError::Config("bad host".into()).into();
        assert!(matches!(err, StorageError::Command { .. }));
    }
}
