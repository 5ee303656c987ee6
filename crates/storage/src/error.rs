//! Storage error types and result alias.
//!
//! Every storage backend maps its internal failures onto the variants here,
//! so callers handle one taxonomy regardless of which backend is wired in.
//!
//! # Error Types
//!
//! - [`StorageError::NotFound`] - Key does not exist in the storage backend
//! - [`StorageError::Connection`] - Dial, checkout, or transport failure
//! - [`StorageError::Command`] - The backend rejected or failed a command
//! - [`StorageError::Timeout`] - Operation exceeded a time limit
//! - [`StorageError::Subscription`] - Terminal pub/sub transport failure
//!
//! # Example
//!
//! ```
//! use gatehouse_storage::{StorageError, StorageResult};
//!
//! fn lookup(key: &str) -> StorageResult<String> {
//!     Err(StorageError::not_found(key))
//! }
//! ```

use std::sync::Arc;

use thiserror::Error;

/// A boxed error type for source chain tracking.
pub type BoxError = Arc<dyn std::error::Error + Send + Sync>;

/// Result type alias for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors that can occur during storage operations.
///
/// This is the canonical set of failures any storage handler can produce.
/// Backend implementations map their internal error types to these variants.
///
/// Errors preserve their source chain via the `#[source]` attribute.
///
/// # Non-exhaustive
///
/// New variants may be added in future minor releases without a
/// semver-breaking change. Downstream match expressions must include a
/// wildcard arm.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StorageError {
    /// The requested key was not found.
    ///
    /// A recoverable outcome, not a transport problem: reads on absent keys
    /// and TTL queries on missing keys produce this.
    #[error("Key not found: {key}")]
    NotFound {
        /// The key that was not found.
        key: String,
    },

    /// Connection-level failure: dial refused, pool checkout failed, or the
    /// transport dropped mid-operation.
    #[error("Connection error: {message}")]
    Connection {
        /// Description of the connection failure.
        message: String,
        /// The underlying error, when one exists.
        #[source]
        source: Option<BoxError>,
    },

    /// The backend accepted the connection but the command itself failed:
    /// malformed command, aborted transaction, or an unexpected reply shape.
    #[error("Command error: {message}")]
    Command {
        /// Description of the command failure.
        message: String,
        /// The underlying error, when one exists.
        #[source]
        source: Option<BoxError>,
    },

    /// Operation exceeded its time limit.
    #[error("Operation timeout")]
    Timeout,

    /// A pub/sub subscription ended on a transport failure.
    ///
    /// Not retried internally; reconnection is the subscriber's decision.
    #[error("Subscription ended: {message}")]
    Subscription {
        /// Description of the failure that ended the subscription.
        message: String,
    },
}

impl StorageError {
    /// Creates a new `NotFound` error for the given key.
    #[must_use]
    pub fn not_found(key: impl Into<String>) -> Self {
        Self::NotFound { key: key.into() }
    }

    /// Creates a new `Connection` error with the given message.
    #[must_use]
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection { message: message.into(), source: None }
    }

    /// Creates a new `Connection` error with a message and source error.
    #[must_use]
    pub fn connection_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Connection { message: message.into(), source: Some(Arc::new(source)) }
    }

    /// Creates a new `Command` error with the given message.
    #[must_use]
    pub fn command(message: impl Into<String>) -> Self {
        Self::Command { message: message.into(), source: None }
    }

    /// Creates a new `Command` error with a message and source error.
    #[must_use]
    pub fn command_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Command { message: message.into(), source: Some(Arc::new(source)) }
    }

    /// Creates a new `Timeout` error.
    #[must_use]
    pub fn timeout() -> Self {
        Self::Timeout
    }

    /// Creates a new `Subscription` error with the given message.
    #[must_use]
    pub fn subscription(message: impl Into<String>) -> Self {
        Self::Subscription { message: message.into() }
    }

    /// Whether this error class may clear on its own and is worth retrying.
    ///
    /// Connection and timeout failures are transient; a `NotFound`, a
    /// rejected command, or a dead subscription will not improve by
    /// re-issuing the same operation.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Connection { .. } | Self::Timeout)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn not_found_display_includes_key() {
        let err = StorageError::not_found("session:abc");
        assert_eq!(err.to_string(), "Key not found: session:abc");
    }

    #[test]
    fn transient_classification() {
        assert!(StorageError::connection("refused").is_transient());
        assert!(StorageError::timeout().is_transient());
        assert!(!StorageError::not_found("k").is_transient());
        assert!(!StorageError::command("bad reply").is_transient());
        assert!(!StorageError::subscription("closed").is_transient());
    }

    #[test]
    fn source_chain_preserved() {
        let io = std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "refused");
        let err = StorageError::connection_with_source("dial failed", io);
        let source = std::error::Error::source(&err).unwrap();
        assert!(source.to_string().contains("refused"));
    }
}
