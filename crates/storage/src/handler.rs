//! Storage handler trait definition.
//!
//! This module defines the [`StorageHandler`] trait, the contract between the
//! gateway's session, quota, and rate-limiting logic and whatever key-value
//! store backs a deployment. The production implementation lives in
//! `gatehouse-storage-redis`; [`InMemoryStorage`](crate::InMemoryStorage) is
//! the test double.
//!
//! # Design notes
//!
//! - **Records are opaque**: values are uninterpreted strings (serialized
//!   session state); no schema is enforced at this layer.
//! - **Logical vs physical keys**: most operations take logical keys and run
//!   them through the handler's [`KeyCodec`](crate::KeyCodec). The counter
//!   and rolling-window operations take *physical* keys — a deliberate,
//!   documented bypass for callers that manage their own namespacing.
//! - **Every mutation returns a result**: persistence failures surface as
//!   typed errors instead of being logged and swallowed.

use std::collections::HashMap;

use async_trait::async_trait;

use crate::error::StorageResult;

/// Abstract contract to a keyed storage backend.
///
/// Implementations are shared across many concurrent request-handling tasks
/// and therefore must be `Send + Sync`; all concurrency control is delegated
/// to the backend (single-command atomicity, transactional batching for the
/// rolling window) rather than handler-level locks.
///
/// | Method | Description |
/// |--------|-------------|
/// | [`connect`](Self::connect) | (Re)initialize the backend connection state |
/// | [`get_key`](Self::get_key) | Read a single record |
/// | [`set_key`](Self::set_key) | Write a record with optional TTL |
/// | [`get_exp`](Self::get_exp) | Remaining TTL of a key |
/// | [`get_keys`](Self::get_keys) | Prefix-filtered key listing |
/// | [`get_keys_and_values`](Self::get_keys_and_values) | Full keyspace dump |
/// | [`get_keys_and_values_with_filter`](Self::get_keys_and_values_with_filter) | Filtered keyspace dump |
/// | [`delete_key`](Self::delete_key) | Delete one record |
/// | [`delete_raw_key`](Self::delete_raw_key) | Delete by exact physical key |
/// | [`delete_keys`](Self::delete_keys) | Bulk delete |
/// | [`delete_raw_keys`](Self::delete_raw_keys) | Bulk delete with caller prefix |
/// | [`decrement`](Self::decrement) | Atomic counter decrement |
/// | [`increment_with_expire`](Self::increment_with_expire) | Atomic self-expiring counter |
/// | [`set_rolling_window`](Self::set_rolling_window) | Sliding-window occupancy |
/// | [`publish`](Self::publish) | Fire-and-forget pub/sub publish |
#[async_trait]
pub trait StorageHandler: Send + Sync {
    /// (Re)initializes the backend connection state.
    ///
    /// Reports success of *initiation*: connections are established lazily,
    /// so an unreachable backend surfaces on the first real operation, not
    /// here. Idempotent.
    async fn connect(&self) -> StorageResult<()>;

    /// Retrieves the record stored at the given logical key.
    ///
    /// # Errors
    ///
    /// [`StorageError::NotFound`](crate::StorageError::NotFound) when the key
    /// is absent or expired; transport failures surface as their own variants.
    async fn get_key(&self, key_name: &str) -> StorageResult<String>;

    /// Writes (or overwrites) a record.
    ///
    /// A `ttl_secs > 0` sets an expiry in a second round trip; zero or
    /// negative means the key never expires.
    async fn set_key(&self, key_name: &str, value: &str, ttl_secs: i64) -> StorageResult<()>;

    /// Returns the remaining TTL of a key in seconds.
    ///
    /// A key that exists without an expiry yields `-1` (backend-defined "no
    /// expiry"), distinct from the [`NotFound`](crate::StorageError::NotFound)
    /// returned for a missing key.
    async fn get_exp(&self, key_name: &str) -> StorageResult<i64>;

    /// Lists logical keys matching a prefix filter.
    ///
    /// The backend is globbed on `prefix + hash(filter) + "*"`; results come
    /// back with the namespace prefix stripped. With hashing enabled the
    /// returned names are hex digests.
    async fn get_keys(&self, filter: &str) -> StorageResult<Vec<String>>;

    /// Returns every key and record under this handler's prefix.
    ///
    /// Unbounded scan plus a bulk multi-get. Expensive; intended for admin
    /// and diagnostic paths only.
    async fn get_keys_and_values(&self) -> StorageResult<HashMap<String, String>>;

    /// Like [`get_keys_and_values`](Self::get_keys_and_values), narrowed by a
    /// prefix filter.
    async fn get_keys_and_values_with_filter(
        &self,
        filter: &str,
    ) -> StorageResult<HashMap<String, String>>;

    /// Deletes the record at the given logical key.
    ///
    /// Returns `true` when a key was actually removed.
    async fn delete_key(&self, key_name: &str) -> StorageResult<bool>;

    /// Deletes a record by its exact physical key, bypassing the codec.
    ///
    /// The caller must already hold the precise key string as stored.
    async fn delete_raw_key(&self, key_name: &str) -> StorageResult<bool>;

    /// Deletes a group of logical keys in one bulk command.
    ///
    /// An empty input is a successful no-op.
    async fn delete_keys(&self, keys: &[String]) -> StorageResult<bool>;

    /// Deletes a group of keys with a caller-supplied prefix and no hashing.
    ///
    /// An empty input is a successful no-op.
    async fn delete_raw_keys(&self, keys: &[String], prefix: &str) -> StorageResult<bool>;

    /// Atomically decrements the counter at the given logical key.
    async fn decrement(&self, key_name: &str) -> StorageResult<()>;

    /// Atomically increments the counter at the given **physical** key,
    /// returning the post-increment value.
    ///
    /// Bypasses the codec by design. When the returned value is exactly `1`
    /// this call created the counter, and `ttl_secs > 0` is applied so the
    /// counter expires on its own — two round trips in the cold-start case,
    /// one otherwise. Subsequent increments never reset the TTL.
    async fn increment_with_expire(&self, key_name: &str, ttl_secs: i64) -> StorageResult<i64>;

    /// Records an event in the sliding window at the given **physical** key
    /// and returns the window occupancy *before* this event.
    ///
    /// Entries older than `period_secs` are purged, the surviving window is
    /// read, the current event is inserted, and the window's expiry is reset
    /// to `period_secs` — all in one atomic batch, so concurrent callers
    /// against the same key observe strictly increasing counts.
    ///
    /// `ttl_secs` is accepted for interface compatibility; the window's
    /// lifetime tracks `period_secs`. Callers must pass a strictly positive
    /// period: `period_secs <= 0` purges everything including the entry
    /// being recorded.
    async fn set_rolling_window(
        &self,
        key_name: &str,
        period_secs: i64,
        ttl_secs: i64,
    ) -> StorageResult<usize>;

    /// Publishes a message to a pub/sub channel. Fire-and-forget: delivery
    /// to any particular subscriber is not confirmed.
    async fn publish(&self, channel: &str, message: &str) -> StorageResult<()>;
}
