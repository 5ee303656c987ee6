//! Storage handler abstraction for the Gatehouse API gateway.
//!
//! This crate provides the [`StorageHandler`] trait and related types that
//! form the keyed-storage layer beneath the gateway's session, quota, and
//! rate-limiting logic. The gateway reads and writes opaque session records,
//! bumps atomic counters, and measures sliding rate windows through this one
//! contract, regardless of which backend a deployment wires in.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                 Gateway request handlers                    │
//! │        (session auth, quota checks, rate limiting)          │
//! ├─────────────────────────────────────────────────────────────┤
//! │                   gatehouse-storage                         │
//! │                 StorageHandler trait                        │
//! │   (records, TTLs, counters, rolling window, publish)        │
//! ├────────────────┬────────────────────────────────────────────┤
//! │ InMemoryStorage│            RedisStorage                    │
//! │    (testing)   │  (production, gatehouse-storage-redis)     │
//! └────────────────┴────────────────────────────────────────────┘
//! ```
//!
//! # Quick Start
//!
//! ```
//! use gatehouse_storage::{InMemoryStorage, StorageHandler};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let storage = InMemoryStorage::new();
//!
//!     storage.set_key("session:42", r#"{"quota":100}"#, 60).await?;
//!     let record = storage.get_key("session:42").await?;
//!     assert_eq!(record, r#"{"quota":100}"#);
//!
//!     Ok(())
//! }
//! ```
//!
//! # Keys
//!
//! Callers deal in *logical* keys; a [`KeyCodec`] (namespace prefix plus an
//! optional one-way hash) produces the *physical* key actually sent to the
//! backend. Two operations — [`increment_with_expire`](StorageHandler::increment_with_expire)
//! and [`set_rolling_window`](StorageHandler::set_rolling_window) — take
//! physical keys directly; this bypass is deliberate and documented on the
//! trait.
//!
//! # Error Handling
//!
//! All operations return [`StorageResult<T>`] over the [`StorageError`]
//! taxonomy. Mutations report persistence failures as typed errors; nothing
//! is logged-and-swallowed at this layer.

pub mod error;
pub mod handler;
pub mod keys;
pub mod memory;
#[cfg(any(test, feature = "testutil"))]
#[allow(clippy::expect_used)]
pub mod testutil;

pub use error::{BoxError, StorageError, StorageResult};
pub use handler::StorageHandler;
pub use keys::KeyCodec;
pub use memory::InMemoryStorage;
