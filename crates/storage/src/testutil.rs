//! Shared test utilities for storage handler testing.
//!
//! Common helpers for generating deterministic keys and records plus
//! assertion macros over [`StorageResult`](crate::StorageResult) values.
//! Feature-gated behind `testutil` to stay out of production builds.
//!
//! # Usage
//!
//! In a backend crate's `Cargo.toml`:
//!
//! ```toml
//! [dev-dependencies]
//! gatehouse-storage = { path = "../storage", features = ["testutil"] }
//! ```

use crate::{handler::StorageHandler, memory::InMemoryStorage};

/// Create a deterministic test key from a prefix and index.
///
/// Produces keys like `"prefix:000042"` (zero-padded to 6 digits) so that
/// lexicographic ordering matches numeric ordering.
#[must_use]
pub fn make_key(prefix: &str, idx: usize) -> String {
    format!("{prefix}:{idx:06}")
}

/// Create a test record tagged with a task ID and sequence number.
///
/// Produces values like `"task3-val042"`, useful in concurrent tests that
/// need to identify which task wrote which record.
#[must_use]
pub fn make_tagged_value(task: usize, seq: usize) -> String {
    format!("task{task}-val{seq}")
}

/// Create an [`InMemoryStorage`] pre-populated with `count` non-expiring
/// keys under the given key prefix.
///
/// # Panics
///
/// Panics if any `set_key` fails (it cannot with the in-memory handler).
pub async fn populated_storage(prefix: &str, count: usize) -> InMemoryStorage {
    let storage = InMemoryStorage::new();
    for i in 0..count {
        storage
            .set_key(&make_key(prefix, i), &make_tagged_value(0, i), 0)
            .await
            .expect("populate set_key failed");
    }
    storage
}

/// Assert that a [`StorageResult`](crate::StorageResult) is a
/// [`StorageError::NotFound`](crate::StorageError::NotFound).
#[macro_export]
macro_rules! assert_not_found {
    ($result:expr) => {
        assert!(
            matches!($result, Err($crate::StorageError::NotFound { .. })),
            "expected StorageError::NotFound, got: {:?}",
            $result,
        );
    };
    ($result:expr, $msg:expr) => {
        assert!(
            matches!($result, Err($crate::StorageError::NotFound { .. })),
            "{}: expected StorageError::NotFound, got: {:?}",
            $msg,
            $result,
        );
    };
}
