//! In-memory storage handler implementation.
//!
//! [`InMemoryStorage`] implements [`StorageHandler`] over process-local maps.
//! It exists for tests and local development only — nothing is persisted,
//! nothing is shared across processes, and [`publish`](StorageHandler::publish)
//! has no subscribers to deliver to. Production deployments use the Redis
//! backend.
//!
//! # Semantics
//!
//! The double mirrors the production backend closely enough for conformance
//! tests to run against it: keys pass through the same [`KeyCodec`], TTLs
//! expire (checked lazily on read, swept by a background task), counters are
//! numeric strings mutated under a write lock, and the rolling window keeps
//! per-key timestamp vectors purged on each call.

use std::{
    collections::HashMap,
    sync::Arc,
    time::{Duration, Instant, SystemTime, UNIX_EPOCH},
};

use async_trait::async_trait;
use parking_lot::RwLock;
use tokio::{select, sync::watch, time::sleep};

use crate::{
    error::{StorageError, StorageResult},
    handler::StorageHandler,
    keys::KeyCodec,
};

/// A stored record with its optional expiry deadline.
#[derive(Debug, Clone)]
struct Entry {
    value: String,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|deadline| deadline <= now)
    }
}

/// Per-key rolling-window state: event timestamps plus the window's expiry.
#[derive(Debug, Default, Clone)]
struct Window {
    stamps: Vec<i64>,
    expires_at: Option<Instant>,
}

/// Holds the shutdown signal sender. When dropped, the watch channel closes
/// and the sweeper task exits.
struct ShutdownGuard {
    shutdown_tx: watch::Sender<()>,
}

impl Drop for ShutdownGuard {
    fn drop(&mut self) {
        // Best-effort signal; the receiver may already be gone.
        let _ = self.shutdown_tx.send(());
    }
}

/// In-memory implementation of [`StorageHandler`] for tests.
///
/// Cheaply cloneable via [`Arc`]; all clones share the same underlying maps.
/// The background TTL sweeper stops automatically when the last clone drops.
#[derive(Clone)]
pub struct InMemoryStorage {
    codec: KeyCodec,
    data: Arc<RwLock<HashMap<String, Entry>>>,
    windows: Arc<RwLock<HashMap<String, Window>>>,
    shutdown_guard: Arc<ShutdownGuard>,
}

impl InMemoryStorage {
    /// Creates a handler with an empty prefix and hashing disabled.
    ///
    /// Must be called from within a tokio runtime: the constructor spawns
    /// the background sweeper task.
    #[must_use]
    pub fn new() -> Self {
        Self::with_codec(KeyCodec::new("", false))
    }

    /// Creates a handler with an explicit key codec.
    #[must_use]
    pub fn with_codec(codec: KeyCodec) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(());
        let storage = Self {
            codec,
            data: Arc::new(RwLock::new(HashMap::new())),
            windows: Arc::new(RwLock::new(HashMap::new())),
            shutdown_guard: Arc::new(ShutdownGuard { shutdown_tx }),
        };

        // The sweeper owns only the maps, not the handler, so the shutdown
        // guard drops (and the task exits) once the last handler clone goes.
        let data = Arc::clone(&storage.data);
        let windows = Arc::clone(&storage.windows);
        tokio::spawn(async move {
            sweep_expired(data, windows, shutdown_rx).await;
        });

        storage
    }

    /// Returns the codec this handler encodes keys with.
    #[must_use]
    pub fn codec(&self) -> &KeyCodec {
        &self.codec
    }

    /// Explicitly stops the background sweeper.
    ///
    /// Optional — the sweeper also stops when all clones drop. Useful when a
    /// test needs deterministic shutdown timing.
    pub fn shutdown(&self) {
        let _ = self.shutdown_guard.shutdown_tx.send(());
    }

    /// Reads a live (non-expired) entry's value.
    fn live_value(&self, physical: &str) -> Option<String> {
        let data = self.data.read();
        let entry = data.get(physical)?;
        if entry.is_expired(Instant::now()) {
            return None;
        }
        Some(entry.value.clone())
    }

    /// Collects live keys under `physical_prefix`, decoded for the caller.
    fn collect(&self, physical_prefix: &str) -> Vec<(String, String)> {
        let now = Instant::now();
        self.data
            .read()
            .iter()
            .filter(|(key, entry)| key.starts_with(physical_prefix) && !entry.is_expired(now))
            .map(|(key, entry)| (self.codec.decode(key), entry.value.clone()))
            .collect()
    }

    fn expiry_for(ttl_secs: i64) -> Option<Instant> {
        (ttl_secs > 0).then(|| Instant::now() + Duration::from_secs(ttl_secs as u64))
    }
}

impl Default for InMemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

/// Background task purging expired records and windows once per second.
async fn sweep_expired(
    data: Arc<RwLock<HashMap<String, Entry>>>,
    windows: Arc<RwLock<HashMap<String, Window>>>,
    mut shutdown_rx: watch::Receiver<()>,
) {
    loop {
        select! {
            _ = sleep(Duration::from_secs(1)) => {}
            _ = shutdown_rx.changed() => return,
        }

        let now = Instant::now();
        data.write().retain(|_, entry| !entry.is_expired(now));
        windows.write().retain(|_, window| window.expires_at.is_none_or(|deadline| deadline > now));
    }
}

fn epoch_nanos() -> i64 {
    SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_nanos() as i64).unwrap_or(0)
}

#[async_trait]
impl StorageHandler for InMemoryStorage {
    async fn connect(&self) -> StorageResult<()> {
        Ok(())
    }

    async fn get_key(&self, key_name: &str) -> StorageResult<String> {
        let physical = self.codec.encode(key_name);
        self.live_value(&physical).ok_or_else(|| StorageError::not_found(key_name))
    }

    async fn set_key(&self, key_name: &str, value: &str, ttl_secs: i64) -> StorageResult<()> {
        let physical = self.codec.encode(key_name);
        let entry = Entry { value: value.to_owned(), expires_at: Self::expiry_for(ttl_secs) };
        self.data.write().insert(physical, entry);
        Ok(())
    }

    async fn get_exp(&self, key_name: &str) -> StorageResult<i64> {
        let physical = self.codec.encode(key_name);
        let data = self.data.read();
        let now = Instant::now();
        match data.get(&physical) {
            Some(entry) if !entry.is_expired(now) => Ok(entry
                .expires_at
                .map_or(-1, |deadline| deadline.duration_since(now).as_secs() as i64)),
            _ => Err(StorageError::not_found(key_name)),
        }
    }

    async fn get_keys(&self, filter: &str) -> StorageResult<Vec<String>> {
        let pattern = format!("{}{}", self.codec.prefix(), self.codec.hash(filter));
        Ok(self.collect(&pattern).into_iter().map(|(key, _)| key).collect())
    }

    async fn get_keys_and_values(&self) -> StorageResult<HashMap<String, String>> {
        Ok(self.collect(self.codec.prefix()).into_iter().collect())
    }

    async fn get_keys_and_values_with_filter(
        &self,
        filter: &str,
    ) -> StorageResult<HashMap<String, String>> {
        let pattern = format!("{}{}", self.codec.prefix(), self.codec.hash(filter));
        Ok(self.collect(&pattern).into_iter().collect())
    }

    async fn delete_key(&self, key_name: &str) -> StorageResult<bool> {
        let physical = self.codec.encode(key_name);
        Ok(self.data.write().remove(&physical).is_some())
    }

    async fn delete_raw_key(&self, key_name: &str) -> StorageResult<bool> {
        let from_data = self.data.write().remove(key_name).is_some();
        let from_windows = self.windows.write().remove(key_name).is_some();
        Ok(from_data || from_windows)
    }

    async fn delete_keys(&self, keys: &[String]) -> StorageResult<bool> {
        if keys.is_empty() {
            return Ok(true);
        }
        let mut data = self.data.write();
        for key in keys {
            data.remove(&self.codec.encode(key));
        }
        Ok(true)
    }

    async fn delete_raw_keys(&self, keys: &[String], prefix: &str) -> StorageResult<bool> {
        if keys.is_empty() {
            return Ok(true);
        }
        let mut data = self.data.write();
        for key in keys {
            data.remove(&format!("{prefix}{key}"));
        }
        Ok(true)
    }

    async fn decrement(&self, key_name: &str) -> StorageResult<()> {
        let physical = self.codec.encode(key_name);
        let mut data = self.data.write();
        let now = Instant::now();
        let (current, expires_at) = match data.get(&physical) {
            Some(entry) if !entry.is_expired(now) => {
                let parsed = entry
                    .value
                    .parse::<i64>()
                    .map_err(|e| StorageError::command_with_source("value is not an integer", e))?;
                (parsed, entry.expires_at)
            }
            _ => (0, None),
        };
        data.insert(physical, Entry { value: (current - 1).to_string(), expires_at });
        Ok(())
    }

    async fn increment_with_expire(&self, key_name: &str, ttl_secs: i64) -> StorageResult<i64> {
        // Physical-key operation: no codec.
        let mut data = self.data.write();
        let now = Instant::now();
        let (current, expires_at) = match data.get(key_name) {
            Some(entry) if !entry.is_expired(now) => {
                let parsed = entry
                    .value
                    .parse::<i64>()
                    .map_err(|e| StorageError::command_with_source("value is not an integer", e))?;
                (parsed, entry.expires_at)
            }
            _ => (0, None),
        };
        let value = current + 1;
        // First writer sets the expiry; later increments leave it alone.
        let expires_at = if value == 1 { Self::expiry_for(ttl_secs) } else { expires_at };
        data.insert(key_name.to_owned(), Entry { value: value.to_string(), expires_at });
        Ok(value)
    }

    async fn set_rolling_window(
        &self,
        key_name: &str,
        period_secs: i64,
        _ttl_secs: i64,
    ) -> StorageResult<usize> {
        let now_ns = epoch_nanos();
        let cutoff = now_ns - period_secs.saturating_mul(1_000_000_000);

        let mut windows = self.windows.write();
        let window = windows.entry(key_name.to_owned()).or_default();

        if window.expires_at.is_some_and(|deadline| deadline <= Instant::now()) {
            window.stamps.clear();
        }
        window.stamps.retain(|&stamp| stamp > cutoff);

        let occupancy = window.stamps.len();
        window.stamps.push(now_ns);
        window.expires_at = Self::expiry_for(period_secs);

        Ok(occupancy)
    }

    async fn publish(&self, channel: &str, message: &str) -> StorageResult<()> {
        // No cross-process subscribers exist for the in-memory double.
        tracing::debug!(channel, len = message.len(), "publish dropped (in-memory handler)");
        Ok(())
    }
}
