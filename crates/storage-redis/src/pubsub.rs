//! Pub/sub subscription loop.
//!
//! A [`Subscription`] runs as a cancellable background task on a dedicated
//! connection: it subscribes once, forwards every published payload into a
//! bounded channel, and ends either on an explicit [`stop`](Subscription::stop)
//! signal or on a transport failure. Transport failures are terminal — the
//! loop never reconnects internally, so resubscribing after an error is the
//! caller's decision (deliberately asymmetric with the retried command path).

use futures_util::StreamExt;
use gatehouse_storage::{StorageError, StorageResult};
use tokio::{
    sync::{mpsc, watch},
    task::JoinHandle,
};

use crate::error::redis_error_to_storage_error;

/// Buffered messages between the subscription task and the consumer. The
/// consumer applies backpressure past this point.
const SUBSCRIPTION_BUFFER: usize = 128;

/// A live pub/sub subscription.
///
/// Messages arrive through [`recv`](Self::recv) in publish order. After
/// [`recv`](Self::recv) returns `None` the subscription has ended;
/// [`join`](Self::join) reports whether that was a clean stop (`Ok`) or a
/// transport failure (`Err`).
///
/// # Example
///
/// ```no_run
/// # use gatehouse_storage_redis::{RedisStorage, RedisStorageConfig};
/// # async fn example(storage: RedisStorage) -> Result<(), Box<dyn std::error::Error>> {
/// let mut subscription = storage.subscribe("gatehouse.cache.invalidate").await?;
/// while let Some(message) = subscription.recv().await {
///     println!("invalidate: {message}");
/// }
/// subscription.join().await?;
/// # Ok(())
/// # }
/// ```
pub struct Subscription {
    messages: mpsc::Receiver<String>,
    shutdown_tx: watch::Sender<()>,
    handle: JoinHandle<StorageResult<()>>,
}

impl Subscription {
    /// Dials a dedicated pub/sub connection, subscribes to `channel`, and
    /// spawns the forwarding task.
    pub(crate) async fn start(client: redis::Client, channel: &str) -> StorageResult<Self> {
        let mut pubsub =
            client.get_async_pubsub().await.map_err(redis_error_to_storage_error)?;
        pubsub.subscribe(channel).await.map_err(redis_error_to_storage_error)?;
        tracing::info!(channel, "subscription started");

        let (msg_tx, messages) = mpsc::channel(SUBSCRIPTION_BUFFER);
        let (shutdown_tx, mut shutdown_rx) = watch::channel(());
        let channel_name = channel.to_owned();

        let handle = tokio::spawn(async move {
            let mut stream = pubsub.on_message();
            loop {
                tokio::select! {
                    // Fires on stop() and when the Subscription is dropped.
                    _ = shutdown_rx.changed() => {
                        tracing::debug!(channel = %channel_name, "subscription stopped");
                        return Ok(());
                    }
                    incoming = stream.next() => {
                        let Some(msg) = incoming else {
                            tracing::error!(channel = %channel_name, "pub/sub transport closed");
                            return Err(StorageError::subscription(format!(
                                "transport closed on channel {channel_name}"
                            )));
                        };
                        let payload: String = msg.get_payload().map_err(|err| {
                            StorageError::subscription(format!("undecodable payload: {err}"))
                        })?;
                        if msg_tx.send(payload).await.is_err() {
                            // Consumer is gone; treat like a stop.
                            return Ok(());
                        }
                    }
                }
            }
        });

        Ok(Self { messages, shutdown_tx, handle })
    }

    /// Receives the next published message.
    ///
    /// Returns `None` once the subscription has ended (stopped or failed);
    /// use [`join`](Self::join) to learn which.
    pub async fn recv(&mut self) -> Option<String> {
        self.messages.recv().await
    }

    /// Signals the subscription task to exit after the message it is
    /// currently handling.
    pub fn stop(&self) {
        let _ = self.shutdown_tx.send(());
    }

    /// Waits for the task to finish and returns its terminal outcome:
    /// `Ok(())` for a clean stop, the transport error otherwise.
    ///
    /// Call after [`stop`](Self::stop) or after [`recv`](Self::recv) has
    /// returned `None`; joining a still-live subscription waits until it
    /// ends.
    pub async fn join(self) -> StorageResult<()> {
        // Dropping the receiver unblocks a task mid-send.
        drop(self.messages);
        match self.handle.await {
            Ok(outcome) => outcome,
            Err(err) => {
                Err(StorageError::subscription(format!("subscription task panicked: {err}")))
            }
        }
    }
}
