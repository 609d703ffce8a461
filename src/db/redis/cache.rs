use redis::AsyncCommands;
use redis::Client;
use tokio::sync::{mpsc, oneshot};

use crate::db::cache::{CacheKey, EntryCache};
use crate::error::{AppError, AppResult};

/// Creates a Redis client for caching
pub fn create_redis_client(redis_url: &str) -> anyhow::Result<Client> {
    let client = Client::open(redis_url)?;
    Ok(client)
}

/// Message for the cache writer. Sets and deletes share one queue so they reach Redis in
/// the order they were issued.
enum CacheWriteMessage {
    Set {
        key: String,
        value: String,
    },
    Delete {
        key: String,
        done: oneshot::Sender<AppResult<()>>,
    },
}

/// [`EntryCache`] stored in Redis, with writes and deletes drained by a background task
#[derive(Clone)]
pub struct RedisCache {
    redis_client: Client,
    write_tx: mpsc::UnboundedSender<CacheWriteMessage>,
}

/// Handle for gracefully shutting down the cache writer
pub struct CacheWriterHandle {
    shutdown_tx: mpsc::Sender<()>,
}

impl CacheWriterHandle {
    /// Signals the writer task to flush queued writes and stop
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(()).await;
        tracing::info!("Cache writer shutdown signal sent");
    }
}

impl RedisCache {
    /// Creates the cache and spawns its background writer
    pub fn new(redis_client: Client) -> (Self, CacheWriterHandle) {
        let (write_tx, write_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);

        let client = redis_client.clone();
        tokio::spawn(async move {
            Self::cache_writer_task(client, write_rx, shutdown_rx).await;
        });

        let cache = Self {
            redis_client,
            write_tx,
        };

        (cache, CacheWriterHandle { shutdown_tx })
    }

    /// Applies queued writes until shutdown, then flushes whatever is left
    async fn cache_writer_task(
        client: Client,
        mut write_rx: mpsc::UnboundedReceiver<CacheWriteMessage>,
        mut shutdown_rx: mpsc::Receiver<()>,
    ) {
        tracing::info!("Cache writer task started");

        loop {
            tokio::select! {
                Some(msg) = write_rx.recv() => {
                    if let Err(e) = Self::write_to_redis(&client, msg).await {
                        tracing::error!(error = %e, "Failed to write to Redis cache");
                    }
                }
                _ = shutdown_rx.recv() => {
                    write_rx.close();
                    let mut flushed = 0usize;
                    while let Some(msg) = write_rx.recv().await {
                        if let Err(e) = Self::write_to_redis(&client, msg).await {
                            tracing::error!(error = %e, "Failed to flush cache write during shutdown");
                        } else {
                            flushed += 1;
                        }
                    }

                    tracing::info!(flushed, "Cache writer task stopped");
                    break;
                }
            }
        }
    }

    async fn write_to_redis(client: &Client, msg: CacheWriteMessage) -> AppResult<()> {
        match msg {
            CacheWriteMessage::Set { key, value } => {
                let mut conn = client.get_multiplexed_async_connection().await?;
                let _: () = conn.set(key, value).await?;
                Ok(())
            }
            CacheWriteMessage::Delete { key, done } => {
                let result = Self::delete(client, &key).await;
                // The invalidating caller may have given up waiting
                let _ = done.send(result);
                Ok(())
            }
        }
    }

    async fn delete(client: &Client, key: &str) -> AppResult<()> {
        let mut conn = client.get_multiplexed_async_connection().await?;
        let _: () = conn.del(key).await?;
        Ok(())
    }
}

#[async_trait::async_trait]
impl EntryCache for RedisCache {
    async fn get_raw(&self, key: &CacheKey) -> AppResult<Option<String>> {
        let mut conn = self.redis_client.get_multiplexed_async_connection().await?;
        let cached: Option<String> = conn.get(key.to_string()).await?;
        Ok(cached)
    }

    fn set_raw_in_background(&self, key: &CacheKey, value: String) {
        let msg = CacheWriteMessage::Set {
            key: key.to_string(),
            value,
        };

        if self.write_tx.send(msg).is_err() {
            tracing::error!(key = %key, "Failed to send cache write message, writer stopped");
        }
    }

    async fn invalidate(&self, key: &CacheKey) -> AppResult<()> {
        let (done, applied) = oneshot::channel();
        self.write_tx
            .send(CacheWriteMessage::Delete {
                key: key.to_string(),
                done,
            })
            .map_err(|_| AppError::Internal("Cache writer is not running".to_string()))?;

        applied.await.map_err(|_| {
            AppError::Internal("Cache writer stopped before applying invalidation".to_string())
        })??;

        tracing::info!(key = %key, "Cache entry invalidated");
        Ok(())
    }
}
