//! Redis Streams broker sink
//!
//! Behaves like a batching producer:
//! - `publish` appends to a local buffer bounded by `batch_size` bytes; a
//!   full buffer is sent before the new payload is accepted
//! - `flush` sends the buffer as one pipelined `XADD` batch, retried with
//!   exponential backoff
//!
//! Each payload becomes one stream entry (`payload` field) on the stream named
//! after the topic, trimmed approximately with `MAXLEN ~`.

use std::time::Duration;

use async_trait::async_trait;
use deadpool_redis::{Config, Pool, Runtime};
use parking_lot::Mutex;

use super::backend::BrokerSink;
use super::error::BrokerError;
use crate::utils::retry::RetryPolicy;
use crate::utils::string::sanitize_url;

/// Approximate MAXLEN for destination streams
const DEFAULT_TOPIC_MAXLEN: u64 = 1_000_000;

#[derive(Default)]
struct PendingBatch {
    entries: Vec<(String, Vec<u8>)>,
    bytes: usize,
}

/// Redis Streams broker sink
pub struct RedisBrokerSink {
    pool: Pool,
    batch_size: usize,
    retries: u32,
    topic_maxlen: u64,
    buffer: Mutex<PendingBatch>,
}

impl RedisBrokerSink {
    /// Connect to Redis and validate the connection
    pub async fn new(redis_url: &str, batch_size: usize, retries: u32) -> Result<Self, BrokerError> {
        let sanitized_url = sanitize_url(redis_url);

        let mut config = Config::from_url(redis_url);
        config.pool = Some(deadpool_redis::PoolConfig {
            max_size: 4,
            timeouts: deadpool_redis::Timeouts {
                wait: Some(Duration::from_secs(5)),
                create: Some(Duration::from_secs(5)),
                recycle: Some(Duration::from_secs(5)),
            },
            ..Default::default()
        });

        let pool = config.create_pool(Some(Runtime::Tokio1)).map_err(|e| {
            BrokerError::Connection(format!(
                "Failed to create Redis pool for {sanitized_url}: {e}"
            ))
        })?;

        let mut conn = pool.get().await.map_err(|e| {
            BrokerError::Connection(format!(
                "Failed to get Redis connection from pool for {sanitized_url}: {e}"
            ))
        })?;

        deadpool_redis::redis::cmd("PING")
            .query_async::<String>(&mut conn)
            .await
            .map_err(|e| {
                BrokerError::Connection(format!("Redis PING failed for {sanitized_url}: {e}"))
            })?;

        tracing::debug!(url = %sanitized_url, batch_size, retries, "Redis broker connected");

        Ok(Self {
            pool,
            batch_size,
            retries,
            topic_maxlen: DEFAULT_TOPIC_MAXLEN,
            buffer: Mutex::new(PendingBatch::default()),
        })
    }

    /// Send the current buffer once; on failure the entries are put back
    async fn send_buffered(&self) -> Result<(), BrokerError> {
        let batch = std::mem::take(&mut *self.buffer.lock());
        if batch.entries.is_empty() {
            return Ok(());
        }

        match self.send_batch(&batch.entries).await {
            Ok(()) => {
                tracing::debug!(
                    entries = batch.entries.len(),
                    bytes = batch.bytes,
                    "Broker batch sent"
                );
                Ok(())
            }
            Err(e) => {
                let mut buffer = self.buffer.lock();
                let newer = std::mem::take(&mut buffer.entries);
                buffer.bytes += batch.bytes;
                buffer.entries = batch.entries;
                buffer.entries.extend(newer);
                Err(e)
            }
        }
    }

    async fn send_batch(&self, entries: &[(String, Vec<u8>)]) -> Result<(), BrokerError> {
        let mut conn = self.pool.get().await?;
        let mut pipe = deadpool_redis::redis::pipe();
        for (topic, payload) in entries {
            pipe.cmd("XADD")
                .arg(topic)
                .arg("MAXLEN")
                .arg("~")
                .arg(self.topic_maxlen)
                .arg("*")
                .arg("payload")
                .arg(payload.as_slice())
                .ignore();
        }
        pipe.query_async::<()>(&mut conn).await?;
        Ok(())
    }
}

#[async_trait]
impl BrokerSink for RedisBrokerSink {
    async fn publish(&self, topic: &str, payload: &[u8]) -> Result<(), BrokerError> {
        if topic.is_empty() {
            return Err(BrokerError::Publish("topic name is empty".to_string()));
        }

        let buffer_full = {
            let buffer = self.buffer.lock();
            !buffer.entries.is_empty() && buffer.bytes + payload.len() > self.batch_size
        };
        if buffer_full {
            self.send_buffered().await.map_err(|e| {
                BrokerError::Publish(format!("buffer full and batch send failed: {e}"))
            })?;
        }

        let mut buffer = self.buffer.lock();
        buffer.bytes += payload.len();
        buffer.entries.push((topic.to_string(), payload.to_vec()));
        Ok(())
    }

    async fn flush(&self) -> Result<(), BrokerError> {
        RetryPolicy::with_attempts(self.retries)
            .run("broker_flush", || self.send_buffered())
            .await
            .map(|_| ())
            .map_err(|(e, attempts)| BrokerError::Flush(format!("{e} (after {attempts} attempts)")))
    }

    fn backend_name(&self) -> &'static str {
        "redis"
    }
}
