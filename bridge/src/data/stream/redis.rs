//! Redis Streams source
//!
//! Maps group cursors onto Redis consumer groups:
//! - `XGROUP CREATE ... MKSTREAM` creates the group (`0` for earliest, `$`
//!   for latest); an existing group keeps its position
//! - `XREADGROUP ... >` reads entries never delivered to the group
//! - `NOACK` when `commit_on_get` is set, so a read advances the group
//!
//! Entries are expected to carry a `payload` field and an optional `key`
//! field. Cursor tokens are local handles, one per group consumer; the group
//! position lives in Redis.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use deadpool_redis::redis::{RedisResult, Value as RedisValue};
use deadpool_redis::{Config, Pool, Runtime};
use parking_lot::Mutex;

use super::backend::{
    CursorOrigin, CursorRequest, FetchedBatch, RawMetricMessage, StreamCursor, StreamSource,
};
use super::error::StreamError;
use crate::utils::string::sanitize_url;

/// Entry field holding the message payload
const PAYLOAD_FIELD: &[u8] = b"payload";

/// Entry field holding the optional message key
const KEY_FIELD: &[u8] = b"key";

#[derive(Debug, Clone)]
struct GroupCursor {
    group: String,
    consumer: String,
    block_ms: u64,
    commit_on_get: bool,
}

/// Redis Streams source
pub struct RedisStreamSource {
    pool: Pool,
    stream_key: String,
    cursors: Mutex<HashMap<String, GroupCursor>>,
}

impl RedisStreamSource {
    /// Connect to Redis and validate the connection
    pub async fn new(redis_url: &str, stream_name: &str) -> Result<Self, StreamError> {
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
            StreamError::Connection(format!(
                "Failed to create Redis pool for {sanitized_url}: {e}"
            ))
        })?;

        let mut conn = pool.get().await.map_err(|e| {
            StreamError::Connection(format!(
                "Failed to get Redis connection from pool for {sanitized_url}: {e}"
            ))
        })?;

        deadpool_redis::redis::cmd("PING")
            .query_async::<String>(&mut conn)
            .await
            .map_err(|e| {
                StreamError::Connection(format!("Redis PING failed for {sanitized_url}: {e}"))
            })?;

        tracing::debug!(url = %sanitized_url, stream = stream_name, "Redis stream source connected");

        Ok(Self {
            pool,
            stream_key: stream_name.to_string(),
            cursors: Mutex::new(HashMap::new()),
        })
    }

    /// Create the consumer group if it does not exist yet
    async fn ensure_group(&self, group: &str, origin: CursorOrigin) -> Result<(), StreamError> {
        let mut conn = self.pool.get().await?;
        let start_id = match origin {
            CursorOrigin::Earliest => "0",
            CursorOrigin::Latest => "$",
        };

        let result: RedisResult<String> = deadpool_redis::redis::cmd("XGROUP")
            .arg("CREATE")
            .arg(&self.stream_key)
            .arg(group)
            .arg(start_id)
            .arg("MKSTREAM")
            .query_async(&mut conn)
            .await;

        if group_create_result(result)? {
            tracing::debug!(group, %origin, "Consumer group created");
        }
        Ok(())
    }

    /// Register the local handle for a group consumer
    fn register_cursor(&self, request: &CursorRequest) -> StreamCursor {
        let token = cursor_token(&request.group, &request.instance);
        self.cursors.lock().insert(
            token.clone(),
            GroupCursor {
                group: request.group.clone(),
                consumer: request.instance.clone(),
                block_ms: (request.read_timeout.as_millis() as u64).max(1),
                commit_on_get: request.commit_on_get,
            },
        );
        StreamCursor {
            token,
            origin: request.origin,
        }
    }

    fn open_cursors(&self) -> usize {
        self.cursors.lock().len()
    }
}

fn cursor_token(group: &str, instance: &str) -> String {
    format!("{group}:{instance}")
}

/// Outcome of `XGROUP CREATE`: `true` when the group was created, `false`
/// when it already existed. Other server errors are not cursor errors.
fn group_create_result(result: RedisResult<String>) -> Result<bool, StreamError> {
    match result {
        Ok(_) => Ok(true),
        Err(e) if e.to_string().contains("BUSYGROUP") => Ok(false),
        Err(e) => Err(e.into()),
    }
}

#[async_trait]
impl StreamSource for RedisStreamSource {
    async fn create_cursor(&self, request: &CursorRequest) -> Result<StreamCursor, StreamError> {
        self.ensure_group(&request.group, request.origin).await?;
        let cursor = self.register_cursor(request);
        tracing::trace!(open_cursors = self.open_cursors(), "Redis group cursor registered");
        Ok(cursor)
    }

    async fn fetch(
        &self,
        cursor: &StreamCursor,
        limit: usize,
    ) -> Result<FetchedBatch, StreamError> {
        let Some(group_cursor) = self.cursors.lock().get(&cursor.token).cloned() else {
            return Err(StreamError::Cursor(format!(
                "invalid cursor: unknown token {}",
                cursor.token
            )));
        };

        let mut conn = self.pool.get().await?;

        let mut command = deadpool_redis::redis::cmd("XREADGROUP");
        command
            .arg("GROUP")
            .arg(&group_cursor.group)
            .arg(&group_cursor.consumer)
            .arg("COUNT")
            .arg(limit)
            .arg("BLOCK")
            .arg(group_cursor.block_ms);
        if group_cursor.commit_on_get {
            command.arg("NOACK");
        }
        command.arg("STREAMS").arg(&self.stream_key).arg(">");

        let value: RedisValue = command.query_async(&mut conn).await?;
        let records = match value {
            RedisValue::Nil => Vec::new(),
            value => parse_xreadgroup_response(value),
        };

        Ok(FetchedBatch {
            records,
            next_cursor: Some(cursor.clone()),
        })
    }

    fn release_cursor(&self, cursor: &StreamCursor) {
        self.cursors.lock().remove(&cursor.token);
    }

    async fn health_check(&self) -> Result<(), StreamError> {
        let mut conn = self.pool.get().await?;
        deadpool_redis::redis::cmd("PING")
            .query_async::<String>(&mut conn)
            .await?;
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "redis"
    }
}

/// Parse an XREADGROUP reply: `[[stream, [[id, [field, value, ...]], ...]]]`
fn parse_xreadgroup_response(value: RedisValue) -> Vec<RawMetricMessage> {
    let RedisValue::Array(streams) = value else {
        return Vec::new();
    };

    let mut records = Vec::new();
    for stream_data in streams {
        let RedisValue::Array(parts) = stream_data else {
            continue;
        };
        let Some(RedisValue::Array(entries)) = parts.get(1) else {
            continue;
        };
        for entry in entries {
            if let RedisValue::Array(entry_parts) = entry
                && let (Some(RedisValue::BulkString(id)), Some(RedisValue::Array(fields))) =
                    (entry_parts.first(), entry_parts.get(1))
            {
                let offset = String::from_utf8_lossy(id).into_owned();
                // Kept with an empty value so the entry is counted as a decode failure
                let payload = field_value(fields, PAYLOAD_FIELD).unwrap_or_else(|| {
                    tracing::warn!(offset = %offset, "Stream entry without payload field");
                    Vec::new()
                });
                records.push(RawMetricMessage {
                    offset,
                    key: field_value(fields, KEY_FIELD)
                        .map(|k| String::from_utf8_lossy(&k).into_owned()),
                    value: payload,
                });
            }
        }
    }
    records
}

/// Look up a field in a flat `[field, value, ...]` list
fn field_value(fields: &[RedisValue], name: &[u8]) -> Option<Vec<u8>> {
    fields.chunks(2).find_map(|pair| match pair {
        [RedisValue::BulkString(field), RedisValue::BulkString(value)] if field == name => {
            Some(value.clone())
        }
        _ => None,
    })
}
