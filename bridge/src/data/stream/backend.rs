//! Stream source trait definition
//!
//! A stream source is a cursor-addressed, partitioned log. Reads go through a
//! group cursor: the service tracks the consumer group's committed position,
//! so the bridge itself never persists offsets.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::error::StreamError;

/// Where a new group cursor starts when the group has no usable position
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CursorOrigin {
    /// Oldest record still retained
    #[default]
    Earliest,
    /// Only records appended after the cursor is created
    Latest,
}

impl CursorOrigin {
    /// The other origin, used as the fallback start position
    pub fn alternate(self) -> Self {
        match self {
            CursorOrigin::Earliest => CursorOrigin::Latest,
            CursorOrigin::Latest => CursorOrigin::Earliest,
        }
    }
}

impl fmt::Display for CursorOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CursorOrigin::Earliest => write!(f, "earliest"),
            CursorOrigin::Latest => write!(f, "latest"),
        }
    }
}

/// Opaque read position handed out by the stream service
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamCursor {
    pub token: String,
    pub origin: CursorOrigin,
}

/// Parameters for creating a group cursor
#[derive(Debug, Clone)]
pub struct CursorRequest {
    /// Consumer group name
    pub group: String,
    /// Consumer instance within the group
    pub instance: String,
    /// Start position when the group has no committed position
    pub origin: CursorOrigin,
    /// Server-side wait for a fetch that finds no records
    pub read_timeout: Duration,
    /// Advance the group's committed position on every fetch
    pub commit_on_get: bool,
}

/// One message as received from the stream
#[derive(Debug, Clone)]
pub struct RawMetricMessage {
    /// Position of the message within its partition
    pub offset: String,
    /// Optional partitioning key
    pub key: Option<String>,
    /// Payload bytes (JSON, or base64 text of JSON)
    pub value: Vec<u8>,
}

/// Result of a single fetch
#[derive(Debug, Default)]
pub struct FetchedBatch {
    pub records: Vec<RawMetricMessage>,
    /// Cursor for the next fetch; `None` when the service returned none
    pub next_cursor: Option<StreamCursor>,
}

/// Stream source trait
///
/// Implemented by the in-memory log and the Redis Streams source.
#[async_trait]
pub trait StreamSource: Send + Sync {
    /// Create (or resume) a group cursor
    async fn create_cursor(&self, request: &CursorRequest) -> Result<StreamCursor, StreamError>;

    /// Fetch up to `limit` records starting at `cursor`.
    ///
    /// Only the returned `next_cursor` is valid afterwards; sources may hand
    /// back the same token.
    async fn fetch(&self, cursor: &StreamCursor, limit: usize)
    -> Result<FetchedBatch, StreamError>;

    /// Drop the handle behind `cursor`. Unknown tokens are ignored.
    fn release_cursor(&self, cursor: &StreamCursor);

    /// Health check (validates connection)
    async fn health_check(&self) -> Result<(), StreamError>;

    /// Backend name for debugging/logging
    fn backend_name(&self) -> &'static str;
}
