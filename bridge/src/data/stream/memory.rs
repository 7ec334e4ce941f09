//! In-memory stream source
//!
//! Single-partition log with simulated group cursors:
//! - Offsets are assigned sequentially from 0
//! - `trim_before` drops old records, which invalidates cursors and committed
//!   positions that point into the trimmed range
//! - Cursors advance the group's committed position on fetch when
//!   `commit_on_get` is set
//!
//! Suitable for local runs and tests. Nothing survives a restart.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;

use super::backend::{
    CursorOrigin, CursorRequest, FetchedBatch, RawMetricMessage, StreamCursor, StreamSource,
};
use super::error::StreamError;

#[derive(Clone)]
struct StoredMessage {
    offset: u64,
    key: Option<String>,
    value: Vec<u8>,
}

/// Committed position of a consumer group
#[derive(Clone, Copy)]
struct GroupPosition {
    next_offset: u64,
    origin: CursorOrigin,
}

#[derive(Clone)]
struct OpenCursor {
    group: String,
    position: u64,
    commit_on_get: bool,
}

#[derive(Default)]
struct LogState {
    messages: VecDeque<StoredMessage>,
    next_offset: u64,
    groups: HashMap<String, GroupPosition>,
    cursors: HashMap<String, OpenCursor>,
    next_cursor_id: u64,
}

impl LogState {
    fn retention_start(&self) -> u64 {
        self.messages
            .front()
            .map(|m| m.offset)
            .unwrap_or(self.next_offset)
    }

    fn open_cursor(&mut self, open: OpenCursor, origin: CursorOrigin) -> StreamCursor {
        self.next_cursor_id += 1;
        let token = format!("mem-cursor-{}", self.next_cursor_id);
        self.cursors.insert(token.clone(), open);
        StreamCursor { token, origin }
    }
}

/// In-memory stream source
#[derive(Clone, Default)]
pub struct MemoryStreamSource {
    state: Arc<RwLock<LogState>>,
}

impl MemoryStreamSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a record and return its offset
    pub fn append(&self, key: Option<&str>, value: impl Into<Vec<u8>>) -> u64 {
        let mut state = self.state.write();
        let offset = state.next_offset;
        state.messages.push_back(StoredMessage {
            offset,
            key: key.map(str::to_string),
            value: value.into(),
        });
        state.next_offset += 1;
        offset
    }

    /// Drop every record with an offset below `offset`
    pub fn trim_before(&self, offset: u64) {
        let mut state = self.state.write();
        while state.messages.front().is_some_and(|m| m.offset < offset) {
            state.messages.pop_front();
        }
        if state.messages.is_empty() && state.next_offset < offset {
            state.next_offset = offset;
        }
    }

    /// Next offset the group will read, if the group exists
    pub fn committed_offset(&self, group: &str) -> Option<u64> {
        self.state.read().groups.get(group).map(|g| g.next_offset)
    }

    /// Number of retained records
    pub fn len(&self) -> usize {
        self.state.read().messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of cursor tokens that can still be fetched with
    pub fn open_cursors(&self) -> usize {
        self.state.read().cursors.len()
    }
}

#[async_trait]
impl StreamSource for MemoryStreamSource {
    async fn create_cursor(&self, request: &CursorRequest) -> Result<StreamCursor, StreamError> {
        let mut state = self.state.write();
        let retention_start = state.retention_start();

        // A group resumes from its committed position only when asked for the
        // origin it was created with; any other origin resets the group.
        let position = match state.groups.get(&request.group) {
            Some(group) if group.origin == request.origin => {
                if group.next_offset < retention_start {
                    return Err(StreamError::Cursor(format!(
                        "committed offset {} for group {} is outside retention period",
                        group.next_offset, request.group
                    )));
                }
                group.next_offset
            }
            _ => match request.origin {
                CursorOrigin::Earliest => retention_start,
                CursorOrigin::Latest => state.next_offset,
            },
        };

        state.groups.insert(
            request.group.clone(),
            GroupPosition {
                next_offset: position,
                origin: request.origin,
            },
        );

        let cursor = state.open_cursor(
            OpenCursor {
                group: request.group.clone(),
                position,
                commit_on_get: request.commit_on_get,
            },
            request.origin,
        );
        tracing::trace!(
            group = %request.group,
            instance = %request.instance,
            position,
            "Memory group cursor created"
        );
        Ok(cursor)
    }

    async fn fetch(
        &self,
        cursor: &StreamCursor,
        limit: usize,
    ) -> Result<FetchedBatch, StreamError> {
        let mut state = self.state.write();
        let Some(open) = state.cursors.remove(&cursor.token) else {
            return Err(StreamError::Cursor(format!(
                "invalid cursor: unknown token {}",
                cursor.token
            )));
        };

        // An expired token stays consumed; the caller has to create a new cursor
        let retention_start = state.retention_start();
        if open.position < retention_start {
            return Err(StreamError::Cursor(format!(
                "cursor position {} is outside retention period (oldest offset {})",
                open.position, retention_start
            )));
        }

        let selected: Vec<&StoredMessage> = state
            .messages
            .iter()
            .filter(|m| m.offset >= open.position)
            .take(limit)
            .collect();
        let next_position = selected
            .last()
            .map(|m| m.offset + 1)
            .unwrap_or(open.position);
        let records: Vec<RawMetricMessage> = selected
            .into_iter()
            .map(|m| RawMetricMessage {
                offset: m.offset.to_string(),
                key: m.key.clone(),
                value: m.value.clone(),
            })
            .collect();

        if open.commit_on_get
            && let Some(group) = state.groups.get_mut(&open.group)
        {
            group.next_offset = next_position;
        }

        let next_cursor = state.open_cursor(
            OpenCursor {
                position: next_position,
                ..open
            },
            cursor.origin,
        );

        Ok(FetchedBatch {
            records,
            next_cursor: Some(next_cursor),
        })
    }

    fn release_cursor(&self, cursor: &StreamCursor) {
        self.state.write().cursors.remove(&cursor.token);
    }

    async fn health_check(&self) -> Result<(), StreamError> {
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}
