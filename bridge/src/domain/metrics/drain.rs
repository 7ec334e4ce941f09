//! Batch drainer
//!
//! Fetches bounded batches until one of the stopping rules fires:
//! - a batch shorter than `limit_per_fetch` (stream exhausted)
//! - no next cursor returned
//! - `max_batches` fetched
//! - a non-cursor fetch error, or a cursor error the manager cannot recover
//!
//! Records read before a failure are always returned.

use std::sync::Arc;

use super::cursor::CursorManager;
use crate::data::stream::{RawMetricMessage, StreamSource};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// Short batch
    Exhausted,
    NoNextCursor,
    MaxBatches,
    FetchFailed,
    /// Cursor could not be created or recovered
    CursorUnavailable,
}

#[derive(Debug)]
pub struct DrainOutcome {
    pub records: Vec<RawMetricMessage>,
    /// Successful fetches
    pub batches: usize,
    pub stop: StopReason,
    /// Error text when the drain ended on a failure
    pub error: Option<String>,
}

impl DrainOutcome {
    /// Whether the drain failed before reading anything
    pub fn failed_before_read(&self) -> bool {
        self.error.is_some() && self.batches == 0 && self.records.is_empty()
    }
}

pub struct BatchDrainer {
    source: Arc<dyn StreamSource>,
    cursors: CursorManager,
}

impl BatchDrainer {
    pub fn new(source: Arc<dyn StreamSource>, cursors: CursorManager) -> Self {
        Self { source, cursors }
    }

    pub async fn drain_all(
        &mut self,
        limit_per_fetch: usize,
        max_batches: Option<usize>,
    ) -> DrainOutcome {
        let mut records = Vec::new();
        let mut batches = 0usize;

        let mut cursor = match self.cursors.open().await {
            Ok(cursor) => cursor,
            Err(e) => {
                tracing::error!(error = %e, "Cursor creation failed");
                return DrainOutcome {
                    records,
                    batches,
                    stop: StopReason::CursorUnavailable,
                    error: Some(format!("cursor_create_failed: {e}")),
                };
            }
        };

        let (stop, error) = loop {
            if let Some(max) = max_batches
                && batches >= max
            {
                break (StopReason::MaxBatches, None);
            }

            match self.source.fetch(&cursor, limit_per_fetch).await {
                Ok(batch) => {
                    batches += 1;
                    let received = batch.records.len();
                    records.extend(batch.records);
                    tracing::debug!(
                        batch = batches,
                        received,
                        total = records.len(),
                        "Fetched batch"
                    );

                    let has_next = batch.next_cursor.is_some();
                    self.cursors.advance(batch.next_cursor);
                    if received < limit_per_fetch {
                        break (StopReason::Exhausted, None);
                    }
                    if !has_next {
                        break (StopReason::NoNextCursor, None);
                    }
                    match self.cursors.current() {
                        Some(next) => cursor = next.clone(),
                        None => break (StopReason::NoNextCursor, None),
                    }
                }
                Err(e) if e.is_cursor_error() => match self.cursors.recover(e).await {
                    Ok(recreated) => cursor = recreated,
                    Err(e) => {
                        tracing::error!(
                            error = %e,
                            batch = batches + 1,
                            read = records.len(),
                            "Cursor could not be recovered, ending drain"
                        );
                        break (
                            StopReason::CursorUnavailable,
                            Some(format!("get_messages_failed: {e}")),
                        );
                    }
                },
                Err(e) => {
                    tracing::error!(
                        error = %e,
                        batch = batches + 1,
                        read = records.len(),
                        "Fetch failed, ending drain"
                    );
                    break (
                        StopReason::FetchFailed,
                        Some(format!("get_messages_failed: {e}")),
                    );
                }
            }
        };

        self.cursors.finish();
        tracing::debug!(batches, read = records.len(), stop = ?stop, "Drain finished");

        DrainOutcome {
            records,
            batches,
            stop,
            error,
        }
    }
}
