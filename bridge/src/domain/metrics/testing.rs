//! Scripted stream and broker fakes for unit tests

use std::collections::{HashSet, VecDeque};

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::data::broker::{BrokerError, BrokerSink};
use crate::data::stream::{
    CursorOrigin, CursorRequest, FetchedBatch, RawMetricMessage, StreamCursor, StreamError,
    StreamSource,
};

pub fn cursor_error() -> StreamError {
    StreamError::Read("cursor is outside retention period".to_string())
}

pub fn read_error() -> StreamError {
    StreamError::Read("connection reset by peer".to_string())
}

/// `count` raw records with offsets starting at `start`, one metric each
pub fn metric_records(start: usize, count: usize, resource: &str) -> Vec<RawMetricMessage> {
    (start..start + count)
        .map(|i| RawMetricMessage {
            offset: i.to_string(),
            key: None,
            value: format!(
                r#"{{"namespace":"oci_nlb","name":"NewConnections","dimensions":{{"resourceName":"{resource}"}},"datapoints":[{{"timestamp":{i},"value":1}}]}}"#
            )
            .into_bytes(),
        })
        .collect()
}

#[derive(Default)]
struct SourceScript {
    create_errors: VecDeque<StreamError>,
    fetches: VecDeque<Result<FetchedBatch, StreamError>>,
    create_requests: Vec<CursorRequest>,
    fetch_limits: Vec<usize>,
    released: Vec<String>,
    next_id: usize,
}

/// Stream source replaying scripted results.
///
/// Creates succeed unless an error is queued. Fetches replay the queue and
/// return an empty batch once it runs out.
#[derive(Default)]
pub struct ScriptedSource {
    script: Mutex<SourceScript>,
}

impl ScriptedSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_create_error(&self, error: StreamError) {
        self.script.lock().create_errors.push_back(error);
    }

    pub fn push_batch(&self, records: Vec<RawMetricMessage>, has_next: bool) {
        let mut script = self.script.lock();
        script.next_id += 1;
        let next_cursor = has_next.then(|| StreamCursor {
            token: format!("next-{}", script.next_id),
            origin: CursorOrigin::Earliest,
        });
        script.fetches.push_back(Ok(FetchedBatch {
            records,
            next_cursor,
        }));
    }

    pub fn push_fetch_error(&self, error: StreamError) {
        self.script.lock().fetches.push_back(Err(error));
    }

    pub fn create_requests(&self) -> Vec<CursorRequest> {
        self.script.lock().create_requests.clone()
    }

    pub fn create_origins(&self) -> Vec<CursorOrigin> {
        self.create_requests().iter().map(|r| r.origin).collect()
    }

    pub fn fetch_limits(&self) -> Vec<usize> {
        self.script.lock().fetch_limits.clone()
    }

    /// Tokens handed back through `release_cursor`, in order
    pub fn released(&self) -> Vec<String> {
        self.script.lock().released.clone()
    }
}

#[async_trait]
impl StreamSource for ScriptedSource {
    async fn create_cursor(&self, request: &CursorRequest) -> Result<StreamCursor, StreamError> {
        let mut script = self.script.lock();
        script.create_requests.push(request.clone());
        if let Some(error) = script.create_errors.pop_front() {
            return Err(error);
        }
        script.next_id += 1;
        Ok(StreamCursor {
            token: format!("cursor-{}", script.next_id),
            origin: request.origin,
        })
    }

    async fn fetch(
        &self,
        cursor: &StreamCursor,
        limit: usize,
    ) -> Result<FetchedBatch, StreamError> {
        let mut script = self.script.lock();
        script.fetch_limits.push(limit);
        script.fetches.pop_front().unwrap_or_else(|| {
            Ok(FetchedBatch {
                records: Vec::new(),
                next_cursor: Some(cursor.clone()),
            })
        })
    }

    fn release_cursor(&self, cursor: &StreamCursor) {
        self.script.lock().released.push(cursor.token.clone());
    }

    async fn health_check(&self) -> Result<(), StreamError> {
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "scripted"
    }
}

#[derive(Default)]
struct BrokerScript {
    fail_publish_at: HashSet<usize>,
    fail_flush: bool,
    attempts: usize,
    published: Vec<Vec<u8>>,
    flushes: usize,
}

/// Broker sink that fails publishes at chosen attempt indexes
#[derive(Default)]
pub struct ScriptedBroker {
    script: Mutex<BrokerScript>,
}

impl ScriptedBroker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_publish_at(&self, index: usize) {
        self.script.lock().fail_publish_at.insert(index);
    }

    pub fn fail_flush(&self) {
        self.script.lock().fail_flush = true;
    }

    pub fn attempts(&self) -> usize {
        self.script.lock().attempts
    }

    pub fn published(&self) -> Vec<Vec<u8>> {
        self.script.lock().published.clone()
    }

    pub fn flushes(&self) -> usize {
        self.script.lock().flushes
    }
}

#[async_trait]
impl BrokerSink for ScriptedBroker {
    async fn publish(&self, _topic: &str, payload: &[u8]) -> Result<(), BrokerError> {
        let mut script = self.script.lock();
        let index = script.attempts;
        script.attempts += 1;
        if script.fail_publish_at.contains(&index) {
            return Err(BrokerError::Publish(format!("scripted failure at {index}")));
        }
        script.published.push(payload.to_vec());
        Ok(())
    }

    async fn flush(&self) -> Result<(), BrokerError> {
        let mut script = self.script.lock();
        script.flushes += 1;
        if script.fail_flush {
            return Err(BrokerError::Flush("scripted flush failure".to_string()));
        }
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "scripted"
    }
}
