//! In-memory broker sink
//!
//! Published payloads sit in a pending buffer until `flush` moves them to
//! their topic, mirroring a buffering producer.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use super::backend::BrokerSink;
use super::error::BrokerError;

#[derive(Default)]
struct BrokerState {
    pending: Vec<(String, Vec<u8>)>,
    delivered: HashMap<String, Vec<Vec<u8>>>,
}

/// In-memory broker sink
#[derive(Clone, Default)]
pub struct MemoryBrokerSink {
    state: Arc<Mutex<BrokerState>>,
}

impl MemoryBrokerSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Payloads delivered to `topic`, in publish order
    pub fn messages(&self, topic: &str) -> Vec<Vec<u8>> {
        self.state
            .lock()
            .delivered
            .get(topic)
            .cloned()
            .unwrap_or_default()
    }

    /// Number of payloads published but not yet flushed
    pub fn pending_len(&self) -> usize {
        self.state.lock().pending.len()
    }
}

#[async_trait]
impl BrokerSink for MemoryBrokerSink {
    async fn publish(&self, topic: &str, payload: &[u8]) -> Result<(), BrokerError> {
        if topic.is_empty() {
            return Err(BrokerError::Publish("topic name is empty".to_string()));
        }
        self.state
            .lock()
            .pending
            .push((topic.to_string(), payload.to_vec()));
        Ok(())
    }

    async fn flush(&self) -> Result<(), BrokerError> {
        let mut state = self.state.lock();
        let pending = std::mem::take(&mut state.pending);
        for (topic, payload) in pending {
            state.delivered.entry(topic).or_default().push(payload);
        }
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}
