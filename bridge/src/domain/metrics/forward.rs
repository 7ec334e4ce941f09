//! Forwarding sink: best-effort publish with one terminal flush

use std::sync::Arc;

use super::types::OutputRecord;
use crate::data::broker::BrokerSink;

/// Counts from one publish pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ForwardOutcome {
    /// Records accepted by the broker
    pub sent: usize,
    pub failed: usize,
    pub flushed: bool,
}

pub struct ForwardingSink {
    broker: Arc<dyn BrokerSink>,
}

impl ForwardingSink {
    pub fn new(broker: Arc<dyn BrokerSink>) -> Self {
        Self { broker }
    }

    /// Publish every record, then flush once.
    ///
    /// A failed record is logged and skipped. A failed flush is logged and
    /// does not change the sent count.
    pub async fn publish_all(&self, records: &[OutputRecord], topic: &str) -> ForwardOutcome {
        let mut outcome = ForwardOutcome::default();

        for (idx, record) in records.iter().enumerate() {
            let payload = match record.to_bytes() {
                Ok(payload) => payload,
                Err(e) => {
                    outcome.failed += 1;
                    tracing::error!(error = %e, record = idx, "Failed to serialize record");
                    continue;
                }
            };

            match self.broker.publish(topic, &payload).await {
                Ok(()) => outcome.sent += 1,
                Err(e) => {
                    outcome.failed += 1;
                    tracing::error!(error = %e, record = idx, topic, "produce_failed");
                }
            }
        }

        match self.broker.flush().await {
            Ok(()) => outcome.flushed = true,
            Err(e) => {
                tracing::warn!(error = %e, sent = outcome.sent, "producer_flush_failed");
            }
        }

        outcome
    }
}
