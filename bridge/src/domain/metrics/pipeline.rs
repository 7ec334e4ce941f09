//! Bridge invocation: drain -> transform -> forward
//!
//! One call to [`MetricsBridge::invoke`] runs a single bounded drain cycle and
//! reports what happened as an [`InvocationResult`]:
//! - `empty`: nothing was read
//! - `no_matching_metrics`: records were read but none produced output
//! - `error`: the cursor could not be opened, or the first fetch failed
//! - `ok`: otherwise, including partial reads cut short by a fetch failure

use std::sync::Arc;
use std::time::Duration;

use super::cursor::{ConsumerIdentity, CursorManager};
use super::drain::BatchDrainer;
use super::extract::RecordTransformer;
use super::forward::ForwardingSink;
use super::types::{InvocationResult, InvocationStatus};
use super::whitelist::WhitelistConfig;
use crate::data::broker::BrokerSink;
use crate::data::stream::{CursorOrigin, StreamSource};

/// Per-cycle settings derived from the application config
#[derive(Debug, Clone)]
pub struct BridgeSettings {
    pub group: String,
    pub instance: String,
    pub origin: CursorOrigin,
    pub limit_per_fetch: usize,
    pub read_timeout: Duration,
    pub max_batches: Option<usize>,
    pub topic: String,
    /// Log transform counters at info level
    pub debug: bool,
}

pub struct MetricsBridge {
    source: Arc<dyn StreamSource>,
    sink: ForwardingSink,
    transformer: RecordTransformer,
    settings: BridgeSettings,
}

impl MetricsBridge {
    pub fn new(
        source: Arc<dyn StreamSource>,
        broker: Arc<dyn BrokerSink>,
        filtering: &WhitelistConfig,
        settings: BridgeSettings,
    ) -> Self {
        Self {
            source,
            sink: ForwardingSink::new(broker),
            transformer: RecordTransformer::new(filtering),
            settings,
        }
    }

    /// Run one drain cycle
    pub async fn invoke(&self) -> InvocationResult {
        let identity = ConsumerIdentity {
            group: self.settings.group.clone(),
            instance: self.settings.instance.clone(),
            read_timeout: self.settings.read_timeout,
        };
        let cursors = CursorManager::new(self.source.clone(), identity, self.settings.origin);
        let mut drainer = BatchDrainer::new(self.source.clone(), cursors);

        let outcome = drainer
            .drain_all(self.settings.limit_per_fetch, self.settings.max_batches)
            .await;
        let read = outcome.records.len();

        if outcome.failed_before_read() {
            let error = outcome.error.unwrap_or_default();
            return InvocationResult::failed(error, 0);
        }
        if let Some(error) = &outcome.error {
            tracing::warn!(error = %error, read, "Drain ended early, forwarding partial results");
        }

        if read == 0 {
            return InvocationResult {
                status: InvocationStatus::Empty,
                read,
                sent: 0,
                error: None,
            };
        }

        let (records, stats) = self.transformer.transform_batch(&outcome.records);
        if self.settings.debug {
            tracing::info!(
                processed = stats.processed,
                decode_failures = stats.decode_failures,
                extract_failures = stats.extract_failures,
                filtered_out = stats.filtered_out,
                emitted = stats.emitted,
                "Transform stats"
            );
        } else {
            tracing::debug!(stats = ?stats, "Transform stats");
        }

        if records.is_empty() {
            return InvocationResult {
                status: InvocationStatus::NoMatchingMetrics,
                read,
                sent: 0,
                error: None,
            };
        }

        let forwarded = self.sink.publish_all(&records, &self.settings.topic).await;
        tracing::info!(
            read,
            emitted = records.len(),
            sent = forwarded.sent,
            failed = forwarded.failed,
            flushed = forwarded.flushed,
            batches = outcome.batches,
            "Invocation complete"
        );

        InvocationResult {
            status: InvocationStatus::Ok,
            read,
            sent: forwarded.sent,
            error: None,
        }
    }
}
