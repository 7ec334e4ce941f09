//! Broker sink trait definition

use async_trait::async_trait;

use super::error::BrokerError;

/// Broker sink trait
///
/// `publish` may buffer; records are only guaranteed to have left the
/// process after a successful `flush`.
#[async_trait]
pub trait BrokerSink: Send + Sync {
    /// Hand one payload to the producer for `topic`
    async fn publish(&self, topic: &str, payload: &[u8]) -> Result<(), BrokerError>;

    /// Deliver everything buffered so far
    async fn flush(&self) -> Result<(), BrokerError>;

    /// Backend name for debugging/logging
    fn backend_name(&self) -> &'static str;
}
