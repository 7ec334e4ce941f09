//! Broker sinks
//!
//! Destinations for transformed metric records:
//! - In-memory (default) - buffers until flush, for local runs and tests
//! - Redis Streams - buffered producer writing one stream entry per record

mod backend;
mod error;
mod memory;
mod redis;

pub use backend::BrokerSink;
pub use error::BrokerError;
pub use memory::MemoryBrokerSink;
pub use redis::RedisBrokerSink;
