//! Stream sources
//!
//! The bridge reads metric records through a group cursor:
//! - In-memory (default) - single-process log, for local runs and tests
//! - Redis Streams - consumer groups over a Redis stream key

mod backend;
mod error;
mod memory;
mod redis;

pub use backend::{
    CursorOrigin, CursorRequest, FetchedBatch, RawMetricMessage, StreamCursor, StreamSource,
};
pub use error::StreamError;
pub use memory::MemoryStreamSource;
pub use redis::RedisStreamSource;
