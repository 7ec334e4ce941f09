//! Data layer: stream sources and broker sinks

pub mod broker;
pub mod stream;
