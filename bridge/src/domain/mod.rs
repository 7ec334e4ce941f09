//! Domain layer

pub mod metrics;
