//! Metric bridging pipeline
//!
//! Leaf-first:
//! - `whitelist`: normalized allow-list predicate
//! - `extract`: decode, filter, extract and flatten records
//! - `cursor`: group cursor lifecycle and recovery
//! - `drain`: bounded multi-batch fetch loop
//! - `forward`: best-effort publish with one terminal flush
//! - `pipeline`: one invocation wiring the stages together

pub mod cursor;
pub mod drain;
pub mod extract;
pub mod forward;
pub mod pipeline;
pub mod types;
pub mod whitelist;

#[cfg(test)]
pub(crate) mod testing;

pub use cursor::{ConsumerIdentity, CursorManager, CursorState};
pub use drain::{BatchDrainer, DrainOutcome, StopReason};
pub use extract::{RecordTransformer, decode_payload, extract, flatten};
pub use forward::{ForwardOutcome, ForwardingSink};
pub use pipeline::{BridgeSettings, MetricsBridge};
pub use types::{
    Datapoint, FilteredMetric, FlatRecord, InvocationResult, InvocationStatus, MetricEnvelope,
    OutputRecord, SkipReason, TransformStats, Transformed,
};
pub use whitelist::{WhitelistConfig, WhitelistPolicy};
