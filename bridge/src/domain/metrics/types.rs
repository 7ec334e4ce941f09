//! Metric record types shared by the transform stages

use serde::Serialize;
use serde_json::{Map, Value};

/// One decoded monitoring metric object.
///
/// Wraps the raw JSON object; fields are read defensively through the
/// accessors and every field may be missing on the wire.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricEnvelope(Map<String, Value>);

impl MetricEnvelope {
    pub fn new(fields: Map<String, Value>) -> Self {
        Self(fields)
    }

    pub fn fields(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn namespace(&self) -> Option<&str> {
        self.0.get("namespace").and_then(Value::as_str)
    }

    /// Metric name (`name` on the wire)
    pub fn metric_name(&self) -> Option<&str> {
        self.0.get("name").and_then(Value::as_str)
    }

    pub fn resource_name(&self) -> Option<&str> {
        self.dimension("resourceName")
    }

    pub fn resource_id(&self) -> Option<&str> {
        self.dimension("resourceId")
    }

    fn dimension(&self, key: &str) -> Option<&str> {
        self.0
            .get("dimensions")
            .and_then(Value::as_object)
            .and_then(|dims| dims.get(key))
            .and_then(Value::as_str)
    }
}

/// One datapoint of a metric
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Datapoint {
    pub timestamp: Value,
    pub value: Value,
    pub count: Value,
}

/// An envelope reduced to the fields the bridge forwards
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FilteredMetric {
    pub resource_name: Option<String>,
    pub resource_id: Option<String>,
    pub display_name: Option<String>,
    pub metric_name: Option<String>,
    pub namespace: Option<String>,
    pub datapoints: Vec<Datapoint>,
    pub partition_offset: Value,
    pub time_stamp: Value,
}

/// One datapoint merged with its metric's scalar fields, keys in output order
pub type FlatRecord = Map<String, Value>;

/// Unit handed to the broker
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum OutputRecord {
    Flat(FlatRecord),
    Metric(FilteredMetric),
}

impl OutputRecord {
    pub fn to_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }
}

/// Why a record (or one envelope within it) produced no output
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    /// Payload is not JSON, base64 JSON, or a JSON-encoded string of either
    Decode(String),
    /// Decoded value is not a metric object
    NotAnEnvelope,
    /// Rejected by the whitelist
    Filtered,
    /// Envelope has a malformed section
    Extract(String),
}

/// Per-envelope transform result
#[derive(Debug, Clone, PartialEq)]
pub enum Transformed {
    Emitted(Vec<OutputRecord>),
    Skipped(SkipReason),
}

/// Counters for one transform pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TransformStats {
    /// Raw messages that decoded successfully
    pub processed: usize,
    pub decode_failures: usize,
    pub extract_failures: usize,
    pub filtered_out: usize,
    /// Output records produced
    pub emitted: usize,
}

/// Outcome of one invocation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum InvocationStatus {
    Ok,
    Empty,
    NoMatchingMetrics,
    Error,
}

/// Result returned by one bridge invocation
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InvocationResult {
    pub status: InvocationStatus,
    pub read: usize,
    pub sent: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl InvocationResult {
    pub fn failed(error: impl Into<String>, read: usize) -> Self {
        Self {
            status: InvocationStatus::Error,
            read,
            sent: 0,
            error: Some(error.into()),
        }
    }

    pub fn is_error(&self) -> bool {
        self.status == InvocationStatus::Error
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_envelope_accessors() {
        let Value::Object(fields) = json!({
            "namespace": "oci_nlb",
            "name": "NewConnections",
            "dimensions": {"resourceName": "lb-1", "resourceId": "ocid1.nlb.a"}
        }) else {
            unreachable!()
        };
        let envelope = MetricEnvelope::new(fields);

        assert_eq!(envelope.namespace(), Some("oci_nlb"));
        assert_eq!(envelope.metric_name(), Some("NewConnections"));
        assert_eq!(envelope.resource_name(), Some("lb-1"));
        assert_eq!(envelope.resource_id(), Some("ocid1.nlb.a"));
    }

    #[test]
    fn test_envelope_accessors_tolerate_bad_shapes() {
        let Value::Object(fields) = json!({"name": 5, "dimensions": "nope"}) else {
            unreachable!()
        };
        let envelope = MetricEnvelope::new(fields);
        assert_eq!(envelope.metric_name(), None);
        assert_eq!(envelope.resource_name(), None);
    }

    #[test]
    fn test_invocation_result_json() {
        let result = InvocationResult {
            status: InvocationStatus::NoMatchingMetrics,
            read: 3,
            sent: 0,
            error: None,
        };
        assert_eq!(
            serde_json::to_string(&result).unwrap(),
            r#"{"status":"no_matching_metrics","read":3,"sent":0}"#
        );
    }

    #[test]
    fn test_failed_result_carries_error() {
        let result = InvocationResult::failed("cursor_create_failed", 0);
        assert!(result.is_error());
        assert_eq!(
            serde_json::to_string(&result).unwrap(),
            r#"{"status":"error","read":0,"sent":0,"error":"cursor_create_failed"}"#
        );
    }

    #[test]
    fn test_filtered_metric_serializes_camel_case() {
        let metric = FilteredMetric {
            resource_name: Some("lb-1".to_string()),
            resource_id: None,
            display_name: None,
            metric_name: Some("NewConnections".to_string()),
            namespace: None,
            datapoints: vec![],
            partition_offset: Value::Null,
            time_stamp: Value::Null,
        };
        let value = serde_json::to_value(OutputRecord::Metric(metric)).unwrap();
        assert_eq!(value["resourceName"], "lb-1");
        assert_eq!(value["metricName"], "NewConnections");
        assert!(value["partitionOffset"].is_null());
    }
}
