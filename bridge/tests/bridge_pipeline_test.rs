//! End-to-end bridge runs over the in-memory stream and broker

use std::sync::Arc;
use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde_json::{Value, json};

use metricbridge::data::broker::MemoryBrokerSink;
use metricbridge::data::stream::{CursorOrigin, MemoryStreamSource};
use metricbridge::domain::metrics::{
    BridgeSettings, InvocationStatus, MetricsBridge, WhitelistConfig,
};

const GROUP: &str = "nlb-metrics-group";
const TOPIC: &str = "oci_nlb_metrics";

fn envelope(resource: &str, metric: &str, points: usize) -> Value {
    let datapoints: Vec<Value> = (0..points)
        .map(|i| json!({ "timestamp": 1_700_000_000_000u64 + i as u64, "value": i }))
        .collect();
    json!({
        "namespace": "oci_nlb",
        "name": metric,
        "displayName": "Metric",
        "dimensions": { "resourceName": resource, "resourceId": format!("ocid1.nlb.{resource}") },
        "datapoints": datapoints,
    })
}

fn settings(limit: usize) -> BridgeSettings {
    BridgeSettings {
        group: GROUP.to_string(),
        instance: "faas-instance-1".to_string(),
        origin: CursorOrigin::Earliest,
        limit_per_fetch: limit,
        read_timeout: Duration::from_millis(100),
        max_batches: None,
        topic: TOPIC.to_string(),
        debug: true,
    }
}

fn bridge(
    source: &MemoryStreamSource,
    broker: &MemoryBrokerSink,
    filtering: WhitelistConfig,
    limit: usize,
) -> MetricsBridge {
    MetricsBridge::new(
        Arc::new(source.clone()),
        Arc::new(broker.clone()),
        &filtering,
        settings(limit),
    )
}

fn allow(resources: &[&str]) -> WhitelistConfig {
    WhitelistConfig {
        whitelisted_resource_names: resources.iter().map(|s| s.to_string()).collect(),
        ..Default::default()
    }
}

fn delivered(broker: &MemoryBrokerSink) -> Vec<Value> {
    broker
        .messages(TOPIC)
        .iter()
        .map(|m| serde_json::from_slice(m).unwrap())
        .collect()
}

#[tokio::test]
async fn test_drains_across_batches_and_commits() {
    let source = MemoryStreamSource::new();
    for _ in 0..7 {
        source.append(None, envelope("lb-1", "NewConnections", 1).to_string());
    }
    let broker = MemoryBrokerSink::new();

    let result = bridge(&source, &broker, allow(&["lb-1"]), 3).invoke().await;

    assert_eq!(result.status, InvocationStatus::Ok);
    assert_eq!(result.read, 7);
    assert_eq!(result.sent, 7);
    assert_eq!(broker.pending_len(), 0);
    assert_eq!(source.committed_offset(GROUP), Some(7));
    assert_eq!(source.open_cursors(), 0);

    let first = &delivered(&broker)[0];
    assert_eq!(first["resourceName"], "lb-1");
    assert_eq!(first["metricName"], "NewConnections");
    assert_eq!(first["count"], 1);
}

#[tokio::test]
async fn test_second_invocation_resumes_from_committed_position() {
    let source = MemoryStreamSource::new();
    let broker = MemoryBrokerSink::new();
    source.append(None, envelope("lb-1", "NewConnections", 1).to_string());

    let first = bridge(&source, &broker, allow(&[]), 10).invoke().await;
    assert_eq!(first.read, 1);

    let empty = bridge(&source, &broker, allow(&[]), 10).invoke().await;
    assert_eq!(empty.status, InvocationStatus::Empty);

    source.append(None, envelope("lb-1", "NewConnections", 2).to_string());
    let second = bridge(&source, &broker, allow(&[]), 10).invoke().await;
    assert_eq!(second.status, InvocationStatus::Ok);
    assert_eq!(second.read, 1);
    assert_eq!(second.sent, 2);
    assert_eq!(broker.messages(TOPIC).len(), 3);
    assert_eq!(source.open_cursors(), 0);
}

#[tokio::test]
async fn test_filters_and_reports_no_matching_metrics() {
    let source = MemoryStreamSource::new();
    source.append(None, envelope("lb-2", "NewConnections", 1).to_string());
    source.append(None, b"not json at all".to_vec());
    let broker = MemoryBrokerSink::new();

    let result = bridge(&source, &broker, allow(&["lb-1"]), 10).invoke().await;

    assert_eq!(result.status, InvocationStatus::NoMatchingMetrics);
    assert_eq!(result.read, 2);
    assert_eq!(result.sent, 0);
    assert!(broker.messages(TOPIC).is_empty());
}

#[tokio::test]
async fn test_base64_and_array_payloads() {
    let source = MemoryStreamSource::new();
    let batch = json!([
        envelope("lb-1", "NewConnections", 1),
        envelope("lb-1", "ProcessedBytes", 1),
        envelope("lb-3", "ProcessedBytes", 1),
    ]);
    source.append(Some("k"), STANDARD.encode(batch.to_string()));
    let broker = MemoryBrokerSink::new();

    let result = bridge(&source, &broker, allow(&["ocid1.nlb.lb-1"]), 10)
        .invoke()
        .await;

    assert_eq!(result.status, InvocationStatus::Ok);
    assert_eq!(result.read, 1);
    assert_eq!(result.sent, 2);
    let names: Vec<Value> = delivered(&broker)
        .iter()
        .map(|r| r["metricName"].clone())
        .collect();
    assert_eq!(names, vec![json!("NewConnections"), json!("ProcessedBytes")]);
}

#[tokio::test]
async fn test_metric_allow_list_narrows_output() {
    let source = MemoryStreamSource::new();
    source.append(None, envelope("lb-1", "NewConnections", 1).to_string());
    source.append(None, envelope("lb-1", "ProcessedBytes", 1).to_string());
    let broker = MemoryBrokerSink::new();
    let filtering = WhitelistConfig {
        whitelisted_metric_names: vec!["processed bytes".to_string()],
        ..allow(&["lb-1"])
    };

    let result = bridge(&source, &broker, filtering, 10).invoke().await;

    assert_eq!(result.sent, 1);
    assert_eq!(delivered(&broker)[0]["metricName"], "ProcessedBytes");
}

#[tokio::test]
async fn test_expired_group_position_falls_back_to_latest() {
    let source = MemoryStreamSource::new();
    let broker = MemoryBrokerSink::new();
    for _ in 0..3 {
        source.append(None, envelope("lb-1", "NewConnections", 1).to_string());
    }
    let first = bridge(&source, &broker, allow(&[]), 10).invoke().await;
    assert_eq!(first.read, 3);

    for _ in 0..5 {
        source.append(None, envelope("lb-1", "NewConnections", 1).to_string());
    }
    source.trim_before(6);

    let result = bridge(&source, &broker, allow(&[]), 10).invoke().await;

    assert_eq!(result.status, InvocationStatus::Empty);
    assert!(result.error.is_none());
    assert_eq!(source.committed_offset(GROUP), Some(8));
}

#[tokio::test]
async fn test_result_json_shape() {
    let source = MemoryStreamSource::new();
    let broker = MemoryBrokerSink::new();

    let result = bridge(&source, &broker, allow(&[]), 10).invoke().await;
    let value = serde_json::to_value(&result).unwrap();

    assert_eq!(value, json!({ "status": "empty", "read": 0, "sent": 0 }));
}
