//! Record transformer: decode, filter, extract, flatten
//!
//! Each raw stream message decodes to one or more metric envelopes. A
//! message may be JSON, base64 text of JSON, or a JSON string holding either
//! (unwrapped up to [`MAX_NESTED_DEPTH`] levels). A JSON array is a batch of
//! envelopes, which is how the connector delivers them.
//!
//! Failures never abort a batch: each message or envelope that cannot be used
//! is reported as a [`SkipReason`] and counted in [`TransformStats`].

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde_json::{Map, Value};

use super::types::{
    Datapoint, FilteredMetric, FlatRecord, MetricEnvelope, OutputRecord, SkipReason, Transformed,
    TransformStats,
};
use super::whitelist::{WhitelistConfig, WhitelistPolicy};
use crate::data::stream::RawMetricMessage;

/// Levels of JSON-in-a-string wrapping that are unwrapped
const MAX_NESTED_DEPTH: usize = 3;

/// Datapoint count used when the datapoint does not carry one
const DEFAULT_DATAPOINT_COUNT: u64 = 1;

/// Reduce an envelope to the forwarded fields
pub fn extract(envelope: &MetricEnvelope) -> Result<FilteredMetric, SkipReason> {
    let fields = envelope.fields();
    object_section(fields, "dimensions")?;
    let metadata = object_section(fields, "metadata")?;

    let datapoints = match fields.get("datapoints") {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::Array(items)) => items
            .iter()
            .enumerate()
            .map(|(idx, item)| datapoint(idx, item))
            .collect::<Result<Vec<_>, _>>()?,
        Some(_) => {
            return Err(SkipReason::Extract(
                "datapoints is not an array".to_string(),
            ));
        }
    };

    Ok(FilteredMetric {
        resource_name: envelope.resource_name().map(str::to_string),
        resource_id: envelope.resource_id().map(str::to_string),
        display_name: metadata
            .and_then(|m| m.get("displayName"))
            .and_then(Value::as_str)
            .map(str::to_string),
        metric_name: envelope.metric_name().map(str::to_string),
        namespace: envelope.namespace().map(str::to_string),
        datapoints,
        partition_offset: fields.get("partitionOffset").cloned().unwrap_or(Value::Null),
        time_stamp: fields.get("timeStamp").cloned().unwrap_or(Value::Null),
    })
}

/// Expand a metric into one record per datapoint.
///
/// Records carry the five base fields (`resourceName`, `displayName`,
/// `metricName`, `namespace`, `partitionOffset`) and the datapoint's
/// `timestamp`, `value` and `count`. `resourceId` and the envelope-level
/// `timeStamp` stay on the unflattened [`FilteredMetric`] only.
///
/// With a non-empty `output_fields`, each record keeps only those keys, in
/// that order; names that are not record fields are ignored, so asking for
/// `timeStamp` or `resourceId` yields nothing for that name.
pub fn flatten(metric: &FilteredMetric, output_fields: &[String]) -> Vec<FlatRecord> {
    metric
        .datapoints
        .iter()
        .map(|dp| {
            let mut record = Map::new();
            record.insert("resourceName".into(), opt_string(&metric.resource_name));
            record.insert("displayName".into(), opt_string(&metric.display_name));
            record.insert("metricName".into(), opt_string(&metric.metric_name));
            record.insert("namespace".into(), opt_string(&metric.namespace));
            record.insert("partitionOffset".into(), metric.partition_offset.clone());
            record.insert("timestamp".into(), dp.timestamp.clone());
            record.insert("value".into(), dp.value.clone());
            record.insert("count".into(), dp.count.clone());

            if output_fields.is_empty() {
                return record;
            }
            output_fields
                .iter()
                .filter_map(|field| record.get(field).map(|v| (field.clone(), v.clone())))
                .collect()
        })
        .collect()
}

/// Decode one raw message into JSON values, one per envelope candidate
pub fn decode_payload(payload: &[u8]) -> Result<Vec<Value>, SkipReason> {
    let mut value = parse_json_or_base64(payload)?;
    let mut depth = 0;
    while let Value::String(inner) = value {
        if depth == MAX_NESTED_DEPTH {
            return Err(SkipReason::Decode(
                "payload nests JSON strings too deeply".to_string(),
            ));
        }
        value = parse_json_or_base64(inner.as_bytes())?;
        depth += 1;
    }

    match value {
        Value::Array(items) => Ok(items),
        Value::Object(_) => Ok(vec![value]),
        _ => Err(SkipReason::Decode(
            "payload is not a JSON object or array".to_string(),
        )),
    }
}

/// Filters and reshapes raw messages per the filtering configuration
#[derive(Debug, Clone)]
pub struct RecordTransformer {
    policy: WhitelistPolicy,
    flatten_output: bool,
    output_fields: Vec<String>,
}

impl RecordTransformer {
    pub fn new(config: &WhitelistConfig) -> Self {
        Self {
            policy: WhitelistPolicy::new(config),
            flatten_output: config.flatten_output,
            output_fields: config
                .output_fields
                .iter()
                .map(|f| f.trim().to_string())
                .filter(|f| !f.is_empty())
                .collect(),
        }
    }

    /// Transform one raw message.
    ///
    /// `Err` means the payload itself could not be decoded; otherwise there is
    /// one [`Transformed`] per decoded envelope.
    pub fn process(&self, raw: &RawMetricMessage) -> Result<Vec<Transformed>, SkipReason> {
        let values = decode_payload(&raw.value)?;
        Ok(values
            .into_iter()
            .map(|value| match value {
                Value::Object(fields) => self.process_envelope(&MetricEnvelope::new(fields)),
                _ => Transformed::Skipped(SkipReason::NotAnEnvelope),
            })
            .collect())
    }

    /// Apply the whitelist, then extract and optionally flatten
    pub fn process_envelope(&self, envelope: &MetricEnvelope) -> Transformed {
        if !self.policy.is_whitelisted_envelope(envelope) {
            return Transformed::Skipped(SkipReason::Filtered);
        }
        match extract(envelope) {
            Ok(metric) if self.flatten_output => Transformed::Emitted(
                flatten(&metric, &self.output_fields)
                    .into_iter()
                    .map(OutputRecord::Flat)
                    .collect(),
            ),
            Ok(metric) => Transformed::Emitted(vec![OutputRecord::Metric(metric)]),
            Err(reason) => Transformed::Skipped(reason),
        }
    }

    /// Transform a batch, collecting output and per-pass counters
    pub fn transform_batch(&self, raws: &[RawMetricMessage]) -> (Vec<OutputRecord>, TransformStats) {
        let mut stats = TransformStats::default();
        let mut output = Vec::new();

        for (idx, raw) in raws.iter().enumerate() {
            let results = match self.process(raw) {
                Ok(results) => results,
                Err(reason) => {
                    stats.decode_failures += 1;
                    tracing::debug!(record = idx, offset = %raw.offset, reason = ?reason, "Skipping undecodable record");
                    continue;
                }
            };
            stats.processed += 1;

            for result in results {
                match result {
                    Transformed::Emitted(records) => {
                        stats.emitted += records.len();
                        output.extend(records);
                    }
                    Transformed::Skipped(SkipReason::Filtered) => stats.filtered_out += 1,
                    Transformed::Skipped(reason) => {
                        if matches!(reason, SkipReason::NotAnEnvelope | SkipReason::Decode(_)) {
                            stats.decode_failures += 1;
                        } else {
                            stats.extract_failures += 1;
                        }
                        tracing::debug!(record = idx, offset = %raw.offset, reason = ?reason, "Skipping envelope");
                    }
                }
            }
        }

        (output, stats)
    }
}

fn parse_json_or_base64(bytes: &[u8]) -> Result<Value, SkipReason> {
    if let Ok(value) = serde_json::from_slice::<Value>(bytes) {
        return Ok(value);
    }
    let text = std::str::from_utf8(bytes)
        .map_err(|_| SkipReason::Decode("payload is not UTF-8".to_string()))?;
    let decoded = BASE64
        .decode(text.trim())
        .map_err(|_| SkipReason::Decode("payload is neither JSON nor base64".to_string()))?;
    serde_json::from_slice(&decoded)
        .map_err(|e| SkipReason::Decode(format!("base64 payload is not JSON: {e}")))
}

fn object_section<'a>(
    fields: &'a Map<String, Value>,
    key: &str,
) -> Result<Option<&'a Map<String, Value>>, SkipReason> {
    match fields.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Object(section)) => Ok(Some(section)),
        Some(_) => Err(SkipReason::Extract(format!("{key} is not an object"))),
    }
}

fn datapoint(idx: usize, item: &Value) -> Result<Datapoint, SkipReason> {
    let Value::Object(dp) = item else {
        return Err(SkipReason::Extract(format!(
            "datapoint {idx} is not an object"
        )));
    };
    Ok(Datapoint {
        timestamp: dp.get("timestamp").cloned().unwrap_or(Value::Null),
        value: dp.get("value").cloned().unwrap_or(Value::Null),
        count: match dp.get("count") {
            None | Some(Value::Null) => Value::from(DEFAULT_DATAPOINT_COUNT),
            Some(count) => count.clone(),
        },
    })
}

fn opt_string(value: &Option<String>) -> Value {
    value.clone().map(Value::String).unwrap_or(Value::Null)
}
