//! Whitelist policy
//!
//! Resource names compare trimmed and case-insensitive. Metric names
//! additionally ignore all whitespace, so `New Connections` matches
//! `newconnections`. An empty set for a dimension matches everything.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use super::types::MetricEnvelope;

/// Filtering section of the configuration
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct WhitelistConfig {
    pub enabled: bool,
    pub whitelisted_resource_names: Vec<String>,
    pub whitelisted_metric_names: Vec<String>,
    pub flatten_output: bool,
    pub output_fields: Vec<String>,
}

impl Default for WhitelistConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            whitelisted_resource_names: Vec::new(),
            whitelisted_metric_names: Vec::new(),
            flatten_output: true,
            output_fields: Vec::new(),
        }
    }
}

/// Normalized match sets built once from a [`WhitelistConfig`]
#[derive(Debug, Clone)]
pub struct WhitelistPolicy {
    enabled: bool,
    resources: HashSet<String>,
    metrics: HashSet<String>,
}

impl WhitelistPolicy {
    pub fn new(config: &WhitelistConfig) -> Self {
        Self {
            enabled: config.enabled,
            resources: config
                .whitelisted_resource_names
                .iter()
                .map(|name| normalize_resource(name))
                .filter(|name| !name.is_empty())
                .collect(),
            metrics: config
                .whitelisted_metric_names
                .iter()
                .map(|name| normalize_metric(name))
                .filter(|name| !name.is_empty())
                .collect(),
        }
    }

    /// Check a resource/metric pair against both match sets
    pub fn is_whitelisted(&self, resource_name: &str, metric_name: &str) -> bool {
        if !self.enabled {
            return true;
        }
        self.resource_matches(resource_name) && self.metric_matches(metric_name)
    }

    /// Check an envelope; the resource may match by name or by resource id
    pub fn is_whitelisted_envelope(&self, envelope: &MetricEnvelope) -> bool {
        if !self.enabled {
            return true;
        }
        let resource_ok = self.resources.is_empty()
            || [envelope.resource_name(), envelope.resource_id()]
                .into_iter()
                .flatten()
                .any(|candidate| self.resource_matches(candidate));
        resource_ok && self.metric_matches(envelope.metric_name().unwrap_or_default())
    }

    fn resource_matches(&self, resource_name: &str) -> bool {
        self.resources.is_empty() || self.resources.contains(&normalize_resource(resource_name))
    }

    fn metric_matches(&self, metric_name: &str) -> bool {
        self.metrics.is_empty() || self.metrics.contains(&normalize_metric(metric_name))
    }
}

fn normalize_resource(name: &str) -> String {
    name.trim().to_lowercase()
}

fn normalize_metric(name: &str) -> String {
    name.chars()
        .filter(|c| !c.is_whitespace())
        .collect::<String>()
        .to_lowercase()
}
