use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::data::stream::CursorOrigin;
use crate::domain::metrics::{BridgeSettings, WhitelistConfig};
use crate::utils::file::{expand_path, read_list_file};
use crate::utils::string::parse_string_list;

use super::cli::CliConfig;
use super::constants::{
    APP_DOT_FOLDER, CONFIG_FILE_NAME, DEFAULT_BROKER_BATCH_SIZE, DEFAULT_BROKER_RETRIES,
    DEFAULT_GROUP, DEFAULT_INSTANCE, DEFAULT_LIMIT_PER_FETCH, DEFAULT_READ_TIMEOUT_MS,
    DEFAULT_STREAM_NAME, DEFAULT_TOPIC,
};

// =============================================================================
// Backend Enum
// =============================================================================

/// Backend type for the stream source and the broker sink
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendType {
    #[default]
    Memory,
    Redis,
}

impl fmt::Display for BackendType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendType::Memory => write!(f, "memory"),
            BackendType::Redis => write!(f, "redis"),
        }
    }
}

// =============================================================================
// File Config Structs (JSON deserialization)
// =============================================================================

/// Stream source section
#[derive(Debug, Default, Clone, Deserialize)]
pub struct StreamFileConfig {
    pub backend: Option<BackendType>,
    pub url: Option<String>,
    pub name: Option<String>,
    pub group: Option<String>,
    pub instance: Option<String>,
    pub origin: Option<CursorOrigin>,
    pub limit_per_fetch: Option<usize>,
    pub read_timeout_ms: Option<u64>,
    pub max_batches: Option<usize>,
}

/// Broker section
#[derive(Debug, Default, Clone, Deserialize)]
pub struct BrokerFileConfig {
    pub backend: Option<BackendType>,
    pub url: Option<String>,
    pub topic: Option<String>,
    pub batch_size: Option<usize>,
    pub retries: Option<u32>,
}

/// Filtering section
#[derive(Debug, Default, Clone, Deserialize)]
pub struct FilteringFileConfig {
    pub enabled: Option<bool>,
    pub whitelisted_resource_names: Option<Vec<String>>,
    pub whitelisted_metric_names: Option<Vec<String>>,
    pub flatten_output: Option<bool>,
    pub output_fields: Option<Vec<String>>,
}

/// File-based configuration (JSON)
#[derive(Debug, Default, Deserialize)]
pub struct FileConfig {
    pub stream: Option<StreamFileConfig>,
    pub broker: Option<BrokerFileConfig>,
    pub filtering: Option<FilteringFileConfig>,
    pub debug: Option<bool>,
    #[serde(flatten)]
    pub extra: serde_json::Value,
}

/// Overwrite `current` when `other` is set
fn merge_field<T: fmt::Debug>(current: &mut Option<T>, other: Option<T>, field: &str) {
    if other.is_some() {
        tracing::trace!(value = ?other, field, "Merging config field");
        *current = other;
    }
}

impl FileConfig {
    /// Load configuration from a JSON file
    fn load_from_file(path: &Path) -> Result<Self> {
        tracing::debug!(path = %path.display(), "Loading config file");
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let config: Self = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
        tracing::trace!(config = ?config, "Parsed config file");
        Ok(config)
    }

    /// Warn about unknown top-level fields in the config
    fn warn_unknown_fields(&self) {
        if let serde_json::Value::Object(map) = &self.extra
            && !map.is_empty()
        {
            let keys_str: String = map
                .keys()
                .map(|k| k.as_str())
                .collect::<Vec<_>>()
                .join(", ");
            tracing::warn!(
                fields = %keys_str,
                "Unknown fields in config file (possible typos)"
            );
        }
    }

    /// Merge another FileConfig into this one (other takes precedence)
    fn merge(&mut self, other: FileConfig) {
        if let Some(stream) = other.stream {
            let current = self.stream.get_or_insert_with(StreamFileConfig::default);
            merge_field(&mut current.backend, stream.backend, "stream.backend");
            merge_field(&mut current.url, stream.url, "stream.url");
            merge_field(&mut current.name, stream.name, "stream.name");
            merge_field(&mut current.group, stream.group, "stream.group");
            merge_field(&mut current.instance, stream.instance, "stream.instance");
            merge_field(&mut current.origin, stream.origin, "stream.origin");
            merge_field(
                &mut current.limit_per_fetch,
                stream.limit_per_fetch,
                "stream.limit_per_fetch",
            );
            merge_field(
                &mut current.read_timeout_ms,
                stream.read_timeout_ms,
                "stream.read_timeout_ms",
            );
            merge_field(
                &mut current.max_batches,
                stream.max_batches,
                "stream.max_batches",
            );
        }

        if let Some(broker) = other.broker {
            let current = self.broker.get_or_insert_with(BrokerFileConfig::default);
            merge_field(&mut current.backend, broker.backend, "broker.backend");
            merge_field(&mut current.url, broker.url, "broker.url");
            merge_field(&mut current.topic, broker.topic, "broker.topic");
            merge_field(&mut current.batch_size, broker.batch_size, "broker.batch_size");
            merge_field(&mut current.retries, broker.retries, "broker.retries");
        }

        // Lists replace rather than append, so an overlay can narrow the allow-list
        if let Some(filtering) = other.filtering {
            let current = self
                .filtering
                .get_or_insert_with(FilteringFileConfig::default);
            merge_field(&mut current.enabled, filtering.enabled, "filtering.enabled");
            merge_field(
                &mut current.whitelisted_resource_names,
                filtering.whitelisted_resource_names,
                "filtering.whitelisted_resource_names",
            );
            merge_field(
                &mut current.whitelisted_metric_names,
                filtering.whitelisted_metric_names,
                "filtering.whitelisted_metric_names",
            );
            merge_field(
                &mut current.flatten_output,
                filtering.flatten_output,
                "filtering.flatten_output",
            );
            merge_field(
                &mut current.output_fields,
                filtering.output_fields,
                "filtering.output_fields",
            );
        }

        merge_field(&mut self.debug, other.debug, "debug");
    }
}

// =============================================================================
// Resolved Config
// =============================================================================

#[derive(Debug, Clone)]
pub struct StreamConfig {
    pub backend: BackendType,
    pub url: Option<String>,
    pub name: String,
    pub group: String,
    pub instance: String,
    pub origin: CursorOrigin,
    pub limit_per_fetch: usize,
    pub read_timeout_ms: u64,
    pub max_batches: Option<usize>,
}

#[derive(Debug, Clone)]
pub struct BrokerConfig {
    pub backend: BackendType,
    pub url: Option<String>,
    pub topic: String,
    /// Producer buffer size in bytes
    pub batch_size: usize,
    pub retries: u32,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub stream: StreamConfig,
    pub broker: BrokerConfig,
    pub filtering: WhitelistConfig,
    pub debug: bool,
}

impl AppConfig {
    /// Load configuration from all sources
    ///
    /// Priority (lowest to highest):
    /// 1. Defaults
    /// 2. Profile directory config (~/.metricbridge/metricbridge.json)
    /// 3. Local directory config OR CLI-specified config path
    /// 4. CLI arguments (which include env var fallbacks via clap)
    pub fn load(cli: &CliConfig) -> Result<Self> {
        tracing::debug!("Loading application configuration");
        tracing::trace!(cli = ?cli, "CLI config");

        let mut file_config = FileConfig::default();
        let mut found_configs: Vec<String> = Vec::new();

        // 1. Load from profile dir - skip if not exists
        if let Some(profile_path) = get_profile_config_path()
            && profile_path.exists()
        {
            let profile_config = FileConfig::load_from_file(&profile_path)?;
            profile_config.warn_unknown_fields();
            file_config.merge(profile_config);
            found_configs.push(profile_path.display().to_string());
        }

        // 2. Load from CLI-specified path OR local directory
        let overlay_path = if let Some(ref path) = cli.config {
            let expanded = expand_path(&path.to_string_lossy());
            if !expanded.exists() {
                anyhow::bail!("Config file not found: {}", expanded.display());
            }
            Some(expanded)
        } else {
            let local = PathBuf::from(CONFIG_FILE_NAME);
            if local.exists() { Some(local) } else { None }
        };

        if let Some(path) = overlay_path {
            let overlay_config = FileConfig::load_from_file(&path)?;
            overlay_config.warn_unknown_fields();
            file_config.merge(overlay_config);
            found_configs.push(path.display().to_string());
        }

        tracing::debug!(configs = ?found_configs, "Config files loaded");

        // 3. Layer configs: defaults -> file config -> CLI/env overrides
        let file_stream = file_config.stream.unwrap_or_default();
        let file_broker = file_config.broker.unwrap_or_default();
        let file_filtering = file_config.filtering.unwrap_or_default();

        let stream = StreamConfig {
            backend: cli
                .stream_backend
                .or(file_stream.backend)
                .unwrap_or_default(),
            url: cli.stream_url.clone().or(file_stream.url),
            name: cli
                .stream_name
                .clone()
                .or(file_stream.name)
                .unwrap_or_else(|| DEFAULT_STREAM_NAME.to_string()),
            group: cli
                .group
                .clone()
                .or(file_stream.group)
                .unwrap_or_else(|| DEFAULT_GROUP.to_string()),
            instance: cli
                .instance
                .clone()
                .or(file_stream.instance)
                .unwrap_or_else(|| DEFAULT_INSTANCE.to_string()),
            origin: cli.origin.or(file_stream.origin).unwrap_or_default(),
            limit_per_fetch: cli
                .max_read
                .or(file_stream.limit_per_fetch)
                .unwrap_or(DEFAULT_LIMIT_PER_FETCH),
            read_timeout_ms: cli
                .read_timeout_ms
                .or(file_stream.read_timeout_ms)
                .unwrap_or(DEFAULT_READ_TIMEOUT_MS),
            max_batches: cli.max_batches.or(file_stream.max_batches),
        };

        let broker = BrokerConfig {
            backend: cli
                .broker_backend
                .or(file_broker.backend)
                .unwrap_or_default(),
            url: cli.broker_url.clone().or(file_broker.url),
            topic: cli
                .topic
                .clone()
                .or(file_broker.topic)
                .unwrap_or_else(|| DEFAULT_TOPIC.to_string()),
            batch_size: cli
                .batch_size
                .or(file_broker.batch_size)
                .unwrap_or(DEFAULT_BROKER_BATCH_SIZE),
            retries: cli
                .retries
                .or(file_broker.retries)
                .unwrap_or(DEFAULT_BROKER_RETRIES),
        };

        let defaults = WhitelistConfig::default();
        let mut filtering = WhitelistConfig {
            enabled: file_filtering.enabled.unwrap_or(defaults.enabled),
            whitelisted_resource_names: file_filtering
                .whitelisted_resource_names
                .unwrap_or_default(),
            whitelisted_metric_names: file_filtering
                .whitelisted_metric_names
                .unwrap_or_default(),
            flatten_output: file_filtering
                .flatten_output
                .unwrap_or(defaults.flatten_output),
            output_fields: file_filtering.output_fields.unwrap_or_default(),
        };
        apply_allowlist(&mut filtering, cli)?;

        let config = Self {
            stream,
            broker,
            filtering,
            debug: cli.debug || file_config.debug.unwrap_or(false),
        };

        config.validate()?;

        tracing::debug!(
            stream_backend = %config.stream.backend,
            stream = %config.stream.name,
            group = %config.stream.group,
            broker_backend = %config.broker.backend,
            topic = %config.broker.topic,
            resources = config.filtering.whitelisted_resource_names.len(),
            "Configuration loaded"
        );

        Ok(config)
    }

    /// Per-invocation settings for the bridge
    pub fn bridge_settings(&self) -> BridgeSettings {
        BridgeSettings {
            group: self.stream.group.clone(),
            instance: self.stream.instance.clone(),
            origin: self.stream.origin,
            limit_per_fetch: self.stream.limit_per_fetch,
            read_timeout: Duration::from_millis(self.stream.read_timeout_ms),
            max_batches: self.stream.max_batches,
            topic: self.broker.topic.clone(),
            debug: self.debug,
        }
    }

    /// Validate the configuration for consistency and correctness
    fn validate(&self) -> Result<()> {
        if self.stream.name.trim().is_empty() {
            anyhow::bail!("Configuration error: stream.name must not be empty");
        }
        if self.stream.group.trim().is_empty() {
            anyhow::bail!("Configuration error: stream.group must not be empty");
        }
        if self.stream.limit_per_fetch == 0 {
            anyhow::bail!("Configuration error: stream.limit_per_fetch must be greater than 0");
        }
        if self.stream.read_timeout_ms == 0 {
            anyhow::bail!("Configuration error: stream.read_timeout_ms must be greater than 0");
        }
        if self.stream.max_batches == Some(0) {
            anyhow::bail!("Configuration error: stream.max_batches must be greater than 0");
        }
        if self.stream.backend == BackendType::Redis
            && self.stream.url.as_deref().is_none_or(str::is_empty)
        {
            anyhow::bail!(
                "Configuration error: stream.url is required when stream.backend is 'redis'"
            );
        }

        if self.broker.topic.trim().is_empty() {
            anyhow::bail!("Configuration error: broker.topic must not be empty");
        }
        if self.broker.batch_size == 0 {
            anyhow::bail!("Configuration error: broker.batch_size must be greater than 0");
        }
        if self.broker.backend == BackendType::Redis
            && self.broker.url.as_deref().is_none_or(str::is_empty)
        {
            anyhow::bail!(
                "Configuration error: broker.url is required when broker.backend is 'redis'"
            );
        }

        Ok(())
    }
}

/// Append allow-list entries from the CLI/env value and the allow-list file
fn apply_allowlist(filtering: &mut WhitelistConfig, cli: &CliConfig) -> Result<()> {
    let mut extra = Vec::new();

    if let Some(ref raw) = cli.allowlist {
        extra.extend(parse_string_list(raw));
    }

    if let Some(ref path) = cli.allowlist_file {
        let expanded = expand_path(&path.to_string_lossy());
        if expanded.exists() {
            let entries = read_list_file(&expanded).with_context(|| {
                format!("Failed to read allow-list file: {}", expanded.display())
            })?;
            tracing::debug!(path = %expanded.display(), count = entries.len(), "Loaded allow-list file");
            extra.extend(entries);
        } else {
            tracing::warn!(path = %expanded.display(), "Allow-list file not found, ignoring");
        }
    }

    for entry in extra {
        if !filtering.whitelisted_resource_names.contains(&entry) {
            filtering.whitelisted_resource_names.push(entry);
        }
    }

    Ok(())
}

/// Get the profile config path (~/.metricbridge/metricbridge.json)
fn get_profile_config_path() -> Option<PathBuf> {
    dirs::home_dir().map(|h| h.join(APP_DOT_FOLDER).join(CONFIG_FILE_NAME))
}
