use clap::{Parser, Subcommand};

use std::path::PathBuf;

use super::config::BackendType;
use super::constants::{
    DEFAULT_POLL_INTERVAL_SECS, ENV_ALLOWLIST, ENV_ALLOWLIST_FILE, ENV_BATCH_SIZE,
    ENV_BROKER_BACKEND, ENV_BROKER_URL, ENV_CONFIG, ENV_DEBUG, ENV_GROUP, ENV_INSTANCE,
    ENV_JSON_LOGS, ENV_MAX_BATCHES, ENV_MAX_READ, ENV_ORIGIN, ENV_READ_TIMEOUT_MS, ENV_RETRIES,
    ENV_STREAM_BACKEND, ENV_STREAM_NAME, ENV_STREAM_URL, ENV_TOPIC,
};
use crate::data::stream::CursorOrigin;

#[derive(Parser)]
#[command(name = "metricbridge")]
#[command(version, about = "Stream-to-broker metric bridge", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Path to config file
    #[arg(long, short = 'c', global = true, env = ENV_CONFIG)]
    pub config: Option<PathBuf>,

    /// Enable debug mode (verbose logs and transform counters)
    #[arg(long, global = true, env = ENV_DEBUG)]
    pub debug: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true, env = ENV_JSON_LOGS)]
    pub json_logs: bool,

    // Stream options
    /// Stream backend (memory or redis)
    #[arg(long, global = true, env = ENV_STREAM_BACKEND, value_parser = parse_backend_type)]
    pub stream_backend: Option<BackendType>,

    /// Stream service URL
    #[arg(long, global = true, env = ENV_STREAM_URL)]
    pub stream_url: Option<String>,

    /// Stream name
    #[arg(long, global = true, env = ENV_STREAM_NAME)]
    pub stream_name: Option<String>,

    /// Consumer group name
    #[arg(long, global = true, env = ENV_GROUP)]
    pub group: Option<String>,

    /// Consumer instance name within the group
    #[arg(long, global = true, env = ENV_INSTANCE)]
    pub instance: Option<String>,

    /// Cursor origin when the group has no position (earliest or latest)
    #[arg(long, global = true, env = ENV_ORIGIN, value_parser = parse_origin)]
    pub origin: Option<CursorOrigin>,

    /// Records per fetch
    #[arg(long, global = true, env = ENV_MAX_READ)]
    pub max_read: Option<usize>,

    /// Server-side read timeout in milliseconds
    #[arg(long, global = true, env = ENV_READ_TIMEOUT_MS)]
    pub read_timeout_ms: Option<u64>,

    /// Maximum fetches per invocation
    #[arg(long, global = true, env = ENV_MAX_BATCHES)]
    pub max_batches: Option<usize>,

    // Broker options
    /// Broker backend (memory or redis)
    #[arg(long, global = true, env = ENV_BROKER_BACKEND, value_parser = parse_backend_type)]
    pub broker_backend: Option<BackendType>,

    /// Broker URL
    #[arg(long, global = true, env = ENV_BROKER_URL)]
    pub broker_url: Option<String>,

    /// Destination topic
    #[arg(long, global = true, env = ENV_TOPIC)]
    pub topic: Option<String>,

    /// Producer batch size in bytes
    #[arg(long, global = true, env = ENV_BATCH_SIZE)]
    pub batch_size: Option<usize>,

    /// Flush attempts
    #[arg(long, global = true, env = ENV_RETRIES)]
    pub retries: Option<u32>,

    // Filtering options
    /// Allowed resource names or OCIDs (comma-separated or JSON array)
    #[arg(long, global = true, env = ENV_ALLOWLIST)]
    pub allowlist: Option<String>,

    /// File with one allowed resource name or OCID per line
    #[arg(long, global = true, env = ENV_ALLOWLIST_FILE)]
    pub allowlist_file: Option<PathBuf>,
}

/// Parse backend type from CLI/env string
fn parse_backend_type(s: &str) -> Result<BackendType, String> {
    match s.to_lowercase().as_str() {
        "memory" => Ok(BackendType::Memory),
        "redis" => Ok(BackendType::Redis),
        _ => Err(format!(
            "Invalid backend '{}'. Valid options: memory, redis",
            s
        )),
    }
}

/// Parse cursor origin from CLI/env string
fn parse_origin(s: &str) -> Result<CursorOrigin, String> {
    match s.to_lowercase().as_str() {
        "earliest" | "trim_horizon" => Ok(CursorOrigin::Earliest),
        "latest" => Ok(CursorOrigin::Latest),
        _ => Err(format!(
            "Invalid origin '{}'. Valid options: earliest, latest",
            s
        )),
    }
}

#[derive(Subcommand, Clone, Debug, PartialEq, Eq)]
pub enum Commands {
    /// Run one drain cycle and print the result (default command)
    Run,
    /// Run drain cycles on an interval until interrupted
    Poll {
        /// Seconds between invocations
        #[arg(long, default_value_t = DEFAULT_POLL_INTERVAL_SECS)]
        interval_secs: u64,
    },
    /// Check connectivity of the configured stream and broker
    Check,
}

/// Configuration derived from CLI arguments
#[derive(Debug, Clone, Default)]
pub struct CliConfig {
    pub config: Option<PathBuf>,
    pub debug: bool,
    pub json_logs: bool,
    pub stream_backend: Option<BackendType>,
    pub stream_url: Option<String>,
    pub stream_name: Option<String>,
    pub group: Option<String>,
    pub instance: Option<String>,
    pub origin: Option<CursorOrigin>,
    pub max_read: Option<usize>,
    pub read_timeout_ms: Option<u64>,
    pub max_batches: Option<usize>,
    pub broker_backend: Option<BackendType>,
    pub broker_url: Option<String>,
    pub topic: Option<String>,
    pub batch_size: Option<usize>,
    pub retries: Option<u32>,
    pub allowlist: Option<String>,
    pub allowlist_file: Option<PathBuf>,
}

impl From<Cli> for CliConfig {
    fn from(cli: Cli) -> Self {
        Self {
            config: cli.config,
            debug: cli.debug,
            json_logs: cli.json_logs,
            stream_backend: cli.stream_backend,
            stream_url: cli.stream_url,
            stream_name: cli.stream_name,
            group: cli.group,
            instance: cli.instance,
            origin: cli.origin,
            max_read: cli.max_read,
            read_timeout_ms: cli.read_timeout_ms,
            max_batches: cli.max_batches,
            broker_backend: cli.broker_backend,
            broker_url: cli.broker_url,
            topic: cli.topic,
            batch_size: cli.batch_size,
            retries: cli.retries,
            allowlist: cli.allowlist,
            allowlist_file: cli.allowlist_file,
        }
    }
}

/// Parse CLI arguments and return config with command
pub fn parse() -> (CliConfig, Option<Commands>) {
    let mut cli = Cli::parse();
    let command = cli.command.take();
    (CliConfig::from(cli), command)
}
