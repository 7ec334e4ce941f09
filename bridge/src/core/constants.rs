// =============================================================================
// Application Identity
// =============================================================================

/// Application name in lowercase (for paths and identifiers)
pub const APP_NAME_LOWER: &str = "metricbridge";

/// Unix-style dotfile folder name
pub const APP_DOT_FOLDER: &str = ".metricbridge";

// =============================================================================
// Configuration Files
// =============================================================================

/// Config file name
pub const CONFIG_FILE_NAME: &str = "metricbridge.json";

/// Environment variable for config file path
pub const ENV_CONFIG: &str = "METRICBRIDGE_CONFIG";

// =============================================================================
// Environment Variables - Logging and Debug
// =============================================================================

/// Environment variable for log level/filter
pub const ENV_LOG: &str = "METRICBRIDGE_LOG";

/// Environment variable for debug mode
pub const ENV_DEBUG: &str = "METRICBRIDGE_DEBUG";

/// Environment variable for JSON log output
pub const ENV_JSON_LOGS: &str = "METRICBRIDGE_JSON_LOGS";

// =============================================================================
// Environment Variables - Stream Source
// =============================================================================

pub const ENV_STREAM_BACKEND: &str = "METRICBRIDGE_STREAM_BACKEND";
pub const ENV_STREAM_URL: &str = "METRICBRIDGE_STREAM_URL";
pub const ENV_STREAM_NAME: &str = "METRICBRIDGE_STREAM_NAME";
pub const ENV_GROUP: &str = "METRICBRIDGE_GROUP";
pub const ENV_INSTANCE: &str = "METRICBRIDGE_INSTANCE";
pub const ENV_ORIGIN: &str = "METRICBRIDGE_ORIGIN";

/// Environment variable for records per fetch
pub const ENV_MAX_READ: &str = "METRICBRIDGE_MAX_READ";

pub const ENV_READ_TIMEOUT_MS: &str = "METRICBRIDGE_READ_TIMEOUT_MS";
pub const ENV_MAX_BATCHES: &str = "METRICBRIDGE_MAX_BATCHES";

// =============================================================================
// Environment Variables - Broker
// =============================================================================

pub const ENV_BROKER_BACKEND: &str = "METRICBRIDGE_BROKER_BACKEND";
pub const ENV_BROKER_URL: &str = "METRICBRIDGE_BROKER_URL";
pub const ENV_TOPIC: &str = "METRICBRIDGE_TOPIC";
pub const ENV_BATCH_SIZE: &str = "METRICBRIDGE_BATCH_SIZE";
pub const ENV_RETRIES: &str = "METRICBRIDGE_RETRIES";

// =============================================================================
// Environment Variables - Filtering
// =============================================================================

/// Resource names or OCIDs, comma-separated or a JSON array
pub const ENV_ALLOWLIST: &str = "METRICBRIDGE_ALLOWLIST";

/// File with one resource name or OCID per line
pub const ENV_ALLOWLIST_FILE: &str = "METRICBRIDGE_ALLOWLIST_FILE";

// =============================================================================
// Stream Defaults
// =============================================================================

pub const DEFAULT_STREAM_NAME: &str = "nlb-metrics";
pub const DEFAULT_GROUP: &str = "nlb-metrics-group";
pub const DEFAULT_INSTANCE: &str = "faas-instance-1";
pub const DEFAULT_LIMIT_PER_FETCH: usize = 500;
pub const DEFAULT_READ_TIMEOUT_MS: u64 = 1000;

// =============================================================================
// Broker Defaults
// =============================================================================

pub const DEFAULT_TOPIC: &str = "oci_nlb_metrics";

/// Producer buffer size in bytes before a batch is sent
pub const DEFAULT_BROKER_BATCH_SIZE: usize = 512 * 1024;

/// Flush attempts before giving up
pub const DEFAULT_BROKER_RETRIES: u32 = 3;

// =============================================================================
// Poll Mode
// =============================================================================

/// Default pause between invocations in poll mode
pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 60;
