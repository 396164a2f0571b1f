use std::str::FromStr;

use crate::error::{AppError, Result};

pub const NEO_FEED_URL: &str = "https://api.nasa.gov/neo/rest/v1/feed";
pub const ATHENA_ENDPOINT: &str = "https://athena.us-east-1.amazonaws.com";
pub const S3_ENDPOINT: &str = "https://s3.amazonaws.com";

/// Delay between two state checks of a running query (seconds).
pub const QUERY_POLL_INTERVAL_SECS: u64 = 1;

/// The ingest window covers today and the six days before it.
pub const INGEST_WINDOW_DAYS: i64 = 7;

/// Timeout applied to every outbound HTTP request (seconds).
pub const HTTP_TIMEOUT_SECS: u64 = 30;

/// Channel capacity for run records headed to the ledger writer.
pub const CHANNEL_CAPACITY: usize = 256;

/// External table holding the raw flattened rows.
pub const RAW_TABLE: &str = "neo_raw_data";

/// Object key prefixes.
pub mod keys {
    pub const RAW_PREFIX: &str = "neo";
    pub const SUMMARY_PREFIX: &str = "neo/transformed";
}

/// How the summarize sequence scopes the rows it aggregates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SummaryStrategy {
    /// Query the existing table, filtering to a trailing 7-day window in SQL.
    RollingWindow,
    /// Register the table over the reference date's partition, then query it unfiltered.
    RegisterPartition,
}

impl FromStr for SummaryStrategy {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "rolling_window" | "rolling" => Ok(SummaryStrategy::RollingWindow),
            "register_partition" | "partition" => Ok(SummaryStrategy::RegisterPartition),
            other => Err(AppError::Config(format!(
                "SUMMARY_STRATEGY must be rolling_window or register_partition, got {other:?}"
            ))),
        }
    }
}

impl std::fmt::Display for SummaryStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SummaryStrategy::RollingWindow => write!(f, "rolling_window"),
            SummaryStrategy::RegisterPartition => write!(f, "register_partition"),
        }
    }
}

/// CSV output flavour.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CsvMode {
    /// Quote values containing a delimiter, quote or newline.
    Quoted,
    /// Bare comma join, byte-compatible with the legacy exporter.
    Legacy,
}

impl FromStr for CsvMode {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "quoted" => Ok(CsvMode::Quoted),
            "legacy" => Ok(CsvMode::Legacy),
            other => Err(AppError::Config(format!(
                "CSV_MODE must be quoted or legacy, got {other:?}"
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageBackend {
    S3,
    Local,
}

impl FromStr for StorageBackend {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "s3" => Ok(StorageBackend::S3),
            "local" => Ok(StorageBackend::Local),
            other => Err(AppError::Config(format!(
                "STORAGE_BACKEND must be s3 or local, got {other:?}"
            ))),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    /// NeoWs API key (API_KEY). Required by the ingest sequence.
    pub api_key: Option<String>,
    /// Destination bucket (BUCKET_NAME). Required by both sequences.
    pub bucket: Option<String>,
    /// Catalog database (DATA_BASE_NAME). Required by the summarize sequence.
    pub database: Option<String>,
    pub feed_url: String,
    pub athena_endpoint: String,
    pub athena_workgroup: Option<String>,
    pub athena_output_location: Option<String>,
    pub storage_backend: StorageBackend,
    pub s3_endpoint: String,
    pub local_storage_root: String,
    pub summary_strategy: SummaryStrategy,
    pub csv_mode: CsvMode,
    pub log_level: String,
    pub db_path: String,
    pub api_port: u16,
    /// Seconds between scheduled ingest runs; 0 disables the schedule.
    pub ingest_interval_secs: u64,
    /// Seconds between scheduled summarize runs; 0 disables the schedule.
    pub summary_interval_secs: u64,
    /// Deadline for a whole run; 0 means no deadline.
    pub run_timeout_secs: u64,
}

/// Settings the ingest sequence cannot run without.
#[derive(Debug, Clone)]
pub struct IngestSettings {
    pub api_key: String,
    pub bucket: String,
}

/// Settings the summarize sequence cannot run without.
#[derive(Debug, Clone)]
pub struct SummarizeSettings {
    pub bucket: String,
    pub database: String,
    pub strategy: SummaryStrategy,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            api_key: non_empty_var("API_KEY"),
            bucket: non_empty_var("BUCKET_NAME"),
            database: non_empty_var("DATA_BASE_NAME"),
            feed_url: std::env::var("NEO_FEED_URL").unwrap_or_else(|_| NEO_FEED_URL.to_string()),
            athena_endpoint: std::env::var("ATHENA_ENDPOINT")
                .unwrap_or_else(|_| ATHENA_ENDPOINT.to_string()),
            athena_workgroup: non_empty_var("ATHENA_WORKGROUP"),
            athena_output_location: non_empty_var("ATHENA_OUTPUT_LOCATION"),
            storage_backend: std::env::var("STORAGE_BACKEND")
                .unwrap_or_else(|_| "s3".to_string())
                .parse()?,
            s3_endpoint: std::env::var("S3_ENDPOINT").unwrap_or_else(|_| S3_ENDPOINT.to_string()),
            local_storage_root: std::env::var("LOCAL_STORAGE_ROOT")
                .unwrap_or_else(|_| "./objects".to_string()),
            summary_strategy: std::env::var("SUMMARY_STRATEGY")
                .unwrap_or_else(|_| "rolling_window".to_string())
                .parse()?,
            csv_mode: std::env::var("CSV_MODE")
                .unwrap_or_else(|_| "quoted".to_string())
                .parse()?,
            log_level: std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            db_path: std::env::var("DB_PATH").unwrap_or_else(|_| "neo-etl.db".to_string()),
            api_port: std::env::var("API_PORT")
                .unwrap_or_else(|_| "3000".to_string())
                .parse::<u16>()
                .map_err(|_| AppError::Config("API_PORT must be a valid port number".to_string()))?,
            ingest_interval_secs: parse_secs("INGEST_INTERVAL_SECS", "0")?,
            summary_interval_secs: parse_secs("SUMMARY_INTERVAL_SECS", "0")?,
            run_timeout_secs: parse_secs("RUN_TIMEOUT_SECS", "0")?,
        })
    }

    /// Check the ingest sequence's required settings. Called before any network I/O.
    pub fn ingest_settings(&self) -> Result<IngestSettings> {
        Ok(IngestSettings {
            api_key: required(&self.api_key, "API_KEY")?,
            bucket: required(&self.bucket, "BUCKET_NAME")?,
        })
    }

    /// Check the summarize sequence's required settings. Called before any network I/O.
    pub fn summarize_settings(&self) -> Result<SummarizeSettings> {
        Ok(SummarizeSettings {
            bucket: required(&self.bucket, "BUCKET_NAME")?,
            database: required(&self.database, "DATA_BASE_NAME")?,
            strategy: self.summary_strategy,
        })
    }
}

fn non_empty_var(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parse_secs(name: &str, default: &str) -> Result<u64> {
    std::env::var(name)
        .unwrap_or_else(|_| default.to_string())
        .parse::<u64>()
        .map_err(|_| AppError::Config(format!("{name} must be a whole number of seconds")))
}

fn required(value: &Option<String>, name: &str) -> Result<String> {
    value
        .clone()
        .ok_or_else(|| AppError::Config(format!("Missing {name} environment variable")))
}

#[cfg(test)]
pub(crate) fn test_config() -> Config {
    Config {
        api_key: Some("DEMO_KEY".to_string()),
        bucket: Some("neo-bucket".to_string()),
        database: Some("neo_db".to_string()),
        feed_url: NEO_FEED_URL.to_string(),
        athena_endpoint: ATHENA_ENDPOINT.to_string(),
        athena_workgroup: None,
        athena_output_location: None,
        storage_backend: StorageBackend::Local,
        s3_endpoint: S3_ENDPOINT.to_string(),
        local_storage_root: "./objects".to_string(),
        summary_strategy: SummaryStrategy::RollingWindow,
        csv_mode: CsvMode::Quoted,
        log_level: "info".to_string(),
        db_path: ":memory:".to_string(),
        api_port: 3000,
        ingest_interval_secs: 0,
        summary_interval_secs: 0,
        run_timeout_secs: 0,
    }
}
