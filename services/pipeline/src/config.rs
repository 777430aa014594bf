//! Pipeline configuration.

use anyhow::{anyhow, Context, Result};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::env;
use std::fs;
use std::path::Path;

use ingestion::{IngestOptions, StationDirectory};
use storage::ObjectStorageConfig;

/// Top-level pipeline configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Object storage holding the raw files
    #[serde(default)]
    pub storage: ObjectStorageConfig,

    /// PostgreSQL URL; without one the pipeline runs against an in-memory store
    #[serde(default)]
    pub database_url: Option<String>,

    /// Key prefix listed for raw files
    #[serde(default)]
    pub raw_prefix: String,

    /// Extension a key must end with to be ingested
    #[serde(default = "default_file_extension")]
    pub file_extension: String,

    /// IANA zone of per-line local times
    #[serde(default = "default_source_timezone")]
    pub source_timezone: String,

    /// Key token → station id, for files that carry no station id
    #[serde(default = "default_stations")]
    pub stations: BTreeMap<String, String>,

    /// Seconds between liveness beats
    #[serde(default = "default_heartbeat_interval_secs")]
    pub heartbeat_interval_secs: u64,
}

fn default_file_extension() -> String {
    ".jsonl".to_string()
}

fn default_source_timezone() -> String {
    "Europe/Paris".to_string()
}

fn default_stations() -> BTreeMap<String, String> {
    BTreeMap::from([
        ("ichtegem".to_string(), "IICHTE19".to_string()),
        ("madeleine".to_string(), "ILAMAD25".to_string()),
    ])
}

fn default_heartbeat_interval_secs() -> u64 {
    20
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            storage: ObjectStorageConfig::default(),
            database_url: None,
            raw_prefix: String::new(),
            file_extension: default_file_extension(),
            source_timezone: default_source_timezone(),
            stations: default_stations(),
            heartbeat_interval_secs: default_heartbeat_interval_secs(),
        }
    }
}

impl PipelineConfig {
    /// Load configuration from a YAML file, expanding `${VAR}` references.
    pub fn from_yaml<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read pipeline config from {:?}", path))?;
        Self::from_yaml_str(&content)
            .with_context(|| format!("Failed to parse pipeline config from {:?}", path))
    }

    fn from_yaml_str(content: &str) -> Result<Self> {
        let expanded =
            shellexpand::env(content).context("Failed to expand environment variables")?;
        let config: Self = serde_yaml::from_str(&expanded)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self> {
        let defaults = ObjectStorageConfig::default();
        let storage = ObjectStorageConfig {
            endpoint: env::var("S3_ENDPOINT").unwrap_or(defaults.endpoint),
            bucket: env::var("S3_BUCKET").unwrap_or(defaults.bucket),
            access_key_id: env::var("S3_ACCESS_KEY").unwrap_or(defaults.access_key_id),
            secret_access_key: env::var("S3_SECRET_KEY").unwrap_or(defaults.secret_access_key),
            region: env::var("S3_REGION").unwrap_or(defaults.region),
            allow_http: env::var("S3_ALLOW_HTTP")
                .map(|v| v == "true")
                .unwrap_or(defaults.allow_http),
            local_root: env::var("RAW_LOCAL_ROOT").ok().filter(|v| !v.is_empty()),
            max_retries: parse_var("S3_MAX_RETRIES")?.unwrap_or(defaults.max_retries),
        };

        let stations = match env::var("STATIONS") {
            Ok(list) => parse_stations(&list)?,
            Err(_) => default_stations(),
        };

        let config = Self {
            storage,
            database_url: env::var("DATABASE_URL").ok().filter(|v| !v.is_empty()),
            raw_prefix: env::var("RAW_PREFIX").unwrap_or_default(),
            file_extension: env::var("RAW_FILE_EXTENSION")
                .unwrap_or_else(|_| default_file_extension()),
            source_timezone: env::var("SOURCE_TIMEZONE")
                .unwrap_or_else(|_| default_source_timezone()),
            stations,
            heartbeat_interval_secs: parse_var("HEARTBEAT_INTERVAL_SECS")?
                .unwrap_or_else(default_heartbeat_interval_secs),
        };
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        self.timezone()?;
        if self.heartbeat_interval_secs == 0 {
            return Err(anyhow!("heartbeat_interval_secs must be positive"));
        }
        if self.storage.bucket.is_empty() && self.storage.local_root.is_none() {
            return Err(anyhow!("storage.bucket cannot be empty"));
        }
        Ok(())
    }

    pub fn timezone(&self) -> Result<Tz> {
        self.source_timezone
            .parse::<Tz>()
            .map_err(|e| anyhow!("Invalid source_timezone {:?}: {}", self.source_timezone, e))
    }

    pub fn station_directory(&self) -> StationDirectory {
        StationDirectory::from_map(&self.stations)
    }

    pub fn ingest_options(&self) -> IngestOptions {
        IngestOptions {
            prefix: self.raw_prefix.clone(),
            extension: self.file_extension.clone(),
        }
    }
}

fn parse_var<T: std::str::FromStr>(name: &str) -> Result<Option<T>>
where
    T::Err: std::fmt::Display,
{
    match env::var(name) {
        Ok(value) => value
            .parse()
            .map(Some)
            .map_err(|e| anyhow!("Invalid {}={:?}: {}", name, value, e)),
        Err(_) => Ok(None),
    }
}

/// Parse `token=station,token=station`.
fn parse_stations(list: &str) -> Result<BTreeMap<String, String>> {
    list.split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(|entry| {
            entry
                .split_once('=')
                .map(|(token, station)| (token.trim().to_string(), station.trim().to_string()))
                .ok_or_else(|| anyhow!("Invalid station mapping {:?}, expected token=id", entry))
        })
        .collect()
}
