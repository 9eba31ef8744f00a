//! Configuration type definitions.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

/// Root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Store rows are read from.
    pub source: StoreConfig,

    /// Store rows are written to.
    pub destination: StoreConfig,

    /// Replication behavior configuration.
    #[serde(default)]
    pub clone: CloneConfig,

    /// Where the entity lists live.
    #[serde(default)]
    pub entities: EntitiesConfig,

    /// Schema extraction configuration.
    #[serde(default)]
    pub schema: SchemaConfig,

    /// Log sink configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Connection settings for one PostgREST endpoint.
#[derive(Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Project base URL, e.g. `https://abc.supabase.co`.
    pub url: String,

    /// API key (sent as `apikey` and bearer token).
    pub key: String,

    /// Exposed schema (default: "public").
    #[serde(default = "default_public_schema")]
    pub schema: String,

    /// Per-request timeout in seconds (default: 60).
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl StoreConfig {
    pub fn new(url: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            key: key.into(),
            schema: default_public_schema(),
            timeout_secs: default_timeout_secs(),
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl fmt::Debug for StoreConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoreConfig")
            .field("url", &self.url)
            .field("key", &"[REDACTED]")
            .field("schema", &self.schema)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

/// Replication behavior configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CloneConfig {
    /// Rows fetched per page (default: 50).
    #[serde(default = "default_page_size")]
    pub page_size: usize,

    /// Rows per remote write; must be smaller than `page_size` (default: 20).
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    /// Attempts per governed remote call (default: 5).
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Delay before the first retry in milliseconds (default: 2000).
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,

    /// Growth factor applied to the delay per attempt (default: 1.5).
    #[serde(default = "default_backoff_factor")]
    pub backoff_factor: f64,

    /// Fail an entity when its destination cannot be cleared (default: false).
    #[serde(default)]
    pub require_clean_destination: bool,

    /// Explicit conflict column per entity, tried before the heuristic list.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub conflict_keys: BTreeMap<String, String>,
}

impl Default for CloneConfig {
    fn default() -> Self {
        Self {
            page_size: default_page_size(),
            chunk_size: default_chunk_size(),
            max_attempts: default_max_attempts(),
            retry_delay_ms: default_retry_delay_ms(),
            backoff_factor: default_backoff_factor(),
            require_clean_destination: false,
            conflict_keys: BTreeMap::new(),
        }
    }
}

impl CloneConfig {
    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }
}

/// Locations of the comma-separated entity lists.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntitiesConfig {
    #[serde(default = "default_tables_file")]
    pub tables_file: PathBuf,

    #[serde(default = "default_views_file")]
    pub views_file: PathBuf,
}

impl Default for EntitiesConfig {
    fn default() -> Self {
        Self {
            tables_file: default_tables_file(),
            views_file: default_views_file(),
        }
    }
}

/// A column declared by hand.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnDef {
    pub name: String,
    pub r#type: String,
}

/// Schema extraction configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchemaConfig {
    /// Rows sampled per entity when inferring (default: 10).
    #[serde(default = "default_sample_size")]
    pub sample_size: usize,

    /// Forced column types: entity -> column -> type.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub overrides: BTreeMap<String, BTreeMap<String, String>>,

    /// Hand-written column lists, used ahead of catalog and sampling.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub manual: BTreeMap<String, Vec<ColumnDef>>,
}

impl Default for SchemaConfig {
    fn default() -> Self {
        Self {
            sample_size: default_sample_size(),
            overrides: BTreeMap::new(),
            manual: BTreeMap::new(),
        }
    }
}

/// Log sink configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Directory for dated error logs (default: "logs").
    #[serde(default = "default_log_dir")]
    pub dir: PathBuf,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            dir: default_log_dir(),
        }
    }
}

// Default value functions for serde
fn default_public_schema() -> String {
    "public".to_string()
}

fn default_timeout_secs() -> u64 {
    60
}

fn default_page_size() -> usize {
    50
}

fn default_chunk_size() -> usize {
    20
}

fn default_max_attempts() -> u32 {
    5
}

fn default_retry_delay_ms() -> u64 {
    2000
}

fn default_backoff_factor() -> f64 {
    1.5
}

fn default_tables_file() -> PathBuf {
    PathBuf::from("supabase_tables.txt")
}

fn default_views_file() -> PathBuf {
    PathBuf::from("supabase_views.txt")
}

fn default_sample_size() -> usize {
    10
}

fn default_log_dir() -> PathBuf {
    PathBuf::from("logs")
}
