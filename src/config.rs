//! TPS aggregation configuration
//!
//! Loaded once at startup and passed by reference into every component.
//! Sources, in order: JSON file (`TPS_CONFIG_FILE`), `TPS_*` environment
//! overrides, then validation.

use serde::Deserialize;
use std::env;
use std::fs;
use std::path::Path;
use std::str::FromStr;

#[derive(Debug)]
pub enum ConfigError {
    InvalidValue(String),
    File(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::InvalidValue(msg) => write!(f, "Invalid configuration value: {}", msg),
            ConfigError::File(msg) => write!(f, "Configuration file error: {}", msg),
        }
    }
}

impl std::error::Error for ConfigError {}

/// A metrics table column and the record field it carries
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricsColumn {
    Start,
    End,
    Txs,
    Blocks,
    Tps,
    Tpm,
    Kind,
}

impl MetricsColumn {
    pub const ALL: [MetricsColumn; 7] = [
        MetricsColumn::Start,
        MetricsColumn::End,
        MetricsColumn::Txs,
        MetricsColumn::Blocks,
        MetricsColumn::Tps,
        MetricsColumn::Tpm,
        MetricsColumn::Kind,
    ];

    /// Natural key of a metrics row
    pub const KEY: [MetricsColumn; 3] = [MetricsColumn::Start, MetricsColumn::End, MetricsColumn::Kind];

    pub fn as_str(&self) -> &'static str {
        match self {
            MetricsColumn::Start => "start",
            MetricsColumn::End => "end",
            MetricsColumn::Txs => "txs",
            MetricsColumn::Blocks => "blocks",
            MetricsColumn::Tps => "tps",
            MetricsColumn::Tpm => "tpm",
            MetricsColumn::Kind => "type",
        }
    }
}

impl FromStr for MetricsColumn {
    type Err = ConfigError;

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        MetricsColumn::ALL
            .into_iter()
            .find(|c| c.as_str() == name)
            .ok_or_else(|| ConfigError::InvalidValue(format!("unknown metrics column '{}'", name)))
    }
}

/// What the follow loop does when a tick fails
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FollowFailurePolicy {
    /// Stop the follow loop and surface the error to the process owner
    Fatal,
    /// Log, keep the high-water mark, and re-cover the same span next tick
    RetryNextTick,
}

impl FromStr for FollowFailurePolicy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "fatal" => Ok(FollowFailurePolicy::Fatal),
            "retry_next_tick" => Ok(FollowFailurePolicy::RetryNextTick),
            _ => Err(ConfigError::InvalidValue(format!("unknown follow failure policy '{}'", s))),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TpsConfig {
    /// Path to SQLite database file
    pub db_path: String,

    /// Aggregation window width in seconds
    pub interval_secs: i64,

    /// Follow-mode timer cadence in seconds
    pub scan_interval_secs: u64,

    /// Backfill/follow switchover threshold in seconds
    pub batch_limit_secs: i64,

    /// Backfill chunk width in seconds
    pub batch_day_interval_secs: i64,

    /// Max sub-window queries in flight at once
    pub max_query_concurrency: usize,

    /// Max rows per insert statement
    pub max_insert_batch_size: usize,

    pub table_name: String,
    pub table_columns: Vec<String>,
    pub confirmed_table: String,
    pub unconfirmed_table: String,

    /// Category tag written into the `type` column
    pub metric_kind: i64,

    /// Anchor on this confirmed height instead of the earliest block
    pub baseline_height: Option<i64>,

    pub follow_failure_policy: FollowFailurePolicy,
}

impl Default for TpsConfig {
    fn default() -> Self {
        Self {
            db_path: "/var/lib/tps/chain.db".to_string(),
            interval_secs: 60,
            scan_interval_secs: 5 * 60,
            batch_limit_secs: 10 * 60,
            batch_day_interval_secs: 24 * 3600,
            max_query_concurrency: 20,
            max_insert_batch_size: 200,
            table_name: "tps_0".to_string(),
            table_columns: MetricsColumn::ALL.iter().map(|c| c.as_str().to_string()).collect(),
            confirmed_table: "blocks_0".to_string(),
            unconfirmed_table: "blocks_unconfirmed".to_string(),
            metric_kind: 1,
            baseline_height: None,
            follow_failure_policy: FollowFailurePolicy::Fatal,
        }
    }
}

impl TpsConfig {
    /// Load configuration from `TPS_CONFIG_FILE` (if set) and environment variables
    ///
    /// Environment variables:
    /// - `TPS_CONFIG_FILE` - JSON file with any of the fields below (optional)
    /// - `TPS_DB_PATH` (default: /var/lib/tps/chain.db)
    /// - `TPS_INTERVAL_SECS` (default: 60)
    /// - `TPS_SCAN_INTERVAL_SECS` (default: 300)
    /// - `TPS_BATCH_LIMIT_SECS` (default: 600)
    /// - `TPS_BATCH_DAY_INTERVAL_SECS` (default: 86400)
    /// - `TPS_MAX_QUERY_CONCURRENCY` (default: 20)
    /// - `TPS_MAX_INSERT_BATCH_SIZE` (default: 200)
    /// - `TPS_TABLE_NAME` (default: tps_0)
    /// - `TPS_TABLE_COLUMNS` comma-separated (default: start,end,txs,blocks,tps,tpm,type)
    /// - `TPS_CONFIRMED_TABLE` (default: blocks_0)
    /// - `TPS_UNCONFIRMED_TABLE` (default: blocks_unconfirmed)
    /// - `TPS_METRIC_KIND` (default: 1)
    /// - `TPS_BASELINE_HEIGHT` (default: unset, earliest block)
    /// - `TPS_FOLLOW_FAILURE_POLICY` fatal | retry_next_tick (default: fatal)
    pub fn load() -> Result<Self, ConfigError> {
        let base = match env::var("TPS_CONFIG_FILE") {
            Ok(path) => Self::from_json_file(path)?,
            Err(_) => Self::default(),
        };
        base.with_overrides(|key| env::var(key).ok())
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let json = fs::read_to_string(path)
            .map_err(|e| ConfigError::File(format!("{}: {}", path.display(), e)))?;
        serde_json::from_str(&json)
            .map_err(|e| ConfigError::File(format!("{}: {}", path.display(), e)))
    }

    /// Apply `TPS_*` overrides from `lookup`, then validate
    pub fn with_overrides<F>(mut self, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("TPS_DB_PATH") {
            self.db_path = v;
        }
        if let Some(v) = parse_var(&lookup, "TPS_INTERVAL_SECS")? {
            self.interval_secs = v;
        }
        if let Some(v) = parse_var(&lookup, "TPS_SCAN_INTERVAL_SECS")? {
            self.scan_interval_secs = v;
        }
        if let Some(v) = parse_var(&lookup, "TPS_BATCH_LIMIT_SECS")? {
            self.batch_limit_secs = v;
        }
        if let Some(v) = parse_var(&lookup, "TPS_BATCH_DAY_INTERVAL_SECS")? {
            self.batch_day_interval_secs = v;
        }
        if let Some(v) = parse_var(&lookup, "TPS_MAX_QUERY_CONCURRENCY")? {
            self.max_query_concurrency = v;
        }
        if let Some(v) = parse_var(&lookup, "TPS_MAX_INSERT_BATCH_SIZE")? {
            self.max_insert_batch_size = v;
        }
        if let Some(v) = lookup("TPS_TABLE_NAME") {
            self.table_name = v;
        }
        if let Some(v) = lookup("TPS_TABLE_COLUMNS") {
            self.table_columns = v
                .split(',')
                .map(|c| c.trim().to_string())
                .filter(|c| !c.is_empty())
                .collect();
        }
        if let Some(v) = lookup("TPS_CONFIRMED_TABLE") {
            self.confirmed_table = v;
        }
        if let Some(v) = lookup("TPS_UNCONFIRMED_TABLE") {
            self.unconfirmed_table = v;
        }
        if let Some(v) = parse_var(&lookup, "TPS_METRIC_KIND")? {
            self.metric_kind = v;
        }
        if let Some(v) = parse_var(&lookup, "TPS_BASELINE_HEIGHT")? {
            self.baseline_height = Some(v);
        }
        if let Some(v) = lookup("TPS_FOLLOW_FAILURE_POLICY") {
            self.follow_failure_policy = v.trim().parse()?;
        }

        self.validate()?;
        Ok(self)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.interval_secs <= 0 {
            return Err(ConfigError::InvalidValue("interval_secs must be > 0".to_string()));
        }
        if self.scan_interval_secs == 0 {
            return Err(ConfigError::InvalidValue("scan_interval_secs must be > 0".to_string()));
        }
        if self.batch_limit_secs < 0 {
            return Err(ConfigError::InvalidValue("batch_limit_secs must be >= 0".to_string()));
        }
        if self.batch_day_interval_secs <= 0 || self.batch_day_interval_secs % self.interval_secs != 0 {
            return Err(ConfigError::InvalidValue(format!(
                "batch_day_interval_secs ({}) must be a positive multiple of interval_secs ({})",
                self.batch_day_interval_secs, self.interval_secs
            )));
        }
        if self.max_query_concurrency == 0 {
            return Err(ConfigError::InvalidValue("max_query_concurrency must be >= 1".to_string()));
        }
        if self.max_insert_batch_size == 0 {
            return Err(ConfigError::InvalidValue("max_insert_batch_size must be >= 1".to_string()));
        }

        for table in [&self.table_name, &self.confirmed_table, &self.unconfirmed_table] {
            if !is_identifier(table) {
                return Err(ConfigError::InvalidValue(format!("invalid table name '{}'", table)));
            }
        }

        let columns = self.metrics_columns()?;
        for key in MetricsColumn::KEY {
            if !columns.contains(&key) {
                return Err(ConfigError::InvalidValue(format!(
                    "table_columns must include key column '{}'",
                    key.as_str()
                )));
            }
        }

        Ok(())
    }

    /// `table_columns` parsed into the column vocabulary, in configured order
    pub fn metrics_columns(&self) -> Result<Vec<MetricsColumn>, ConfigError> {
        self.table_columns.iter().map(|name| name.parse()).collect()
    }
}

fn parse_var<F, T>(lookup: &F, key: &str) -> Result<Option<T>, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::InvalidValue(format!("{}: cannot parse '{}'", key, raw))),
        None => Ok(None),
    }
}

fn is_identifier(name: &str) -> bool {
    !name.is_empty() && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}
