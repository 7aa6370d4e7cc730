//! Configuration types for lotgate

use rust_decimal::Decimal;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::PathBuf;

use crate::risk::RiskLimits;

/// Root configuration structure
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub engine: EngineConfig,
    #[serde(default)]
    pub feed: FeedConfig,
    pub execution: ExecutionConfig,
    pub risk: RiskLimits,
    #[serde(default)]
    pub journal: JournalConfig,
    pub telemetry: TelemetryConfig,
    #[serde(default)]
    pub strategies: HashMap<String, StrategySpec>,
}

/// Engine configuration
#[derive(Debug, Clone, Deserialize)]
pub struct EngineConfig {
    /// Starting portfolio equity
    pub initial_capital: Decimal,
    /// Directory containing historical OHLC CSV files
    pub data_dir: PathBuf,
    /// Seconds between live trading cycles
    #[serde(default = "default_tick_interval")]
    pub tick_interval_secs: u64,
    /// History interval loaded per tick (e.g. "hour")
    #[serde(default = "default_history_interval")]
    pub history_interval: String,
    /// Days of history loaded per tick
    #[serde(default = "default_history_days")]
    pub history_days: u32,
}

/// Price feed configuration
#[derive(Debug, Clone, Deserialize)]
pub struct FeedConfig {
    /// TTL for cached live prices (seconds)
    #[serde(default = "default_cache_ttl")]
    pub cache_ttl_secs: f64,
    /// TTL for cached history series (seconds)
    #[serde(default = "default_history_ttl")]
    pub history_ttl_secs: f64,
    /// How long to wait for a streamed price before falling back (seconds)
    #[serde(default = "default_stream_timeout")]
    pub stream_timeout_secs: f64,
    /// Capacity of the streamed-tick queue; full queues drop updates
    #[serde(default = "default_queue_size")]
    pub queue_size: usize,
    /// Query the public MOEX ISS endpoint as the REST price source
    #[serde(default)]
    pub iss_enabled: bool,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            cache_ttl_secs: default_cache_ttl(),
            history_ttl_secs: default_history_ttl(),
            stream_timeout_secs: default_stream_timeout(),
            queue_size: default_queue_size(),
            iss_enabled: false,
        }
    }
}

/// Execution mode: dry-run (no broker), sandbox or live
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionMode {
    DryRun,
    Sandbox,
    Live,
}

/// Order gateway configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ExecutionConfig {
    pub mode: ExecutionMode,
    /// Slippage applied to limit prices, in basis points
    #[serde(default = "default_slippage_bps")]
    pub slippage_bps: Decimal,
    /// Maximum submission attempts per order
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

/// Execution journal configuration
#[derive(Debug, Clone, Deserialize)]
pub struct JournalConfig {
    /// JSON-lines output path
    #[serde(default = "default_journal_path")]
    pub path: PathBuf,
    /// Buffered events before an implicit flush
    #[serde(default = "default_flush_threshold")]
    pub flush_threshold: usize,
}

impl Default for JournalConfig {
    fn default() -> Self {
        Self {
            path: default_journal_path(),
            flush_threshold: default_flush_threshold(),
        }
    }
}

/// Telemetry configuration
#[derive(Debug, Clone, Deserialize)]
pub struct TelemetryConfig {
    /// Prometheus exporter port; 0 disables the exporter
    #[serde(default)]
    pub metrics_port: u16,
    pub log_level: String,
}

/// Per-strategy wiring: which symbols it trades and whether it starts enabled
#[derive(Debug, Clone, Deserialize)]
pub struct StrategySpec {
    pub symbols: Vec<String>,
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Fast SMA window for the built-in crossover
    #[serde(default = "default_fast_window")]
    pub fast_window: usize,
    /// Slow SMA window for the built-in crossover
    #[serde(default = "default_slow_window")]
    pub slow_window: usize,
}

fn default_true() -> bool {
    true
}
fn default_tick_interval() -> u64 {
    60
}
fn default_history_interval() -> String {
    "hour".to_string()
}
fn default_history_days() -> u32 {
    90
}
fn default_cache_ttl() -> f64 {
    5.0
}
fn default_history_ttl() -> f64 {
    300.0
}
fn default_stream_timeout() -> f64 {
    2.0
}
fn default_queue_size() -> usize {
    1000
}
fn default_slippage_bps() -> Decimal {
    Decimal::new(5, 0)
}
fn default_max_retries() -> u32 {
    3
}
fn default_journal_path() -> PathBuf {
    PathBuf::from("results/journal.jsonl")
}
fn default_flush_threshold() -> usize {
    256
}
fn default_fast_window() -> usize {
    10
}
fn default_slow_window() -> usize {
    30
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// Risk limits are validated here; an unparseable or inconsistent limits
    /// section is fatal rather than producing a half-configured controller.
    pub fn load(path: impl AsRef<std::path::Path>) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Parse and validate configuration from TOML text
    pub fn from_toml(content: &str) -> anyhow::Result<Self> {
        let config: Config = toml::from_str(content)?;
        config.risk.validate()?;
        Ok(config)
    }
}
