/*!
 * Configuration types for Ballast
 *
 * One immutable [`BallastConfig`] is loaded from TOML, adjusted by CLI
 * flags, validated once, and shared by reference with every component.
 */

use ballast_core_ingest::DEFAULT_HISTORY_DAYS;
use ballast_core_ranking::{SoftLimits, StrategyKind};
use ballast_core_resilience::{BackoffStrategy, RetryPolicy};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{BallastError, Result};

/// Main configuration for a balancing run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BallastConfig {
    /// Deadline for one whole cycle
    #[serde(default = "default_cycle_timeout")]
    pub cycle_timeout_secs: u64,

    /// Compute and audit actions without submitting them
    #[serde(default)]
    pub dry_run: bool,

    #[serde(default)]
    pub balancer: BalancerConfig,

    #[serde(default)]
    pub ranking: RankingConfig,

    #[serde(default)]
    pub ingest: IngestConfig,

    #[serde(default)]
    pub retry: RetryConfig,

    #[serde(default)]
    pub paths: PathsConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Default for BallastConfig {
    fn default() -> Self {
        Self {
            cycle_timeout_secs: default_cycle_timeout(),
            dry_run: false,
            balancer: BalancerConfig::default(),
            ranking: RankingConfig::default(),
            ingest: IngestConfig::default(),
            retry: RetryConfig::default(),
            paths: PathsConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BalancerConfig {
    /// Ceiling of the normalized replica target
    #[serde(default = "default_max_replicas")]
    pub max_replicas: u32,

    /// Replication budget per cycle, in GB
    #[serde(default = "default_max_gb")]
    pub max_gb: f64,

    /// Fixed seed for the weighted site choice (random when unset)
    #[serde(default)]
    pub seed: Option<u64>,

    /// Per-site soft storage limits in bytes, overriding the registry
    #[serde(default, skip_serializing_if = "SoftLimits::is_empty")]
    pub soft_storage_limit: SoftLimits,
}

impl Default for BalancerConfig {
    fn default() -> Self {
        Self {
            max_replicas: default_max_replicas(),
            max_gb: default_max_gb(),
            seed: None,
            soft_storage_limit: SoftLimits::default(),
        }
    }
}

impl BalancerConfig {
    pub fn max_bytes(&self) -> u64 {
        (self.max_gb * ballast_core_catalog::BYTES_PER_GB) as u64
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RankingConfig {
    #[serde(default)]
    pub strategy: StrategyKind,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IngestConfig {
    #[serde(default = "default_worker_pool_size")]
    pub worker_pool_size: usize,

    /// Data tiers admitted into the catalog (empty admits every tier)
    #[serde(default = "default_valid_data_tiers")]
    pub valid_data_tiers: Vec<String>,

    /// Replica group under management
    #[serde(default = "default_group")]
    pub group: String,

    /// Popularity days fetched into an empty catalog
    #[serde(default = "default_history_days")]
    pub history_days: u32,

    /// Insert zero popularity rows for days a dataset saw no access
    #[serde(default)]
    pub fill_missing_days: bool,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            worker_pool_size: default_worker_pool_size(),
            valid_data_tiers: default_valid_data_tiers(),
            group: default_group(),
            history_days: default_history_days(),
            fill_missing_days: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_retry_attempts")]
    pub max_attempts: u32,

    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,

    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_retry_attempts(),
            initial_delay_ms: default_initial_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
        }
    }
}

impl RetryConfig {
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts,
            initial_delay: Duration::from_millis(self.initial_delay_ms),
            max_delay: Duration::from_millis(self.max_delay_ms),
            backoff: BackoffStrategy::ExponentialWithJitter,
            ..RetryPolicy::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PathsConfig {
    /// Directory served by the file-backed upstream catalogs
    #[serde(default = "default_data_root")]
    pub data_root: PathBuf,

    /// Catalog database file, or `:memory:`
    #[serde(default = "default_store_path")]
    pub store_path: String,

    /// JSON Lines audit of proposed and submitted actions
    #[serde(default)]
    pub audit_log: Option<PathBuf>,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            data_root: default_data_root(),
            store_path: default_store_path(),
            audit_log: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default)]
    pub level: LogLevel,

    /// Log file path (None = stdout)
    #[serde(default)]
    pub file: Option<PathBuf>,
}

/// Log level for diagnostic output
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Only errors
    Error,

    /// Warnings and errors
    Warn,

    /// Info, warnings, and errors
    #[default]
    Info,

    /// Debug and above
    Debug,

    /// All messages including traces
    Trace,
}

impl LogLevel {
    /// Convert to tracing::Level
    pub fn to_tracing_level(&self) -> tracing::Level {
        match self {
            LogLevel::Error => tracing::Level::ERROR,
            LogLevel::Warn => tracing::Level::WARN,
            LogLevel::Info => tracing::Level::INFO,
            LogLevel::Debug => tracing::Level::DEBUG,
            LogLevel::Trace => tracing::Level::TRACE,
        }
    }
}

// Default value functions for serde
fn default_cycle_timeout() -> u64 {
    3600
}

fn default_max_replicas() -> u32 {
    5
}

fn default_max_gb() -> f64 {
    10_000.0
}

fn default_worker_pool_size() -> usize {
    10
}

fn default_valid_data_tiers() -> Vec<String> {
    ["AOD", "AODSIM", "MINIAOD", "MINIAODSIM"]
        .iter()
        .map(|t| t.to_string())
        .collect()
}

fn default_group() -> String {
    "AnalysisOps".to_string()
}

fn default_history_days() -> u32 {
    DEFAULT_HISTORY_DAYS
}

fn default_retry_attempts() -> u32 {
    3
}

fn default_initial_delay_ms() -> u64 {
    500
}

fn default_max_delay_ms() -> u64 {
    30_000
}

fn default_data_root() -> PathBuf {
    PathBuf::from("data")
}

fn default_store_path() -> String {
    "ballast.db".to_string()
}

impl BallastConfig {
    /// Load configuration from a TOML file
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            BallastError::Config(format!("Cannot read {}: {}", path.display(), e))
        })?;
        toml::from_str(&contents)
            .map_err(|e| BallastError::Config(format!("Invalid {}: {}", path.display(), e)))
    }

    /// Save configuration to a TOML file
    pub fn to_file(&self, path: &Path) -> Result<()> {
        let contents = toml::to_string_pretty(self)
            .map_err(|e| BallastError::Config(format!("Cannot serialize config: {}", e)))?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    pub fn cycle_timeout(&self) -> Duration {
        Duration::from_secs(self.cycle_timeout_secs)
    }

    /// Reject settings no cycle could run with
    pub fn validate(&self) -> Result<()> {
        if self.balancer.max_replicas == 0 {
            return Err(BallastError::Config(
                "balancer.max_replicas must be at least 1".to_string(),
            ));
        }
        if !self.balancer.max_gb.is_finite() || self.balancer.max_gb < 0.0 {
            return Err(BallastError::Config(format!(
                "balancer.max_gb must be a non-negative number, got {}",
                self.balancer.max_gb
            )));
        }
        let limits = &self.balancer.soft_storage_limit;
        if limits.default == Some(0) {
            return Err(BallastError::Config(
                "balancer.soft_storage_limit.default must be positive".to_string(),
            ));
        }
        for (site, bytes) in &limits.sites {
            if site.trim().is_empty() {
                return Err(BallastError::Config(
                    "balancer.soft_storage_limit has an empty site name".to_string(),
                ));
            }
            if *bytes == 0 {
                return Err(BallastError::Config(format!(
                    "balancer.soft_storage_limit.{} must be positive",
                    site
                )));
            }
        }
        if self.ingest.worker_pool_size == 0 {
            return Err(BallastError::Config(
                "ingest.worker_pool_size must be at least 1".to_string(),
            ));
        }
        if self.retry.max_attempts == 0 {
            return Err(BallastError::Config(
                "retry.max_attempts must be at least 1".to_string(),
            ));
        }
        if self.retry.initial_delay_ms > self.retry.max_delay_ms {
            return Err(BallastError::Config(
                "retry.initial_delay_ms exceeds retry.max_delay_ms".to_string(),
            ));
        }
        if self.cycle_timeout_secs == 0 {
            return Err(BallastError::Config(
                "cycle_timeout_secs must be positive".to_string(),
            ));
        }
        if self.paths.store_path.trim().is_empty() {
            return Err(BallastError::Config("paths.store_path is empty".to_string()));
        }
        Ok(())
    }
}
