//! Application configuration structures.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Deserializer, Serialize};

use crate::error::{AppError, Result};
use crate::models::ScoringTable;

/// Root application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// HTTP client settings and the header bag
    #[serde(default)]
    pub http: HttpConfig,

    /// Source endpoints and pagination bounds
    #[serde(default)]
    pub source: SourceConfig,

    /// Global and per-host concurrency limits
    #[serde(default)]
    pub scheduler: SchedulerConfig,

    /// Retry and backoff policy
    #[serde(default)]
    pub retry: RetryConfig,

    /// Listing harvest batching
    #[serde(default = "defaults::listing_batches", deserialize_with = "batches::listing")]
    pub listing: BatchConfig,

    /// Detail harvest batching
    #[serde(default = "defaults::detail_batches", deserialize_with = "batches::detail")]
    pub details: BatchConfig,

    /// Event harvest batching
    #[serde(default = "defaults::event_batches", deserialize_with = "batches::event")]
    pub events: BatchConfig,

    /// Checkpoint location and cadence
    #[serde(default)]
    pub checkpoint: CheckpointConfig,

    /// Point values used by the fold
    #[serde(default)]
    pub scoring: ScoringTable,

    /// Logging settings
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    /// Load configuration or return default if loading fails.
    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        Self::load(&path).unwrap_or_else(|e| {
            log::warn!(
                "Config load failed from {:?}: {}. Using defaults.",
                path.as_ref(),
                e
            );
            Self::default()
        })
    }

    /// Validate configuration values for basic sanity.
    pub fn validate(&self) -> Result<()> {
        if self.http.user_agent.trim().is_empty() {
            return Err(AppError::validation("http.user_agent is empty"));
        }
        if self.http.timeout_secs == 0 {
            return Err(AppError::validation("http.timeout_secs must be > 0"));
        }
        if self.source.page_step == 0 {
            return Err(AppError::validation("source.page_step must be > 0"));
        }
        if self.source.listing_ceiling < self.source.listing_start {
            return Err(AppError::validation(
                "source.listing_ceiling must be >= source.listing_start",
            ));
        }
        if !self.source.listing_url.contains("{cursor}") {
            return Err(AppError::validation(
                "source.listing_url must contain {cursor}",
            ));
        }
        if !self.source.pass_url.contains("{id}") || !self.source.pass_url.contains("{cursor}") {
            return Err(AppError::validation(
                "source.pass_url must contain {id} and {cursor}",
            ));
        }
        if !self.source.profile_url.contains("{id}") {
            return Err(AppError::validation("source.profile_url must contain {id}"));
        }
        if self.scheduler.max_in_flight == 0 {
            return Err(AppError::validation("scheduler.max_in_flight must be > 0"));
        }
        if self.scheduler.max_per_host == 0 {
            return Err(AppError::validation("scheduler.max_per_host must be > 0"));
        }
        for (name, batch) in [
            ("listing", &self.listing),
            ("details", &self.details),
            ("events", &self.events),
        ] {
            if batch.batch_size == 0 {
                return Err(AppError::validation(format!(
                    "{name}.batch_size must be > 0"
                )));
            }
        }
        if self.checkpoint.interval == 0 {
            return Err(AppError::validation("checkpoint.interval must be > 0"));
        }
        if self.checkpoint.save_attempts == 0 {
            return Err(AppError::validation(
                "checkpoint.save_attempts must be > 0",
            ));
        }
        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            http: HttpConfig::default(),
            source: SourceConfig::default(),
            scheduler: SchedulerConfig::default(),
            retry: RetryConfig::default(),
            listing: defaults::listing_batches(),
            details: defaults::detail_batches(),
            events: defaults::event_batches(),
            checkpoint: CheckpointConfig::default(),
            scoring: ScoringTable::default(),
            logging: LoggingConfig::default(),
        }
    }
}

/// HTTP client settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    /// User-Agent header for HTTP requests
    #[serde(default = "defaults::user_agent")]
    pub user_agent: String,

    /// Per-request timeout in seconds
    #[serde(default = "defaults::timeout")]
    pub timeout_secs: u64,

    /// Identity/auth headers sent with every request
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            user_agent: defaults::user_agent(),
            timeout_secs: defaults::timeout(),
            headers: BTreeMap::new(),
        }
    }
}

/// Source endpoints. Templates use `{cursor}` and `{id}` placeholders.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    #[serde(default = "defaults::listing_url")]
    pub listing_url: String,

    #[serde(default = "defaults::pass_url")]
    pub pass_url: String,

    #[serde(default = "defaults::profile_url")]
    pub profile_url: String,

    /// Cursor increment between pages
    #[serde(default = "defaults::page_step")]
    pub page_step: u64,

    #[serde(default)]
    pub listing_start: u64,

    /// Highest listing cursor ever requested (inclusive)
    #[serde(default = "defaults::listing_ceiling")]
    pub listing_ceiling: u64,

    /// Highest per-entity pass page cursor (inclusive)
    #[serde(default = "defaults::pass_ceiling")]
    pub pass_ceiling: u64,
}

impl SourceConfig {
    pub fn listing_url_for(&self, cursor: u64) -> String {
        self.listing_url.replace("{cursor}", &cursor.to_string())
    }

    pub fn pass_url_for(&self, id: &str, cursor: u64) -> String {
        self.pass_url
            .replace("{id}", id)
            .replace("{cursor}", &cursor.to_string())
    }

    pub fn profile_url_for(&self, id: &str) -> String {
        self.profile_url.replace("{id}", id)
    }
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            listing_url: defaults::listing_url(),
            pass_url: defaults::pass_url(),
            profile_url: defaults::profile_url(),
            page_step: defaults::page_step(),
            listing_start: 0,
            listing_ceiling: defaults::listing_ceiling(),
            pass_ceiling: defaults::pass_ceiling(),
        }
    }
}

/// Concurrency limits shared by every harvest.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Maximum requests in flight at once
    #[serde(default = "defaults::max_in_flight")]
    pub max_in_flight: usize,

    /// Maximum requests in flight to a single host
    #[serde(default = "defaults::max_per_host")]
    pub max_per_host: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_in_flight: defaults::max_in_flight(),
            max_per_host: defaults::max_per_host(),
        }
    }
}

/// Retry policy settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "defaults::max_rate_limit_retries")]
    pub max_rate_limit_retries: u32,

    /// Backoff before rate-limit retry `n` is `base * 2^n`
    #[serde(default = "defaults::backoff_base_ms")]
    pub backoff_base_ms: u64,

    #[serde(default = "defaults::max_transient_retries")]
    pub max_transient_retries: u32,

    #[serde(default = "defaults::transient_delay_ms")]
    pub transient_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_rate_limit_retries: defaults::max_rate_limit_retries(),
            backoff_base_ms: defaults::backoff_base_ms(),
            max_transient_retries: defaults::max_transient_retries(),
            transient_delay_ms: defaults::transient_delay_ms(),
        }
    }
}

/// Batching for one harvest kind.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchConfig {
    pub batch_size: usize,

    /// Fixed pause between batches
    pub batch_delay_ms: u64,
}

impl BatchConfig {
    pub fn batch_delay(&self) -> Duration {
        Duration::from_millis(self.batch_delay_ms)
    }
}

/// Batch sections fill unset fields from their own kind's defaults.
mod batches {
    use super::*;

    #[derive(Deserialize)]
    struct PartialBatch {
        batch_size: Option<usize>,
        batch_delay_ms: Option<u64>,
    }

    fn fill<'de, D>(deserializer: D, base: BatchConfig) -> std::result::Result<BatchConfig, D::Error>
    where
        D: Deserializer<'de>,
    {
        let partial = PartialBatch::deserialize(deserializer)?;
        Ok(BatchConfig {
            batch_size: partial.batch_size.unwrap_or(base.batch_size),
            batch_delay_ms: partial.batch_delay_ms.unwrap_or(base.batch_delay_ms),
        })
    }

    pub fn listing<'de, D: Deserializer<'de>>(d: D) -> std::result::Result<BatchConfig, D::Error> {
        fill(d, defaults::listing_batches())
    }

    pub fn detail<'de, D: Deserializer<'de>>(d: D) -> std::result::Result<BatchConfig, D::Error> {
        fill(d, defaults::detail_batches())
    }

    pub fn event<'de, D: Deserializer<'de>>(d: D) -> std::result::Result<BatchConfig, D::Error> {
        fill(d, defaults::event_batches())
    }
}

/// Checkpoint settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckpointConfig {
    /// Directory holding checkpoints and output artifacts
    #[serde(default = "defaults::storage_dir")]
    pub dir: PathBuf,

    /// Save after this many completed items
    #[serde(default = "defaults::checkpoint_interval")]
    pub interval: usize,

    /// Attempts before a failed save becomes fatal
    #[serde(default = "defaults::save_attempts")]
    pub save_attempts: u32,
}

impl Default for CheckpointConfig {
    fn default() -> Self {
        Self {
            dir: defaults::storage_dir(),
            interval: defaults::checkpoint_interval(),
            save_attempts: defaults::save_attempts(),
        }
    }
}

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "defaults::log_level")]
    pub level: String,

    /// Log a progress line after every batch
    #[serde(default = "defaults::show_progress")]
    pub show_progress: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: defaults::log_level(),
            show_progress: defaults::show_progress(),
        }
    }
}

mod defaults {
    use std::path::PathBuf;

    use super::BatchConfig;

    // HTTP defaults
    pub fn user_agent() -> String {
        "Mozilla/5.0 (compatible; scorecard/0.1)".into()
    }
    pub fn timeout() -> u64 {
        15
    }

    // Source defaults
    pub fn listing_url() -> String {
        "https://web.realsports.io/userpassshop/ufc/season/2023/entity/team/section/hotseason?before={cursor}".into()
    }
    pub fn pass_url() -> String {
        "https://web.realsports.io/userpasses/ufc/type/team/entity/{id}/leaderboard?before={cursor}&season=2023&sort=boostvalue".into()
    }
    pub fn profile_url() -> String {
        "https://web.realsports.io/teams/{id}/sport/ufc".into()
    }
    pub fn page_step() -> u64 {
        20
    }
    pub fn listing_ceiling() -> u64 {
        2300
    }
    pub fn pass_ceiling() -> u64 {
        1000
    }

    // Scheduler defaults
    pub fn max_in_flight() -> usize {
        30
    }
    pub fn max_per_host() -> usize {
        30
    }

    // Retry defaults
    pub fn max_rate_limit_retries() -> u32 {
        3
    }
    pub fn backoff_base_ms() -> u64 {
        2000
    }
    pub fn max_transient_retries() -> u32 {
        2
    }
    pub fn transient_delay_ms() -> u64 {
        500
    }

    // Batch defaults
    pub fn listing_batches() -> BatchConfig {
        BatchConfig {
            batch_size: 100,
            batch_delay_ms: 500,
        }
    }
    pub fn detail_batches() -> BatchConfig {
        BatchConfig {
            batch_size: 5,
            batch_delay_ms: 200,
        }
    }
    pub fn event_batches() -> BatchConfig {
        BatchConfig {
            batch_size: 100,
            batch_delay_ms: 100,
        }
    }

    // Checkpoint defaults
    pub fn storage_dir() -> PathBuf {
        PathBuf::from("storage")
    }
    pub fn checkpoint_interval() -> usize {
        50
    }
    pub fn save_attempts() -> u32 {
        3
    }

    // Logging defaults
    pub fn log_level() -> String {
        "info".into()
    }
    pub fn show_progress() -> bool {
        true
    }
}
