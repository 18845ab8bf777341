//! Application configuration.
//!
//! Aggregates configuration for the scraper, state file, notification
//! channels, retry policy and logging into a single `Config` that can be
//! loaded from YAML files and environment variables.

use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use crate::services::SchedulerConfig;
use crate::utils::retry::RetryPolicy;

/// Default configuration file name.
pub const DEFAULT_CONFIG_FILE: &str = "listing-watch.yaml";
/// Environment variable for configuration file path.
pub const CONFIG_ENV_VAR: &str = "LISTING_WATCH_CONFIG";
/// Prefix for configuration environment variables.
pub const CONFIG_ENV_PREFIX: &str = "LISTING_WATCH";
/// Environment variable for logging configuration.
pub const LOG_ENV_VAR: &str = "LISTING_WATCH_LOG";

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to load config: {0}")]
    Load(#[from] ::config::ConfigError),

    #[error("Invalid config: {0}")]
    Invalid(String),
}

/// Main application configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Listing page and extraction settings.
    pub scrape: ScrapeConfig,
    /// Persisted state settings.
    pub storage: StorageConfig,
    /// Notification channels.
    pub notify: NotifyConfig,
    /// Retry policy for notification delivery.
    pub retry: RetryConfig,
    /// Log output settings.
    pub log: LogConfig,
}

/// Listing page configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ScrapeConfig {
    /// Site root; relative links are resolved against it.
    pub base_url: String,
    /// Path of the listing page relative to `base_url`.
    pub path: String,
    /// CSS selector matching one element per record.
    pub item_selector: String,
    /// CSS selector for the record name, inside an item.
    pub name_selector: String,
    /// CSS selector for the record group, inside an item.
    pub group_selector: String,
    /// Group prefix marking a record as remote.
    pub remote_prefix: String,
    /// Seconds between cycles.
    pub interval_secs: u64,
    /// Seconds allowed for one fetch.
    pub request_timeout_secs: u64,
    /// Accept an empty listing as real. When false an empty listing fails the cycle.
    pub allow_empty: bool,
}

impl Default for ScrapeConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            path: String::new(),
            item_selector: "a.vacancies_vacancy".to_string(),
            name_selector: "p.vacancies_vacancy__name".to_string(),
            group_selector: "div.team".to_string(),
            remote_prefix: "Remote".to_string(),
            interval_secs: 60,
            request_timeout_secs: 5,
            allow_empty: false,
        }
    }
}

/// Persisted state configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Path of the snapshot file.
    pub state_file: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            state_file: PathBuf::from("./data/listing-watch.state.json"),
        }
    }
}

/// Notification channel kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotifyChannel {
    Log,
    Slack,
    Telegram,
}

/// Notification configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct NotifyConfig {
    /// Enabled channels.
    pub channels: Vec<NotifyChannel>,
    /// Public listing URL linked from the welcome message.
    pub listing_url: String,
    /// Per-request timeout in seconds.
    pub request_timeout_secs: u64,
    pub slack: SlackConfig,
    pub telegram: TelegramConfig,
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            channels: vec![NotifyChannel::Log],
            listing_url: String::new(),
            request_timeout_secs: 10,
            slack: SlackConfig::default(),
            telegram: TelegramConfig::default(),
        }
    }
}

/// Slack webhook configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SlackConfig {
    pub webhook_url: String,
}

/// Telegram bot configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TelegramConfig {
    pub token: String,
    pub chat_id: i64,
    /// Bot API root, overridable for testing.
    pub api_base: String,
}

impl Default for TelegramConfig {
    fn default() -> Self {
        Self {
            token: String::new(),
            chat_id: 0,
            api_base: "https://api.telegram.org".to_string(),
        }
    }
}

/// Retry configuration for notification delivery.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Total attempts per message, including the first.
    pub max_attempts: u32,
    pub min_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            min_delay_ms: 1_000,
            max_delay_ms: 5_000,
        }
    }
}

impl RetryConfig {
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.max_attempts,
            Duration::from_millis(self.min_delay_ms),
            Duration::from_millis(self.max_delay_ms),
        )
    }
}

/// Log output configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Emit JSON lines instead of human-readable output.
    pub json: bool,
}

impl Config {
    /// Load configuration from file and environment.
    ///
    /// Configuration sources (in order of priority, later overrides earlier):
    /// 1. `DEFAULT_CONFIG_FILE` in current directory (if exists)
    /// 2. File specified by `path` argument (if provided)
    /// 3. File specified by `CONFIG_ENV_VAR` environment variable (if set)
    /// 4. Environment variables with `CONFIG_ENV_PREFIX` prefix, `__` separated
    pub fn load(path: Option<&str>) -> Result<Self, ConfigError> {
        use ::config::{Config as ConfigLib, Environment, File, FileFormat};

        let mut builder = ConfigLib::builder()
            .add_source(File::new(DEFAULT_CONFIG_FILE, FileFormat::Yaml).required(false));

        if let Some(config_path) = path {
            builder = builder.add_source(File::new(config_path, FileFormat::Yaml).required(true));
        }

        if let Ok(config_path) = std::env::var(CONFIG_ENV_VAR) {
            builder = builder.add_source(File::new(&config_path, FileFormat::Yaml).required(true));
        }

        let config = builder
            .add_source(
                Environment::with_prefix(CONFIG_ENV_PREFIX)
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("notify.channels")
                    .try_parsing(true),
            )
            .build()?;

        Ok(config.try_deserialize()?)
    }

    /// Reject configurations the watcher cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: &str| Err(ConfigError::Invalid(msg.to_string()));

        if self.scrape.base_url.trim().is_empty() {
            return invalid("scrape.base_url is required");
        }
        if self.scrape.interval_secs == 0 {
            return invalid("scrape.interval_secs must be positive");
        }
        if self.scrape.request_timeout_secs == 0 {
            return invalid("scrape.request_timeout_secs must be positive");
        }
        if self.notify.channels.is_empty() {
            return invalid("notify.channels must name at least one channel");
        }
        if self.notify.channels.contains(&NotifyChannel::Slack)
            && self.notify.slack.webhook_url.is_empty()
        {
            return invalid("notify.slack.webhook_url is required for the slack channel");
        }
        if self.notify.channels.contains(&NotifyChannel::Telegram)
            && (self.notify.telegram.token.is_empty() || self.notify.telegram.chat_id == 0)
        {
            return invalid("notify.telegram.token and chat_id are required for the telegram channel");
        }
        if self.retry.max_attempts == 0 {
            return invalid("retry.max_attempts must be at least 1");
        }
        if self.retry.min_delay_ms > self.retry.max_delay_ms {
            return invalid("retry.min_delay_ms must not exceed retry.max_delay_ms");
        }

        Ok(())
    }

    /// Scheduler settings derived from this configuration.
    pub fn scheduler_config(&self) -> SchedulerConfig {
        SchedulerConfig {
            interval: Duration::from_secs(self.scrape.interval_secs),
            fetch_timeout: Duration::from_secs(self.scrape.request_timeout_secs),
            state_file: self.storage.state_file.clone(),
            allow_empty: self.scrape.allow_empty,
        }
    }
}
