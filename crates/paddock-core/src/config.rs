//! Paddock configuration system.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{PaddockError, Result};
use crate::model::Channel;

/// Root configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PaddockConfig {
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub materializer: MaterializerConfig,
    #[serde(default)]
    pub delivery: DeliveryConfig,
    #[serde(default)]
    pub email: Option<EmailConfig>,
    #[serde(default)]
    pub telegram: Option<TelegramConfig>,
    #[serde(default)]
    pub push: Option<PushConfig>,
}

impl PaddockConfig {
    /// Load config from the default path (~/.paddock/config.toml).
    pub fn load() -> Result<Self> {
        let path = Self::default_path();
        if path.exists() {
            Self::load_from(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load config from a specific path.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| PaddockError::Config(format!("Failed to read config: {e}")))?;
        let config: Self = toml::from_str(&content)
            .map_err(|e| PaddockError::Config(format!("Failed to parse config: {e}")))?;
        Ok(config)
    }

    /// Save config to the default path.
    pub fn save(&self) -> Result<()> {
        let path = Self::default_path();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)
            .map_err(|e| PaddockError::Config(format!("Failed to serialize config: {e}")))?;
        std::fs::write(&path, content)?;
        Ok(())
    }

    /// Get the default config path.
    pub fn default_path() -> PathBuf {
        Self::home_dir().join("config.toml")
    }

    /// Get the Paddock home directory.
    pub fn home_dir() -> PathBuf {
        dirs::home_dir().unwrap_or_else(|| PathBuf::from(".")).join(".paddock")
    }
}

/// Local document store location.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default = "default_db_path")]
    pub db_path: String,
}

fn default_db_path() -> String {
    "~/.paddock/paddock.db".into()
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self { db_path: default_db_path() }
    }
}

impl StoreConfig {
    /// `db_path` with a leading `~/` expanded to the home directory.
    pub fn resolved_db_path(&self) -> PathBuf {
        match self.db_path.strip_prefix("~/") {
            Some(rest) => dirs::home_dir().unwrap_or_else(|| PathBuf::from(".")).join(rest),
            None => PathBuf::from(&self.db_path),
        }
    }
}

/// Materialization engine tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MaterializerConfig {
    /// Provider-imposed write batch ceiling.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Definitions processed concurrently.
    #[serde(default = "default_concurrency")]
    pub worker_concurrency: usize,
}

fn default_batch_size() -> usize {
    400
}
fn default_concurrency() -> usize {
    4
}

impl Default for MaterializerConfig {
    fn default() -> Self {
        Self { batch_size: default_batch_size(), worker_concurrency: default_concurrency() }
    }
}

/// Delivery queue tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryConfig {
    #[serde(default = "default_max_attempts")]
    pub default_max_attempts: u32,
    /// Hard cap on a single channel send.
    #[serde(default = "default_send_timeout")]
    pub send_timeout_secs: u64,
    #[serde(default = "default_concurrency")]
    pub worker_concurrency: usize,
    /// Failed items older than this are discarded by the hourly sweep.
    #[serde(default = "default_failed_retention")]
    pub failed_retention_hours: i64,
    /// Terminal queue items older than this are deleted by the daily sweep.
    #[serde(default = "default_queue_retention")]
    pub queue_retention_days: i64,
    /// Read notifications older than this move to the archive store.
    #[serde(default = "default_archive_after")]
    pub archive_after_days: i64,
    #[serde(default)]
    pub rate_limits: RateLimits,
}

fn default_max_attempts() -> u32 {
    5
}
fn default_send_timeout() -> u64 {
    10
}
fn default_failed_retention() -> i64 {
    24
}
fn default_queue_retention() -> i64 {
    7
}
fn default_archive_after() -> i64 {
    30
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            default_max_attempts: default_max_attempts(),
            send_timeout_secs: default_send_timeout(),
            worker_concurrency: default_concurrency(),
            failed_retention_hours: default_failed_retention(),
            queue_retention_days: default_queue_retention(),
            archive_after_days: default_archive_after(),
            rate_limits: RateLimits::default(),
        }
    }
}

/// Token-bucket parameters for one channel.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct BucketConfig {
    pub max_tokens: f64,
    pub refill_per_minute: f64,
}

impl BucketConfig {
    pub fn refill_per_ms(&self) -> f64 {
        self.refill_per_minute / 60_000.0
    }
}

/// Per-channel admission control. In-app is effectively unthrottled since
/// delivery is just the document existing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimits {
    #[serde(default = "default_email_bucket")]
    pub email: BucketConfig,
    #[serde(default = "default_push_bucket")]
    pub push: BucketConfig,
    #[serde(default = "default_telegram_bucket")]
    pub telegram: BucketConfig,
    #[serde(default = "default_in_app_bucket")]
    pub in_app: BucketConfig,
}

fn default_email_bucket() -> BucketConfig {
    BucketConfig { max_tokens: 10.0, refill_per_minute: 30.0 }
}
fn default_push_bucket() -> BucketConfig {
    BucketConfig { max_tokens: 50.0, refill_per_minute: 300.0 }
}
fn default_telegram_bucket() -> BucketConfig {
    BucketConfig { max_tokens: 20.0, refill_per_minute: 60.0 }
}
fn default_in_app_bucket() -> BucketConfig {
    BucketConfig { max_tokens: 1000.0, refill_per_minute: 60_000.0 }
}

impl Default for RateLimits {
    fn default() -> Self {
        Self {
            email: default_email_bucket(),
            push: default_push_bucket(),
            telegram: default_telegram_bucket(),
            in_app: default_in_app_bucket(),
        }
    }
}

impl RateLimits {
    pub fn for_channel(&self, channel: Channel) -> BucketConfig {
        match channel {
            Channel::Email => self.email,
            Channel::Push => self.push,
            Channel::Telegram => self.telegram,
            Channel::InApp => self.in_app,
        }
    }
}

/// SMTP transport configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmailConfig {
    pub smtp_host: String,
    #[serde(default = "default_smtp_port")]
    pub smtp_port: u16,
    pub from_address: String,
    #[serde(default)]
    pub display_name: Option<String>,
    pub username: String,
    pub password: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
}

fn default_smtp_port() -> u16 {
    587
}
fn default_true() -> bool {
    true
}

/// Telegram Bot API configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelegramConfig {
    pub bot_token: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
}

/// Push gateway configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PushConfig {
    pub gateway_url: String,
    pub server_key: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let cfg = PaddockConfig::default();
        assert_eq!(cfg.materializer.batch_size, 400);
        assert_eq!(cfg.delivery.default_max_attempts, 5);
        assert!(cfg.email.is_none());
    }

    #[test]
    fn parses_partial_toml() {
        let cfg: PaddockConfig = toml::from_str(
            r#"
            [delivery]
            default_max_attempts = 3

            [delivery.rate_limits.email]
            max_tokens = 5.0
            refill_per_minute = 5.0
            "#,
        )
        .unwrap();
        assert_eq!(cfg.delivery.default_max_attempts, 3);
        assert_eq!(cfg.delivery.rate_limits.email.max_tokens, 5.0);
        // untouched sections keep defaults
        assert_eq!(cfg.delivery.rate_limits.push.max_tokens, 50.0);
        assert_eq!(cfg.materializer.batch_size, 400);
    }

    #[test]
    fn refill_per_ms_converts() {
        let bucket = BucketConfig { max_tokens: 5.0, refill_per_minute: 5.0 };
        let per_ms = bucket.refill_per_ms();
        assert!((per_ms - 5.0 / 60_000.0).abs() < 1e-12);
    }
}
