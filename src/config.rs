// src/config.rs

use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::Path;

use crate::matcher::MatchPolicy;
use crate::sink::StdoutFormat;

/// Log endpoint and fetch tuning.
#[derive(Debug, Deserialize, Clone)]
pub struct LogConfig {
    #[serde(default = "default_log_uri")]
    pub uri: String,
    #[serde(default = "default_batch_size")]
    pub batch_size: u64,
    #[serde(default = "default_parallel_fetch")]
    pub parallel_fetch: usize,
}

fn default_log_uri() -> String {
    "https://ct.googleapis.com/aviator".to_string()
}
fn default_batch_size() -> u64 { 1000 }
fn default_parallel_fetch() -> usize { 2 }

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            uri: default_log_uri(),
            batch_size: default_batch_size(),
            parallel_fetch: default_parallel_fetch(),
        }
    }
}

/// Interest policy: subject rule plus issuer whitelist.
#[derive(Debug, Deserialize, Clone)]
pub struct MatchConfig {
    /// Regular expression applied to the subject CN and every DNS SAN.
    pub subject_regex: String,
    /// Issuer CNs whose certificates are never reported.
    #[serde(default)]
    pub ca_whitelist: Vec<String>,
}

/// Pass pacing and resume behavior.
#[derive(Debug, Deserialize, Clone)]
pub struct ScanConfig {
    /// Start here when it is ahead of the saved checkpoint.
    #[serde(default)]
    pub start_index: i64,
    /// Seconds between passes; 0 means a single pass.
    #[serde(default)]
    pub rescan_interval_secs: u64,
    #[serde(default = "default_checkpoint_interval")]
    pub checkpoint_interval_secs: u64,
    #[serde(default)]
    pub checkpoint_backend: CheckpointBackend,
    #[serde(default = "default_state_file")]
    pub state_file: String,
}

fn default_checkpoint_interval() -> u64 { 30 }
fn default_state_file() -> String { "ct-sentinel-state.toml".to_string() }

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            start_index: 0,
            rescan_interval_secs: 0,
            checkpoint_interval_secs: default_checkpoint_interval(),
            checkpoint_backend: CheckpointBackend::default(),
            state_file: default_state_file(),
        }
    }
}

/// Where the resume checkpoint lives.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum CheckpointBackend {
    #[default]
    File,
    Database,
}

/// PostgreSQL persistence for matches; also required by the database
/// checkpoint backend.
#[derive(Debug, Deserialize, Clone)]
pub struct StorageConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_storage_url")]
    pub url: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_storage_url() -> String {
    "postgresql://localhost/ctsentinel".to_string()
}

fn default_max_connections() -> u32 {
    20
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            url: default_storage_url(),
            max_connections: default_max_connections(),
        }
    }
}

/// Webhook notification target; presence of the section enables it.
#[derive(Debug, Deserialize, Clone)]
pub struct WebhookConfig {
    pub url: String,
    /// HMAC-SHA256 signing key for the payload.
    pub secret: Option<String>,
    pub timeout_secs: Option<u64>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct RedisConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_redis_url")]
    pub url: String,
    #[serde(default = "default_redis_channel")]
    pub channel: String,
    /// Also LPUSH matches to this list for subscribers that were offline.
    #[serde(default)]
    pub queue_name: Option<String>,
    #[serde(default = "default_max_queue_size")]
    pub max_queue_size: i64,
}

fn default_redis_url() -> String { "redis://localhost:6379".to_string() }
fn default_redis_channel() -> String { "ct-sentinel:matches".to_string() }
fn default_max_queue_size() -> i64 { 10000 }

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            url: default_redis_url(),
            channel: default_redis_channel(),
            queue_name: None,
            max_queue_size: default_max_queue_size(),
        }
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct StdoutConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub format: StdoutFormat,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_level() -> String { "info".to_string() }

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub log: LogConfig,
    #[serde(rename = "match")]
    pub matching: MatchConfig,
    #[serde(default)]
    pub scan: ScanConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub webhook: Option<WebhookConfig>,
    #[serde(default)]
    pub redis: RedisConfig,
    #[serde(default)]
    pub stdout: StdoutConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {:?}", path))?;

        let config: Config = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file {:?}", path))?;

        Ok(config)
    }

    /// Cross-field validation, fatal at startup.
    pub fn validate(&self) -> Result<()> {
        // Compiling the policy here applies the same rules as at runtime
        MatchPolicy::new(&self.matching.subject_regex, self.matching.ca_whitelist.clone())
            .context("Invalid match policy")?;

        let uri = url::Url::parse(&self.log.uri)
            .with_context(|| format!("Invalid log URI '{}'", self.log.uri))?;
        if uri.scheme() != "http" && uri.scheme() != "https" {
            anyhow::bail!("Log URI must be http(s), got '{}'", self.log.uri);
        }

        if self.log.batch_size == 0 {
            anyhow::bail!("log.batch_size must be at least 1");
        }
        if self.log.parallel_fetch == 0 {
            anyhow::bail!("log.parallel_fetch must be at least 1");
        }
        if self.scan.start_index < 0 {
            anyhow::bail!("scan.start_index must not be negative");
        }

        if self.scan.checkpoint_backend == CheckpointBackend::Database && !self.storage.enabled {
            anyhow::bail!("checkpoint_backend 'database' requires storage to be enabled");
        }

        if let Some(webhook) = &self.webhook {
            url::Url::parse(&webhook.url)
                .with_context(|| format!("Invalid webhook URL '{}'", webhook.url))?;
        }

        if !self.any_sink_enabled() {
            anyhow::bail!("No storage, webhook, Redis or stdout sink enabled, no reason to start");
        }

        Ok(())
    }

    pub fn any_sink_enabled(&self) -> bool {
        self.storage.enabled || self.webhook.is_some() || self.redis.enabled || self.stdout.enabled
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_config(contents: &str) -> NamedTempFile {
        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(contents.as_bytes()).unwrap();
        temp_file.flush().unwrap();
        temp_file
    }

    #[test]
    fn test_config_minimal_toml_gets_defaults() {
        let file = write_config(
            r#"
[match]
subject_regex = ".*\\.example\\.com$"

[stdout]
enabled = true
        "#,
        );

        let config = Config::from_file(file.path()).unwrap();

        assert_eq!(config.log.uri, "https://ct.googleapis.com/aviator");
        assert_eq!(config.log.batch_size, 1000);
        assert_eq!(config.log.parallel_fetch, 2);
        assert_eq!(config.scan.start_index, 0);
        assert_eq!(config.scan.rescan_interval_secs, 0);
        assert_eq!(config.scan.checkpoint_interval_secs, 30);
        assert_eq!(config.scan.checkpoint_backend, CheckpointBackend::File);
        assert_eq!(config.scan.state_file, "ct-sentinel-state.toml");
        assert!(!config.storage.enabled);
        assert!(config.webhook.is_none());
        assert!(!config.redis.enabled);
        assert_eq!(config.stdout.format, StdoutFormat::Human);
        assert_eq!(config.logging.level, "info");

        config.validate().unwrap();
    }

    #[test]
    fn test_config_from_full_toml() {
        let file = write_config(
            r#"
[log]
uri = "https://ct.example.org/2026"
batch_size = 256
parallel_fetch = 4

[match]
subject_regex = "(^|\\.)corp\\.example\\.com$"
ca_whitelist = ["Corp Internal CA"]

[scan]
start_index = 5000
rescan_interval_secs = 300
checkpoint_interval_secs = 10
checkpoint_backend = "database"
state_file = "/var/lib/ct-sentinel/state.toml"

[storage]
enabled = true
url = "postgresql://ct:ct@localhost/ct"
max_connections = 5

[webhook]
url = "https://hooks.example.com/ct"
secret = "test_secret"
timeout_secs = 3

[redis]
enabled = true
url = "redis://cache:6379"
channel = "ct:matches"
queue_name = "ct:backlog"
max_queue_size = 500

[stdout]
enabled = true
format = "jsonl"

[logging]
level = "debug"
        "#,
        );

        let config = Config::from_file(file.path()).unwrap();

        assert_eq!(config.log.uri, "https://ct.example.org/2026");
        assert_eq!(config.log.batch_size, 256);
        assert_eq!(config.log.parallel_fetch, 4);
        assert_eq!(config.matching.ca_whitelist, vec!["Corp Internal CA"]);
        assert_eq!(config.scan.start_index, 5000);
        assert_eq!(config.scan.checkpoint_backend, CheckpointBackend::Database);
        assert!(config.storage.enabled);
        let webhook = config.webhook.as_ref().unwrap();
        assert_eq!(webhook.secret.as_deref(), Some("test_secret"));
        assert_eq!(webhook.timeout_secs, Some(3));
        assert_eq!(config.redis.queue_name.as_deref(), Some("ct:backlog"));
        assert_eq!(config.redis.max_queue_size, 500);
        assert_eq!(config.stdout.format, StdoutFormat::Jsonl);
        assert_eq!(config.logging.level, "debug");

        config.validate().unwrap();
    }

    #[test]
    fn test_config_missing_match_section() {
        let file = write_config(
            r#"
[stdout]
enabled = true
        "#,
        );

        assert!(Config::from_file(file.path()).is_err());
    }

    #[test]
    fn test_config_invalid_toml() {
        let file = write_config("invalid toml content {{{");
        assert!(Config::from_file(file.path()).is_err());
    }

    #[test]
    fn test_config_nonexistent_file() {
        let result = Config::from_file(Path::new("/nonexistent/path/config.toml"));
        assert!(result.is_err());
    }
}
