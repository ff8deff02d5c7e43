use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::MigrError;

/// Hard ceiling on concurrent imports per batch.
pub const MAX_CONCURRENCY: usize = 20;

/// Top-level migr configuration, stored at `~/.migr/config.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MigrConfig {
    /// Base URL of the platform API.
    #[serde(default = "default_api_url")]
    pub api_url: String,

    /// Directory receiving the append-only run logs.
    #[serde(default)]
    pub log_dir: Option<PathBuf>,

    /// Targets submitted concurrently per batch (clamped to 1..=20).
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    #[serde(default)]
    pub retry: RetrySettings,

    #[serde(default)]
    pub poll: PollSettings,

    /// Worker ceiling used while parsing a previous import log.
    #[serde(default = "default_dedupe_concurrency")]
    pub dedupe_concurrency: usize,

    /// Extra exclusion globs applied on top of the defaults during sync.
    #[serde(default)]
    pub exclusion_globs: Vec<String>,

    /// Entitlements enabled for sync, e.g. `openSource`.
    #[serde(default = "default_entitlements")]
    pub entitlements: Vec<String>,
}

/// Retry policy of the request executor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrySettings {
    #[serde(default = "default_retry_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
}

/// Import job polling policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollSettings {
    #[serde(default = "default_poll_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_poll_interval")]
    pub interval_secs: u64,
    /// Wall-clock ceiling per job; `None` disables it.
    #[serde(default = "default_poll_max_wait")]
    pub max_wait_secs: Option<u64>,
    #[serde(default = "default_poll_concurrency")]
    pub concurrency: usize,
}

fn default_api_url() -> String {
    "https://api.snyk.io/v1".to_string()
}

fn default_concurrency() -> usize {
    5
}

fn default_dedupe_concurrency() -> usize {
    150
}

fn default_entitlements() -> Vec<String> {
    vec!["openSource".to_string()]
}

fn default_retry_attempts() -> u32 {
    7
}

fn default_base_delay_ms() -> u64 {
    2_000
}

fn default_poll_attempts() -> u32 {
    1_000
}

fn default_poll_interval() -> u64 {
    20
}

fn default_poll_max_wait() -> Option<u64> {
    Some(6 * 60 * 60)
}

fn default_poll_concurrency() -> usize {
    10
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: default_retry_attempts(),
            base_delay_ms: default_base_delay_ms(),
        }
    }
}

impl RetrySettings {
    pub fn base_delay(&self) -> Duration {
        Duration::from_millis(self.base_delay_ms)
    }
}

impl Default for PollSettings {
    fn default() -> Self {
        Self {
            max_attempts: default_poll_attempts(),
            interval_secs: default_poll_interval(),
            max_wait_secs: default_poll_max_wait(),
            concurrency: default_poll_concurrency(),
        }
    }
}

impl PollSettings {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn max_wait(&self) -> Option<Duration> {
        self.max_wait_secs.map(Duration::from_secs)
    }
}

impl Default for MigrConfig {
    fn default() -> Self {
        Self {
            api_url: default_api_url(),
            log_dir: None,
            concurrency: default_concurrency(),
            retry: RetrySettings::default(),
            poll: PollSettings::default(),
            dedupe_concurrency: default_dedupe_concurrency(),
            exclusion_globs: Vec::new(),
            entitlements: default_entitlements(),
        }
    }
}

impl MigrConfig {
    /// Returns the migr home directory (`~/.migr/`).
    pub fn home_dir() -> Result<PathBuf, MigrError> {
        let base = dirs::home_dir().ok_or_else(|| MigrError::Config {
            message: "could not determine home directory".into(),
        })?;
        Ok(base.join(".migr"))
    }

    /// Returns the path to the config file.
    pub fn config_path() -> Result<PathBuf, MigrError> {
        Ok(Self::home_dir()?.join("config.toml"))
    }

    /// Directory the run logs go to: the configured one, or `~/.migr/logs`.
    pub fn resolved_log_dir(&self) -> Result<PathBuf, MigrError> {
        match &self.log_dir {
            Some(dir) => Ok(dir.clone()),
            None => Ok(Self::home_dir()?.join("logs")),
        }
    }

    /// Concurrency clamped to the supported range.
    pub fn effective_concurrency(&self) -> usize {
        self.concurrency.clamp(1, MAX_CONCURRENCY)
    }

    /// Load config from the default location, or return defaults if not found.
    /// Environment overrides are applied on top.
    pub fn load() -> Result<Self, MigrError> {
        let path = Self::config_path()?;
        let mut config = if path.exists() {
            tracing::debug!(path = %path.display(), "loading config");
            Self::load_from(&path)?
        } else {
            Self::default()
        };
        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Load config from a specific path.
    pub fn load_from(path: &Path) -> Result<Self, MigrError> {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| MigrError::Serialization(e.to_string()))
    }

    /// Apply `MIGR_API_URL`, `MIGR_LOG_PATH` and `MIGR_CONCURRENCY` overrides.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), MigrError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup("MIGR_API_URL").filter(|v| !v.is_empty()) {
            self.api_url = url;
        }
        if let Some(path) = lookup("MIGR_LOG_PATH").filter(|v| !v.is_empty()) {
            self.log_dir = Some(PathBuf::from(path));
        }
        if let Some(value) = lookup("MIGR_CONCURRENCY").filter(|v| !v.is_empty()) {
            self.concurrency = value.parse().map_err(|_| MigrError::Config {
                message: format!("MIGR_CONCURRENCY must be a number, got {value:?}"),
            })?;
        }
        Ok(())
    }

    /// Save config to the default location.
    pub fn save(&self) -> Result<(), MigrError> {
        let path = Self::config_path()?;
        self.save_to(&path)
    }

    /// Save config to a specific path.
    pub fn save_to(&self, path: &Path) -> Result<(), MigrError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content =
            toml::to_string_pretty(self).map_err(|e| MigrError::Serialization(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Initialize the migr home directory with default config.
    pub fn init() -> Result<PathBuf, MigrError> {
        let home = Self::home_dir()?;
        std::fs::create_dir_all(home.join("logs"))?;

        let config_path = Self::config_path()?;
        if !config_path.exists() {
            Self::default().save_to(&config_path)?;
        }

        Ok(home)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_roundtrip() {
        let config = MigrConfig::default();
        let serialized = toml::to_string_pretty(&config).unwrap();
        let deserialized: MigrConfig = toml::from_str(&serialized).unwrap();
        assert_eq!(config.api_url, deserialized.api_url);
        assert_eq!(config.concurrency, deserialized.concurrency);
        assert_eq!(config.retry.max_attempts, 7);
        assert_eq!(deserialized.poll.max_attempts, 1_000);
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let config: MigrConfig = toml::from_str("concurrency = 50\n[poll]\ninterval_secs = 1\n").unwrap();
        assert_eq!(config.effective_concurrency(), MAX_CONCURRENCY);
        assert_eq!(config.poll.interval(), Duration::from_secs(1));
        assert_eq!(config.poll.concurrency, 10);
        assert_eq!(config.dedupe_concurrency, 150);
    }

    #[test]
    fn test_env_overrides() {
        let mut config = MigrConfig::default();
        config
            .apply_env(|key| match key {
                "MIGR_LOG_PATH" => Some("/tmp/run-1".to_string()),
                "MIGR_CONCURRENCY" => Some("3".to_string()),
                _ => None,
            })
            .unwrap();
        assert_eq!(config.log_dir, Some(PathBuf::from("/tmp/run-1")));
        assert_eq!(config.effective_concurrency(), 3);
        assert_eq!(config.api_url, "https://api.snyk.io/v1");
    }

    #[test]
    fn test_env_override_rejects_garbage() {
        let mut config = MigrConfig::default();
        let err = config
            .apply_env(|key| (key == "MIGR_CONCURRENCY").then(|| "lots".to_string()))
            .unwrap_err();
        assert!(matches!(err, MigrError::Config { .. }));
    }
}
