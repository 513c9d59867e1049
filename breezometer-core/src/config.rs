use anyhow::{Context, Result, anyhow};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::{collections::HashMap, fs, path::Path, path::PathBuf, time::Duration};

use crate::{
    retry::RetryPolicy,
    transport::{DEFAULT_BASE_URL, DEFAULT_TIMEOUT},
};

/// Environment variable that overrides the stored API key.
pub const API_KEY_ENV: &str = "BREEZOMETER_API_KEY";

/// Retry tuning; unset fields fall back to [`RetryPolicy::default`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryConfig {
    pub max_attempts: Option<u32>,
    pub base_delay_ms: Option<u64>,
    pub max_delay_ms: Option<u64>,
}

/// Top-level configuration stored on disk.
///
/// Example TOML:
/// ```toml
/// api_key = "..."
/// timeout_secs = 30
///
/// [retry]
/// max_attempts = 5
///
/// [headers]
/// X-Request-Source = "dashboard"
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    pub api_key: Option<String>,

    /// Defaults to the public Breezometer endpoint.
    pub base_url: Option<String>,

    pub timeout_secs: Option<u64>,

    #[serde(default)]
    pub retry: RetryConfig,

    /// Extra headers sent with every request.
    #[serde(default)]
    pub headers: HashMap<String, String>,
}

impl Config {
    /// Load config from disk, or return an empty default if it doesn't exist yet.
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_file_path()?)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            // First run: no config file, return empty.
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let cfg: Config = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(cfg)
    }

    /// Save config to disk, creating parent directories as needed.
    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_file_path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        let toml =
            toml::to_string_pretty(self).context("Failed to serialize configuration to TOML")?;

        fs::write(path, toml)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        Ok(())
    }

    /// Path to the config file.
    pub fn config_file_path() -> Result<PathBuf> {
        let dirs = ProjectDirs::from("com", "breezometer", "breezometer-cli")
            .ok_or_else(|| anyhow!("Could not determine platform config directory"))?;

        Ok(dirs.config_dir().join("config.toml"))
    }

    pub fn set_api_key(&mut self, api_key: String) {
        self.api_key = Some(api_key);
    }

    /// API key from the environment, falling back to the stored one.
    pub fn api_key(&self) -> Option<String> {
        self.resolve_api_key(std::env::var(API_KEY_ENV).ok().as_deref())
    }

    fn resolve_api_key(&self, from_env: Option<&str>) -> Option<String> {
        from_env
            .filter(|key| !key.trim().is_empty())
            .map(str::to_owned)
            .or_else(|| self.api_key.clone().filter(|key| !key.trim().is_empty()))
    }

    pub fn base_url(&self) -> &str {
        self.base_url.as_deref().unwrap_or(DEFAULT_BASE_URL)
    }

    pub fn timeout(&self) -> Duration {
        self.timeout_secs
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_TIMEOUT)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        let defaults = RetryPolicy::default();
        RetryPolicy {
            max_attempts: self.retry.max_attempts.unwrap_or(defaults.max_attempts),
            base_delay: self
                .retry
                .base_delay_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.base_delay),
            max_delay: self
                .retry
                .max_delay_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.max_delay),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_public_service() {
        let cfg = Config::default();

        assert_eq!(cfg.base_url(), "https://api.breezometer.com/");
        assert_eq!(cfg.timeout(), Duration::from_secs(60));
        assert_eq!(cfg.retry_policy(), RetryPolicy::default());
        assert_eq!(cfg.retry_policy().max_attempts, 10);
    }

    #[test]
    fn env_key_overrides_stored_key() {
        let mut cfg = Config::default();
        assert_eq!(cfg.resolve_api_key(None), None);

        cfg.set_api_key("STORED".into());
        assert_eq!(cfg.resolve_api_key(None).as_deref(), Some("STORED"));
        assert_eq!(cfg.resolve_api_key(Some("ENV")).as_deref(), Some("ENV"));
        assert_eq!(cfg.resolve_api_key(Some("  ")).as_deref(), Some("STORED"));
    }

    #[test]
    fn parses_partial_toml() {
        let cfg: Config = toml::from_str(
            r#"
            api_key = "abc"
            timeout_secs = 5

            [retry]
            max_attempts = 3
            max_delay_ms = 400

            [headers]
            X-Request-Source = "dashboard"
            "#,
        )
        .unwrap();

        assert_eq!(cfg.timeout(), Duration::from_secs(5));
        let policy = cfg.retry_policy();
        assert_eq!(policy.max_attempts, 3);
        assert_eq!(policy.base_delay, Duration::from_millis(50));
        assert_eq!(policy.max_delay, Duration::from_millis(400));
        assert_eq!(cfg.headers.get("X-Request-Source").map(String::as_str), Some("dashboard"));
    }

    #[test]
    fn save_then_load_from_disk() {
        let dir = std::env::temp_dir().join(format!("breezometer-config-{}", std::process::id()));
        let path = dir.join("nested").join("config.toml");

        let mut cfg = Config::default();
        cfg.set_api_key("KEY".into());
        cfg.base_url = Some("http://localhost:8080/".into());
        cfg.save_to(&path).unwrap();

        let loaded = Config::load_from(&path).unwrap();
        assert_eq!(loaded, cfg);

        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn missing_file_loads_defaults() {
        let path = std::env::temp_dir().join("breezometer-does-not-exist").join("config.toml");
        assert_eq!(Config::load_from(&path).unwrap(), Config::default());
    }
}
