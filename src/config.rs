//! Configuration module for threadwatch

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::paths;

/// Which pins count as "unread" for notification purposes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotifyMode {
    /// Any new post in a watched thread
    #[default]
    AllPosts,
    /// Only posts quoting one of your saved replies
    OnlyQuotes,
}

/// Application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// User agent sent with every request
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// HTTP request timeout in seconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Master switch for thread watching
    #[serde(default = "default_watch_enabled")]
    pub watch_enabled: bool,

    /// Keep watching while the app is in the background
    #[serde(default)]
    pub watch_background: bool,

    /// Background watch interval in seconds
    #[serde(default = "default_background_interval")]
    pub watch_background_interval_secs: u64,

    /// Foreground watch tick in seconds
    #[serde(default = "default_foreground_interval")]
    pub watch_foreground_interval_secs: u64,

    /// What counts as unread
    #[serde(default)]
    pub watch_notify_mode: NotifyMode,

    /// Site used when a command omits one
    #[serde(default = "default_site")]
    pub default_site: String,

    /// Cached thread snapshots older than this are pruned on startup
    #[serde(default = "default_thread_cache_max_age")]
    pub thread_cache_max_age_hours: u64,
}

fn default_user_agent() -> String {
    format!("threadwatch/{}", env!("CARGO_PKG_VERSION"))
}

fn default_request_timeout() -> u64 {
    30
}

fn default_watch_enabled() -> bool {
    true
}

fn default_background_interval() -> u64 {
    15 * 60
}

fn default_foreground_interval() -> u64 {
    15
}

fn default_site() -> String {
    "4chan".to_string()
}

fn default_thread_cache_max_age() -> u64 {
    24 * 7
}

impl Default for Config {
    fn default() -> Self {
        Self {
            user_agent: default_user_agent(),
            request_timeout_secs: default_request_timeout(),
            watch_enabled: default_watch_enabled(),
            watch_background: false,
            watch_background_interval_secs: default_background_interval(),
            watch_foreground_interval_secs: default_foreground_interval(),
            watch_notify_mode: NotifyMode::default(),
            default_site: default_site(),
            thread_cache_max_age_hours: default_thread_cache_max_age(),
        }
    }
}

impl Config {
    /// Get the default config file path
    pub fn default_path() -> Result<PathBuf> {
        paths::config_path()
    }

    /// Load config from the default path or create default
    pub fn load() -> Result<Self> {
        let path = Self::default_path()?;
        Self::load_from(&path)
    }

    /// Load config from a specific path
    pub fn load_from(path: &Path) -> Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path).context("Failed to read config file")?;
            toml::from_str(&content).context("Failed to parse config file")
        } else {
            Ok(Self::default())
        }
    }

    /// Save config to the default path
    pub fn save(&self) -> Result<()> {
        let path = Self::default_path()?;
        self.save_to(&path)
    }

    /// Save config to a specific path
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).context("Failed to create config directory")?;
        }

        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;
        std::fs::write(path, content).context("Failed to write config file")?;

        Ok(())
    }

    /// Request timeout as a `Duration`
    pub const fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Foreground tick as a `Duration` (never shorter than one second)
    pub fn foreground_interval(&self) -> Duration {
        Duration::from_secs(self.watch_foreground_interval_secs.max(1))
    }

    /// Background tick as a `Duration` (never shorter than one minute)
    pub fn background_interval(&self) -> Duration {
        Duration::from_secs(self.watch_background_interval_secs.max(60))
    }

    /// Build the HTTP client every loader shares
    pub fn http_client(&self) -> Result<reqwest::Client> {
        reqwest::Client::builder()
            .user_agent(&self.user_agent)
            .timeout(self.request_timeout())
            .build()
            .context("Failed to build HTTP client")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempdir().unwrap();
        let config = Config::load_from(&dir.path().join("nope.toml")).unwrap();
        assert!(config.watch_enabled);
        assert_eq!(config.watch_background_interval_secs, 900);
        assert_eq!(config.watch_notify_mode, NotifyMode::AllPosts);
    }

    #[test]
    fn partial_file_fills_in_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            "watch_background = true\nwatch_notify_mode = \"only_quotes\"\n",
        )
        .unwrap();

        let config = Config::load_from(&path).unwrap();
        assert!(config.watch_background);
        assert_eq!(config.watch_notify_mode, NotifyMode::OnlyQuotes);
        assert_eq!(config.request_timeout_secs, 30);
        assert_eq!(config.default_site, "4chan");
    }

    #[test]
    fn save_then_load_keeps_values() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");
        let config = Config {
            watch_background_interval_secs: 1800,
            ..Config::default()
        };
        config.save_to(&path).unwrap();

        let loaded = Config::load_from(&path).unwrap();
        assert_eq!(loaded.watch_background_interval_secs, 1800);
    }

    #[test]
    fn background_interval_has_a_floor() {
        let config = Config {
            watch_background_interval_secs: 5,
            ..Config::default()
        };
        assert_eq!(config.background_interval(), Duration::from_secs(60));
    }
}
