//! Common paths for threadwatch data storage
//!
//! All data is stored under ~/.config/threadwatch/ on all platforms:
//! - config.toml - User configuration
//! - threadwatch.sqlite - Pins, history, filters and thread cache

use anyhow::{Context, Result};
use std::fs;
use std::path::PathBuf;

/// Environment variable that overrides the data directory (used by tests and scripts)
pub const HOME_ENV: &str = "THREADWATCH_HOME";

/// Get the threadwatch data directory (~/.config/threadwatch/)
///
/// `THREADWATCH_HOME` takes precedence when set.
pub fn data_dir() -> Result<PathBuf> {
    let dir = if let Some(home) = std::env::var_os(HOME_ENV) {
        PathBuf::from(home)
    } else {
        let home = dirs::home_dir().context("Could not determine home directory")?;
        home.join(".config").join("threadwatch")
    };
    fs::create_dir_all(&dir).context("Failed to create threadwatch directory")?;
    Ok(dir)
}

/// Get the config file path (~/.config/threadwatch/config.toml)
pub fn config_path() -> Result<PathBuf> {
    Ok(data_dir()?.join("config.toml"))
}

/// Get the database file path (~/.config/threadwatch/threadwatch.sqlite)
pub fn database_path() -> Result<PathBuf> {
    Ok(data_dir()?.join("threadwatch.sqlite"))
}
