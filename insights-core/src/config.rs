//! Configuration loading and management
//!
//! Configuration is loaded from `~/.config/insights/config.toml`
//!
//! This module follows the XDG Base Directory Specification:
//! - Config: `$XDG_CONFIG_HOME/insights/` (~/.config/insights/)
//! - Data: `$XDG_DATA_HOME/insights/` (~/.local/share/insights/)
//! - State/Logs: `$XDG_STATE_HOME/insights/` (~/.local/state/insights/)

use crate::error::{Error, Result};
use chrono_tz::Tz;
use serde::Deserialize;
use std::path::{Path, PathBuf};

const APP_DIR: &str = "insights";

/// Returns a best-effort home directory path.
fn home_dir() -> PathBuf {
    std::env::var_os("HOME")
        .map(PathBuf::from)
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."))
}

fn xdg_dir(var: &str, fallback: &str) -> PathBuf {
    std::env::var_os(var)
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
        .unwrap_or_else(|| home_dir().join(fallback))
}

/// Main configuration struct
#[derive(Debug, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub paging: PagingConfig,

    #[serde(default)]
    pub timezone: TimezoneConfig,

    #[serde(default)]
    pub database: DatabaseConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

// ============================================
// Paging
// ============================================

/// Page size rules applied to raw request parameters.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
pub struct PagingConfig {
    /// Page size used when the caller gives none (or a negative one)
    #[serde(default = "default_per_page")]
    pub default_per_page: u32,

    /// Larger requested page sizes are clamped to this
    #[serde(default = "default_max_per_page")]
    pub max_per_page: u32,
}

impl Default for PagingConfig {
    fn default() -> Self {
        Self {
            default_per_page: default_per_page(),
            max_per_page: default_max_per_page(),
        }
    }
}

fn default_per_page() -> u32 {
    60
}

fn default_max_per_page() -> u32 {
    200
}

impl PagingConfig {
    /// Turn raw `page` / `per_page` parameters into usable values.
    ///
    /// Missing or negative pages become 0. Missing or negative page sizes
    /// become the default; oversized ones are clamped. A page size of zero is
    /// passed through so query options can reject it.
    pub fn normalize(&self, page: Option<i64>, per_page: Option<i64>) -> (u32, u32) {
        let page = page
            .filter(|p| *p >= 0)
            .map_or(0, |p| u32::try_from(p).unwrap_or(u32::MAX));

        let per_page = match per_page {
            Some(n) if n >= 0 => u32::try_from(n)
                .unwrap_or(u32::MAX)
                .min(self.max_per_page),
            _ => self.default_per_page,
        };

        (page, per_page)
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_per_page == 0 {
            return Err(Error::Config(
                "paging.max_per_page must be greater than zero".to_string(),
            ));
        }
        if self.default_per_page == 0 || self.default_per_page > self.max_per_page {
            return Err(Error::Config(format!(
                "paging.default_per_page must be between 1 and {}",
                self.max_per_page
            )));
        }
        Ok(())
    }
}

// ============================================
// Timezone, database, logging
// ============================================

/// Timezone used when a caller has no usable preference.
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct TimezoneConfig {
    /// IANA zone name
    #[serde(default = "default_timezone")]
    pub default: String,
}

impl Default for TimezoneConfig {
    fn default() -> Self {
        Self {
            default: default_timezone(),
        }
    }
}

fn default_timezone() -> String {
    "UTC".to_string()
}

impl TimezoneConfig {
    /// Parse the configured zone.
    pub fn zone(&self) -> Result<Tz> {
        self.default.parse::<Tz>().map_err(|e| {
            Error::Config(format!("timezone.default {:?} is not valid: {}", self.default, e))
        })
    }
}

/// Activity store location.
#[derive(Debug, Deserialize, Clone, Default, PartialEq, Eq)]
pub struct DatabaseConfig {
    /// Overrides the default database path
    pub path: Option<PathBuf>,
}

/// Logging configuration
#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Maximum number of log files to keep
    #[serde(default = "default_max_log_files")]
    pub max_files: usize,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            max_files: default_max_log_files(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_max_log_files() -> usize {
    5
}

impl Config {
    /// Load configuration from the default path
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path();

        if !config_path.exists() {
            tracing::info!("No config file found at {:?}, using defaults", config_path);
            return Ok(Config::default());
        }

        Self::load_from(&config_path)
    }

    /// Load configuration from a specific path
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("failed to read config file {:?}: {}", path, e)))?;

        let config: Config = toml::from_str(&content)
            .map_err(|e| Error::Config(format!("failed to parse config: {}", e)))?;

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.paging.validate()?;
        self.timezone.zone()?;
        Ok(())
    }

    /// Returns the default config file path
    ///
    /// `$XDG_CONFIG_HOME/insights/config.toml` (~/.config/insights/config.toml)
    pub fn config_path() -> PathBuf {
        xdg_dir("XDG_CONFIG_HOME", ".config")
            .join(APP_DIR)
            .join("config.toml")
    }

    /// Returns the data directory path (for SQLite database)
    pub fn data_dir() -> PathBuf {
        xdg_dir("XDG_DATA_HOME", ".local/share").join(APP_DIR)
    }

    /// Returns the state directory path (for logs)
    pub fn state_dir() -> PathBuf {
        xdg_dir("XDG_STATE_HOME", ".local/state").join(APP_DIR)
    }

    /// Database file to open: the configured override or
    /// `$XDG_DATA_HOME/insights/activity.db`.
    pub fn database_path(&self) -> PathBuf {
        self.database
            .path
            .clone()
            .unwrap_or_else(|| Self::data_dir().join("activity.db"))
    }

    /// Returns the log file path
    ///
    /// `$XDG_STATE_HOME/insights/insights.log`
    pub fn log_path() -> PathBuf {
        Self::state_dir().join("insights.log")
    }
}
