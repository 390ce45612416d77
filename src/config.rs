//! Configuration for ttyctl.
//!
//! This module provides:
//! - TOML configuration file loading from `~/.ttyctl/config.toml`
//! - Defaults for raw reads, size fallback, poll interruption and logging
//!
//! # Configuration File
//!
//! ```toml
//! [raw]
//! min_bytes = 1
//! timeout_tenths = 0
//! interrupt_chars_enabled = false
//!
//! [size]
//! fallback_rows = 24
//! fallback_columns = 80
//!
//! [poll]
//! # "retry", "retry-up-to" or "surface"
//! interrupt_policy = "retry"
//! max_retries = 3
//!
//! [log]
//! level = "ttyctl=info"
//! stderr = false
//! ```
//!
//! Every section and key is optional.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

use crate::core::mode::RawOptions;
use crate::core::poller::InterruptPolicy;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to access config file: {0}")]
    Io(#[from] io::Error),

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),
}

/// Main configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Defaults for `getch` and `with_raw`
    pub raw: RawOptions,
    pub size: SizeConfig,
    pub poll: PollConfig,
    pub log: LogConfig,
}

/// Window size fallback
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SizeConfig {
    pub fallback_rows: u16,
    pub fallback_columns: u16,
}

impl Default for SizeConfig {
    fn default() -> Self {
        Self {
            fallback_rows: 24,
            fallback_columns: 80,
        }
    }
}

/// Readiness wait settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PollConfig {
    pub interrupt_policy: String, // "retry", "retry-up-to", "surface"
    pub max_retries: u32,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interrupt_policy: "retry".to_string(),
            max_retries: 3,
        }
    }
}

impl PollConfig {
    pub fn policy(&self) -> InterruptPolicy {
        match self.interrupt_policy.to_lowercase().as_str() {
            "retry" => InterruptPolicy::Retry,
            "retry-up-to" | "retry_up_to" => InterruptPolicy::RetryUpTo(self.max_retries),
            "surface" => InterruptPolicy::Surface,
            other => {
                warn!("Unknown interrupt policy {:?}, using retry", other);
                InterruptPolicy::Retry
            }
        }
    }
}

/// Logging settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// `EnvFilter` directive; `RUST_LOG` overrides it
    pub level: String,
    /// Log file; `~/.ttyctl/ttyctl.log` when unset
    pub file: Option<PathBuf>,
    /// Log to stderr instead of a file
    pub stderr: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "ttyctl=info".to_string(),
            file: None,
            stderr: false,
        }
    }
}

impl LogConfig {
    /// Resolved log file path
    pub fn file_path(&self) -> PathBuf {
        self.file.clone().unwrap_or_else(|| {
            config_dir()
                .map(|d| d.join("ttyctl.log"))
                .unwrap_or_else(|| PathBuf::from("ttyctl.log"))
        })
    }
}

impl Config {
    /// Load configuration from `~/.ttyctl/config.toml`, falling back to
    /// defaults when the file is missing or malformed.
    pub fn load() -> Self {
        if let Some(path) = Self::config_path() {
            if path.exists() {
                match Self::load_from(&path) {
                    Ok(config) => return config,
                    Err(e) => warn!("Ignoring {}: {}", path.display(), e),
                }
            }
        }
        Self::default()
    }

    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// Save configuration to file
    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        let content = toml::to_string_pretty(self)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, content)?;
        Ok(())
    }

    /// Get config file path
    pub fn config_path() -> Option<PathBuf> {
        config_dir().map(|d| d.join("config.toml"))
    }
}

fn config_dir() -> Option<PathBuf> {
    home_dir().map(|h| h.join(".ttyctl"))
}

// Get home directory
fn home_dir() -> Option<PathBuf> {
    std::env::var_os("USERPROFILE")
        .or_else(|| std::env::var_os("HOME"))
        .map(PathBuf::from)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.raw, RawOptions::default());
        assert_eq!(config.size.fallback_rows, 24);
        assert_eq!(config.size.fallback_columns, 80);
        assert_eq!(config.poll.policy(), InterruptPolicy::Retry);
        assert_eq!(config.log.level, "ttyctl=info");
        assert!(!config.log.stderr);
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let config = Config::from_toml_str(
            r#"
            [raw]
            timeout_tenths = 5

            [poll]
            interrupt_policy = "retry-up-to"
            max_retries = 2
            "#,
        )
        .unwrap();
        assert_eq!(config.raw.timeout_tenths, 5);
        assert_eq!(config.raw.min_bytes, 1);
        assert_eq!(config.poll.policy(), InterruptPolicy::RetryUpTo(2));
        assert_eq!(config.size, SizeConfig::default());
        assert_eq!(config.log, LogConfig::default());
    }

    #[test]
    fn test_policy_names() {
        let mut poll = PollConfig::default();
        poll.interrupt_policy = "Surface".to_string();
        assert_eq!(poll.policy(), InterruptPolicy::Surface);
        poll.interrupt_policy = "sometimes".to_string();
        assert_eq!(poll.policy(), InterruptPolicy::Retry);
    }

    #[test]
    fn test_malformed_file_is_an_error() {
        assert!(matches!(
            Config::from_toml_str("[raw]\nmin_bytes = \"many\""),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let mut config = Config::default();
        config.raw = RawOptions::timeout(3).with_interrupts(true);
        config.size.fallback_columns = 132;
        config.log.file = Some(dir.path().join("trace.log"));
        config.save_to(&path).unwrap();

        let loaded = Config::load_from(&path).unwrap();
        assert_eq!(loaded, config);
        assert_eq!(loaded.log.file_path(), dir.path().join("trace.log"));
    }

    #[test]
    fn test_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            Config::load_from(&dir.path().join("absent.toml")),
            Err(ConfigError::Io(_))
        ));
    }
}
