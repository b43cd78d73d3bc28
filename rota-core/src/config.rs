//! Configuration management for Rota
//!
//! Configuration is loaded with the following priority (highest to lowest):
//! 1. CLI flags
//! 2. Environment variables (ROTA_*)
//! 3. Config file (~/.config/rota/config.toml)
//! 4. Default values

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Reviewer count an open pull request is topped back up to after healing
pub const DEFAULT_MIN_REVIEWERS: usize = 2;

/// Reviewers requested when a pull request is created
pub const DEFAULT_REVIEWERS_PER_PULL_REQUEST: usize = 2;

/// Database settings
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DatabaseSettings {
    /// Path to the SQLite database file
    pub path: PathBuf,

    /// Maximum number of pooled connections
    pub max_connections: u32,

    /// How long a writer waits on a locked database
    #[serde(with = "humantime_serde")]
    pub busy_timeout: Duration,
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        Self {
            path: default_database_path(),
            max_connections: 5,
            busy_timeout: Duration::from_secs(5),
        }
    }
}

/// Reviewer assignment policy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct AssignmentConfig {
    /// Reviewers auto-assigned on pull request creation
    pub reviewers_per_pull_request: usize,

    /// Target reviewer count for cascade top-up
    pub min_reviewers: usize,
}

impl Default for AssignmentConfig {
    fn default() -> Self {
        Self {
            reviewers_per_pull_request: DEFAULT_REVIEWERS_PER_PULL_REQUEST,
            min_reviewers: DEFAULT_MIN_REVIEWERS,
        }
    }
}

/// Per-operation limits
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct OperationConfig {
    /// Deadline applied to each engine operation
    #[serde(with = "humantime_serde")]
    pub timeout: Option<Duration>,
}

/// Log output format
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Full,
    Compact,
}

/// Logging settings
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter directive when RUST_LOG is unset
    pub level: String,

    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Full,
        }
    }
}

/// Root configuration structure
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    pub database: DatabaseSettings,
    pub assignment: AssignmentConfig,
    pub operation: OperationConfig,
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from the default config file location
    ///
    /// Returns default config if file doesn't exist
    pub fn load() -> Result<Self> {
        if let Some(path) = Self::default_config_path() {
            if path.exists() {
                return Self::load_from_file(&path);
            }
        }

        Ok(Self::default())
    }

    /// Load configuration from a specific file
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        toml::from_str(&contents)
            .map_err(|e| Error::Config(format!("Failed to parse config: {}", e)))
    }

    /// Get the default config file path
    ///
    /// Returns `~/.config/rota/config.toml` on Unix
    pub fn default_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("rota").join("config.toml"))
    }

    /// Apply environment variable overrides
    ///
    /// Supported variables:
    /// - ROTA_DATABASE: Path to the SQLite database
    /// - ROTA_REVIEWERS: Reviewers per new pull request
    /// - ROTA_MIN_REVIEWERS: Cascade top-up target
    /// - ROTA_TIMEOUT: Operation deadline (e.g. "3s")
    /// - ROTA_LOG: Default log filter
    pub fn with_env_overrides(mut self) -> Result<Self> {
        if let Ok(path) = std::env::var("ROTA_DATABASE") {
            self.database.path = PathBuf::from(path);
        }

        if let Ok(reviewers) = std::env::var("ROTA_REVIEWERS") {
            self.assignment.reviewers_per_pull_request = parse_count("ROTA_REVIEWERS", &reviewers)?;
        }

        if let Ok(min) = std::env::var("ROTA_MIN_REVIEWERS") {
            self.assignment.min_reviewers = parse_count("ROTA_MIN_REVIEWERS", &min)?;
        }

        if let Ok(timeout) = std::env::var("ROTA_TIMEOUT") {
            let parsed = humantime_serde::re::humantime::parse_duration(&timeout)
                .map_err(|e| Error::Config(format!("ROTA_TIMEOUT: {}", e)))?;
            self.operation.timeout = Some(parsed);
        }

        if let Ok(level) = std::env::var("ROTA_LOG") {
            self.logging.level = level;
        }

        Ok(self)
    }

    /// Apply CLI flag overrides
    pub fn with_cli_overrides(mut self, database: Option<PathBuf>, timeout: Option<Duration>) -> Self {
        if let Some(path) = database {
            self.database.path = path;
        }

        if let Some(t) = timeout {
            self.operation.timeout = Some(t);
        }

        self
    }

    /// Load configuration with all overrides applied
    ///
    /// Priority: CLI > env > config file > defaults
    pub fn load_with_overrides(database: Option<PathBuf>, timeout: Option<Duration>) -> Result<Self> {
        Ok(Self::load()?
            .with_env_overrides()?
            .with_cli_overrides(database, timeout))
    }
}

/// Default database location (`~/.cache/rota/rota.db`)
pub fn default_database_path() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("rota")
        .join("rota.db")
}

fn parse_count(var: &str, value: &str) -> Result<usize> {
    value
        .parse()
        .map_err(|e| Error::Config(format!("{}: {}", var, e)))
}
