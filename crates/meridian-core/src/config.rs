//! Application configuration
//!
//! Configuration is loaded from:
//! 1. Default values
//! 2. Config file (~/.config/meridian/config.toml)
//! 3. Environment variables (MERIDIAN_* prefix)
//!
//! Environment variables take precedence over config file values.
//!
//! Credentials are not part of the config file; they live in their own
//! durable slot under `data_dir` (see [`crate::storage::FileStore`]).
//! `MERIDIAN_TOKEN` can supply a token for one session without storing it.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

/// Environment variable prefix
const ENV_PREFIX: &str = "MERIDIAN";

/// Default collection endpoint of the remote document store
pub const DEFAULT_REMOTE_URL: &str = "https://api.github.com/gists";

/// Default size limit of the local durable slot (5 MiB)
pub const DEFAULT_LOCAL_CAPACITY: usize = 5 * 1024 * 1024;

/// Application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Directory holding the dataset and credential slots
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Collection URL of the remote document store
    #[serde(default = "default_remote_url")]
    pub remote_url: String,

    /// Whether remote sync may be used when a token is present
    #[serde(default = "default_true")]
    pub sync_enabled: bool,

    /// Size limit of the local dataset slot in bytes
    #[serde(default = "default_local_capacity")]
    pub local_capacity_bytes: usize,

    /// Log file for long-running mode (default: {data_dir}/debug.log)
    #[serde(default)]
    pub log_file: Option<PathBuf>,

    /// Timer settings
    #[serde(default)]
    pub timing: Timing,

    /// Session-only token from MERIDIAN_TOKEN; never written to disk
    #[serde(skip)]
    pub token_override: Option<String>,
}

/// Debounce, dwell and polling intervals
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Timing {
    /// Quiet window that collapses bursts of save requests
    pub debounce_ms: u64,
    /// How long `saved` is shown before settling
    pub saved_dwell_ms: u64,
    /// How long `error` is shown before settling
    pub error_dwell_ms: u64,
    /// Remote refresh interval while sync is enabled
    pub remote_poll_secs: u64,
    /// Local autosave interval while sync is disabled
    pub local_poll_secs: u64,
    /// Upper bound on a single remote request
    pub request_timeout_secs: u64,
}

impl Default for Timing {
    fn default() -> Self {
        Self {
            debounce_ms: 1_000,
            saved_dwell_ms: 3_000,
            error_dwell_ms: 5_000,
            remote_poll_secs: 60,
            local_poll_secs: 30,
            request_timeout_secs: 30,
        }
    }
}

impl Timing {
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub fn saved_dwell(&self) -> Duration {
        Duration::from_millis(self.saved_dwell_ms)
    }

    pub fn error_dwell(&self) -> Duration {
        Duration::from_millis(self.error_dwell_ms)
    }

    /// Poll interval for the current sync mode, never shorter than one second
    pub fn poll_interval(&self, remote_enabled: bool) -> Duration {
        let secs = if remote_enabled {
            self.remote_poll_secs
        } else {
            self.local_poll_secs
        };
        Duration::from_secs(secs.max(1))
    }

    /// Reject intervals that would make a timer fire continuously
    pub fn validate(&self) -> Result<()> {
        for (key, value) in [
            ("remote_poll_secs", self.remote_poll_secs),
            ("local_poll_secs", self.local_poll_secs),
            ("request_timeout_secs", self.request_timeout_secs),
        ] {
            if value == 0 {
                bail!("timing.{} must be greater than zero", key);
            }
        }
        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            remote_url: default_remote_url(),
            sync_enabled: true,
            local_capacity_bytes: DEFAULT_LOCAL_CAPACITY,
            log_file: None,
            timing: Timing::default(),
            token_override: None,
        }
    }
}

impl Config {
    /// Load configuration from default location and environment
    ///
    /// Order of precedence (highest to lowest):
    /// 1. Environment variables (MERIDIAN_DATA_DIR, MERIDIAN_REMOTE_URL, ...)
    /// 2. Config file (~/.config/meridian/config.toml or MERIDIAN_CONFIG)
    /// 3. Default values
    pub fn load() -> Result<Self> {
        Self::load_from_path(&Self::config_file_path())
    }

    /// Load configuration, preferring an explicit path from the CLI
    pub fn load_with_cli_override(path: Option<&PathBuf>) -> Result<Self> {
        match path {
            Some(path) => Self::load_from_path(path),
            None => Self::load(),
        }
    }

    /// Load configuration from a specific path
    ///
    /// Environment variables are still applied as overrides.
    /// If the file doesn't exist, defaults are used.
    pub fn load_from_path(path: &Path) -> Result<Self> {
        let mut config = if path.exists() {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {:?}", path))?;
            toml::from_str(&content)
                .with_context(|| format!("Failed to parse config file: {:?}", path))?
        } else {
            Self::default()
        };

        config
            .timing
            .validate()
            .with_context(|| format!("Invalid config file: {:?}", path))?;
        config.apply_env_overrides();
        config.ensure_data_dir()?;
        Ok(config)
    }

    /// Load configuration from a TOML string (useful for testing)
    pub fn load_from_str(toml_content: &str) -> Result<Self> {
        let mut config: Config =
            toml::from_str(toml_content).context("Failed to parse config TOML")?;
        config.timing.validate()?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Configuration rooted at a specific data directory, ignoring the
    /// environment
    pub fn with_data_dir(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            ..Self::default()
        }
    }

    /// Apply environment variable overrides
    fn apply_env_overrides(&mut self) {
        // MERIDIAN_DATA_DIR
        if let Ok(val) = std::env::var(format!("{}_DATA_DIR", ENV_PREFIX)) {
            self.data_dir = PathBuf::from(val);
        }

        // MERIDIAN_REMOTE_URL
        if let Ok(val) = std::env::var(format!("{}_REMOTE_URL", ENV_PREFIX)) {
            if !val.is_empty() {
                self.remote_url = val;
            }
        }

        // MERIDIAN_SYNC_ENABLED
        if let Ok(val) = std::env::var(format!("{}_SYNC_ENABLED", ENV_PREFIX)) {
            self.sync_enabled = val.eq_ignore_ascii_case("true") || val == "1";
        }

        // MERIDIAN_TOKEN
        if let Ok(val) = std::env::var(format!("{}_TOKEN", ENV_PREFIX)) {
            let val = val.trim().to_string();
            self.token_override = (!val.is_empty()).then_some(val);
        }
    }

    /// Ensure data directory exists
    fn ensure_data_dir(&self) -> Result<()> {
        if !self.data_dir.exists() {
            std::fs::create_dir_all(&self.data_dir)
                .with_context(|| format!("Failed to create data directory: {:?}", self.data_dir))?;
        }
        Ok(())
    }

    /// Save configuration to the default file
    pub fn save(&self) -> Result<()> {
        self.save_to_path(&Self::config_file_path())
    }

    /// Save configuration to a specific file
    pub fn save_to_path(&self, config_path: &Path) -> Result<()> {
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create config directory: {:?}", parent))?;
        }

        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;
        std::fs::write(config_path, content)
            .with_context(|| format!("Failed to write config file: {:?}", config_path))?;
        Ok(())
    }

    /// Get the config file path
    ///
    /// Can be overridden with MERIDIAN_CONFIG environment variable
    pub fn config_file_path() -> PathBuf {
        if let Ok(path) = std::env::var(format!("{}_CONFIG", ENV_PREFIX)) {
            return PathBuf::from(path);
        }

        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("meridian")
            .join("config.toml")
    }

    /// Path of the dataset slot
    pub fn dataset_path(&self) -> PathBuf {
        self.data_dir.join("meridian-todo-data.json")
    }

    /// Path of the size-capped fallback slot
    pub fn fallback_path(&self) -> PathBuf {
        self.data_dir.join("meridian-todo-fallback.json")
    }

    /// Path of the credential slot
    pub fn credentials_path(&self) -> PathBuf {
        self.data_dir.join("sync-settings.json")
    }

    /// Log file path for long-running mode
    pub fn log_path(&self) -> PathBuf {
        self.log_file
            .clone()
            .unwrap_or_else(|| self.data_dir.join("debug.log"))
    }
}

/// Get the default data directory
fn default_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("meridian")
}

fn default_remote_url() -> String {
    DEFAULT_REMOTE_URL.to_string()
}

fn default_local_capacity() -> usize {
    DEFAULT_LOCAL_CAPACITY
}

fn default_true() -> bool {
    true
}
