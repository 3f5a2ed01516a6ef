//! # Monitor configuration
//!
//! Settings are persisted as pretty-printed JSON.  Every field has a
//! default, so a partial file (or no file at all) is a valid
//! configuration.
//!
//! ```json
//! {
//!   "databasePath": "/home/me/.local/share/alarm-monitor/alarm_history.db",
//!   "serial": { "baudRate": 9600, "pollIntervalMs": 100, "readTimeoutMs": 1000 },
//!   "historyLimit": 100,
//!   "seedStateFromStore": false,
//!   "logLevel": "info"
//! }
//! ```

use amon_serial::serial::{ReaderConfig, DEFAULT_BAUD_RATE};
use amon_store::store::StoreConfig;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

const APP_DIR: &str = "alarm-monitor";
const DATABASE_FILE: &str = "alarm_history.db";
const CONFIG_FILE: &str = "config.json";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to write config {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to serialise config: {0}")]
    Serialize(#[from] serde_json::Error),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SerialSettings {
    pub baud_rate: u32,
    #[serde(flatten)]
    pub reader: ReaderConfig,
}

impl Default for SerialSettings {
    fn default() -> Self {
        Self {
            baud_rate: DEFAULT_BAUD_RATE,
            reader: ReaderConfig::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MonitorConfig {
    pub database_path: PathBuf,
    pub serial: SerialSettings,
    /// Events shown by `recent_history`.
    pub history_limit: u32,
    /// Buffered notifications per subscriber before the slowest one lags.
    pub notification_capacity: usize,
    /// Start in the state implied by the newest stored event instead of
    /// `Idle`.
    pub seed_state_from_store: bool,
    /// Default filter directive; `RUST_LOG` takes precedence.
    pub log_level: String,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            serial: SerialSettings::default(),
            history_limit: 100,
            notification_capacity: 256,
            seed_state_from_store: false,
            log_level: "info".to_string(),
        }
    }
}

impl MonitorConfig {
    /// Load `path`, falling back to defaults when it does not exist.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            log::debug!("No config at {}, using defaults", path.display());
            return Ok(Self::default());
        }
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Load `path` if given, else the per-user default location.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(path) => Self::load(path),
            None => Self::load(&default_config_path()),
        }
    }

    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let json = serde_json::to_string_pretty(self)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|source| ConfigError::Write {
                path: path.to_path_buf(),
                source,
            })?;
        }
        fs::write(path, json).map_err(|source| ConfigError::Write {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn store_config(&self) -> StoreConfig {
        StoreConfig::file(&self.database_path)
    }
}

fn app_dir(base: Option<PathBuf>) -> PathBuf {
    base.unwrap_or_else(|| PathBuf::from(".")).join(APP_DIR)
}

pub fn default_database_path() -> PathBuf {
    app_dir(dirs::data_dir()).join(DATABASE_FILE)
}

pub fn default_config_path() -> PathBuf {
    app_dir(dirs::config_dir()).join(CONFIG_FILE)
}
