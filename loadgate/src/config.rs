//! Configuration module for loadgate.
//!
//! Every setting has a default, so [`Config::default`] is always usable.
//! [`Config::from_env`] overrides the defaults from environment variables.
//!
//! # Environment Variables
//!
//! | Variable | Required | Default | Description |
//! |----------|----------|---------|-------------|
//! | `LOADGATE_FLASH_THRESHOLD_MS` | No | 2000 | Minimum active time before showing, and minimum visible time |
//! | `LOADGATE_COMBO_TIMEOUT_MS` | No | 3000 | Time allowed to finish the key combo, from its first key |
//! | `LOADGATE_COMBO_KEYS` | No | `a,s,d,f` | Comma-separated key combo |
//! | `LOADGATE_BUS_CAPACITY` | No | 1000 | Capacity of the task and key buses |
//!
//! # Example
//!
//! ```no_run
//! use loadgate::config::Config;
//!
//! let config = Config::from_env().expect("Failed to load configuration");
//! println!("Flash threshold: {:?}", config.flash_threshold);
//! ```

use std::env;
use std::time::Duration;

use thiserror::Error;

use crate::bus::DEFAULT_CHANNEL_CAPACITY;
use crate::combo::{DEFAULT_COMBO_KEYS, DEFAULT_COMBO_TIMEOUT_MS};
use crate::flash::DEFAULT_FLASH_THRESHOLD_MS;

const FLASH_THRESHOLD_VAR: &str = "LOADGATE_FLASH_THRESHOLD_MS";
const COMBO_TIMEOUT_VAR: &str = "LOADGATE_COMBO_TIMEOUT_MS";
const COMBO_KEYS_VAR: &str = "LOADGATE_COMBO_KEYS";
const BUS_CAPACITY_VAR: &str = "LOADGATE_BUS_CAPACITY";

/// Errors that can occur during configuration parsing.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// Environment variable has an invalid value.
    #[error("invalid value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    /// The combo key list is empty after trimming.
    #[error("{0} must name at least one key")]
    EmptyComboKeys(String),
}

/// Configuration for the loadgate pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Minimum active time before the indicator shows, and minimum time it
    /// stays visible once shown.
    pub flash_threshold: Duration,

    /// Time allowed to complete the key combo, measured from its first key.
    pub combo_timeout: Duration,

    /// Ordered key symbols making up the combo.
    pub combo_keys: Vec<String>,

    /// Capacity of the task-signal and key buses.
    pub bus_capacity: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            flash_threshold: Duration::from_millis(DEFAULT_FLASH_THRESHOLD_MS),
            combo_timeout: Duration::from_millis(DEFAULT_COMBO_TIMEOUT_MS),
            combo_keys: DEFAULT_COMBO_KEYS.iter().map(|k| k.to_string()).collect(),
            bus_capacity: DEFAULT_CHANNEL_CAPACITY,
        }
    }
}

impl Config {
    /// Creates a new `Config` by parsing environment variables.
    ///
    /// Unset variables keep their defaults.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if:
    /// - A numeric variable is not a non-negative integer
    /// - `LOADGATE_COMBO_TIMEOUT_MS` or `LOADGATE_BUS_CAPACITY` is 0
    /// - `LOADGATE_COMBO_KEYS` contains no keys
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(ms) = parse_u64(FLASH_THRESHOLD_VAR)? {
            config.flash_threshold = Duration::from_millis(ms);
        }

        if let Some(ms) = parse_u64(COMBO_TIMEOUT_VAR)? {
            if ms == 0 {
                return Err(ConfigError::InvalidValue {
                    key: COMBO_TIMEOUT_VAR.to_string(),
                    message: "combo timeout must be greater than 0".to_string(),
                });
            }
            config.combo_timeout = Duration::from_millis(ms);
        }

        if let Ok(val) = env::var(COMBO_KEYS_VAR) {
            let keys: Vec<String> = val
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
            if keys.is_empty() {
                return Err(ConfigError::EmptyComboKeys(COMBO_KEYS_VAR.to_string()));
            }
            config.combo_keys = keys;
        }

        if let Some(capacity) = parse_u64(BUS_CAPACITY_VAR)? {
            if capacity == 0 {
                return Err(ConfigError::InvalidValue {
                    key: BUS_CAPACITY_VAR.to_string(),
                    message: "bus capacity must be greater than 0".to_string(),
                });
            }
            config.bus_capacity =
                usize::try_from(capacity).map_err(|_| ConfigError::InvalidValue {
                    key: BUS_CAPACITY_VAR.to_string(),
                    message: format!("capacity {capacity} is too large"),
                })?;
        }

        Ok(config)
    }

    /// Overrides the flash threshold (builder pattern).
    #[must_use]
    pub fn with_flash_threshold(mut self, threshold: Duration) -> Self {
        self.flash_threshold = threshold;
        self
    }

    /// Overrides the combo timeout (builder pattern).
    #[must_use]
    pub fn with_combo_timeout(mut self, timeout: Duration) -> Self {
        self.combo_timeout = timeout;
        self
    }

    /// Overrides the combo keys (builder pattern).
    #[must_use]
    pub fn with_combo_keys<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.combo_keys = keys.into_iter().map(Into::into).collect();
        self
    }
}

/// Reads an optional unsigned integer variable.
fn parse_u64(key: &str) -> Result<Option<u64>, ConfigError> {
    match env::var(key) {
        Ok(val) => val
            .trim()
            .parse::<u64>()
            .map(Some)
            .map_err(|_| ConfigError::InvalidValue {
                key: key.to_string(),
                message: format!("expected non-negative integer, got '{val}'"),
            }),
        Err(_) => Ok(None),
    }
}
