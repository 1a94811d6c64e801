//! Process configuration for the clinic core.
//!
//! # Responsibility
//! - Load core settings (logging, lock waits, cascade rules) from JSON.
//! - Turn configured cascade rules into a validated `DependencyCatalog`.
//!
//! # Invariants
//! - Configuration is read once at process start; nothing here is mutated later.
//! - A missing `cascade_rules` key selects the built-in clinic catalog.

use crate::cascade::catalog::{CascadeRule, CatalogError, DependencyCatalog};
use crate::logging::{default_log_level, init_logging, normalize_level, LoggingError};
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::{Path, PathBuf};
use std::time::Duration;

const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;
const MAX_BUSY_TIMEOUT_MS: u64 = 10 * 60 * 1_000;

/// Errors from loading or applying configuration.
#[derive(Debug)]
pub enum ConfigError {
    /// Config file could not be read.
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    /// Config text is not valid JSON for `CoreConfig`.
    Parse(serde_json::Error),
    /// Configured log level is not one of `trace|debug|info|warn|error`.
    InvalidLogLevel(String),
    /// Busy timeout must be positive and bounded.
    InvalidBusyTimeout(u64),
    /// Configured cascade rules do not form a valid catalog.
    Catalog(CatalogError),
    /// Logging could not be started with the configured level and directory.
    Logging(LoggingError),
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io { path, source } => {
                write!(f, "failed to read config `{}`: {source}", path.display())
            }
            Self::Parse(err) => write!(f, "invalid config: {err}"),
            Self::InvalidLogLevel(level) => write!(f, "invalid log level in config: `{level}`"),
            Self::InvalidBusyTimeout(value) => write!(
                f,
                "busy_timeout_ms must be between 1 and {MAX_BUSY_TIMEOUT_MS}, got {value}"
            ),
            Self::Catalog(err) => write!(f, "invalid cascade rules: {err}"),
            Self::Logging(err) => write!(f, "{err}"),
        }
    }
}

impl Error for ConfigError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            Self::Parse(err) => Some(err),
            Self::Catalog(err) => Some(err),
            Self::Logging(err) => Some(err),
            Self::InvalidLogLevel(_) | Self::InvalidBusyTimeout(_) => None,
        }
    }
}

impl From<serde_json::Error> for ConfigError {
    fn from(value: serde_json::Error) -> Self {
        Self::Parse(value)
    }
}

impl From<CatalogError> for ConfigError {
    fn from(value: CatalogError) -> Self {
        Self::Catalog(value)
    }
}

/// Core settings, deserialized from JSON.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CoreConfig {
    /// Log level for the file logger.
    pub log_level: String,
    /// Absolute log directory. `None` leaves logging uninitialized.
    pub log_dir: Option<String>,
    /// Upper bound for waiting on a locked database, in milliseconds.
    pub busy_timeout_ms: u64,
    /// Cascade rules replacing the built-in clinic catalog when present.
    pub cascade_rules: Option<Vec<CascadeRule>>,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level().to_string(),
            log_dir: None,
            busy_timeout_ms: DEFAULT_BUSY_TIMEOUT_MS,
            cascade_rules: None,
        }
    }
}

impl CoreConfig {
    /// Parses and validates configuration from JSON text.
    pub fn from_json_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses and validates a JSON configuration file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&text)
    }

    /// Checks field-level constraints not expressible in serde.
    pub fn validate(&self) -> Result<(), ConfigError> {
        normalize_level(&self.log_level)
            .map_err(|_| ConfigError::InvalidLogLevel(self.log_level.clone()))?;
        if self.busy_timeout_ms == 0 || self.busy_timeout_ms > MAX_BUSY_TIMEOUT_MS {
            return Err(ConfigError::InvalidBusyTimeout(self.busy_timeout_ms));
        }
        Ok(())
    }

    /// Busy timeout as a `Duration`.
    pub fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.busy_timeout_ms)
    }

    /// Builds the dependency catalog selected by this configuration.
    pub fn build_catalog(&self) -> Result<DependencyCatalog, ConfigError> {
        match self.cascade_rules.as_deref() {
            Some(rules) => Ok(DependencyCatalog::from_rules(rules)?),
            None => Ok(DependencyCatalog::clinic_default()),
        }
    }

    /// Starts file logging when `log_dir` is configured.
    ///
    /// Returns `Ok(false)` when no directory is configured.
    pub fn init_logging(&self) -> Result<bool, ConfigError> {
        let Some(log_dir) = self.log_dir.as_deref() else {
            return Ok(false);
        };
        init_logging(&self.log_level, log_dir).map_err(ConfigError::Logging)?;
        Ok(true)
    }
}
