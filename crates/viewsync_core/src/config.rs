//! Runtime configuration for reconciliation and publishing.
//!
//! # Invariants
//! - `page_size` and `index_write_attempts` are at least 1 after
//!   `validate()`.

use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::Path;

pub const DEFAULT_INDEX_ID: &str = "article-index";
pub const DEFAULT_PAGE_SIZE: usize = 10;
pub const DEFAULT_INDEX_WRITE_ATTEMPTS: u32 = 3;

/// Engine settings shared by the reconciler, consumer and publish service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SyncConfig {
    /// Key of the singleton index document.
    pub index_id: String,
    /// Slots per page when appending newly published articles.
    pub page_size: usize,
    /// Total conditional page-write attempts per event before giving up.
    pub index_write_attempts: u32,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            index_id: DEFAULT_INDEX_ID.to_string(),
            page_size: DEFAULT_PAGE_SIZE,
            index_write_attempts: DEFAULT_INDEX_WRITE_ATTEMPTS,
        }
    }
}

#[derive(Debug)]
pub enum ConfigError {
    Io(std::io::Error),
    Parse(serde_json::Error),
    Invalid(String),
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(err) => write!(f, "cannot read config: {err}"),
            Self::Parse(err) => write!(f, "cannot parse config: {err}"),
            Self::Invalid(message) => write!(f, "invalid config: {message}"),
        }
    }
}

impl Error for ConfigError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Io(err) => Some(err),
            Self::Parse(err) => Some(err),
            Self::Invalid(_) => None,
        }
    }
}

impl SyncConfig {
    /// Loads a JSON config file; omitted fields keep their defaults.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(ConfigError::Io)?;
        Self::from_json_str(&text)
    }

    pub fn from_json_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(text).map_err(ConfigError::Parse)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.index_id.trim().is_empty() {
            return Err(ConfigError::Invalid("index_id cannot be empty".to_string()));
        }
        if self.page_size == 0 {
            return Err(ConfigError::Invalid("page_size must be >= 1".to_string()));
        }
        if self.index_write_attempts == 0 {
            return Err(ConfigError::Invalid(
                "index_write_attempts must be >= 1".to_string(),
            ));
        }
        Ok(())
    }
}
