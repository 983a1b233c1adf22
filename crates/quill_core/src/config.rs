//! Configuration types for Quill.
//!
//! [`QuillConfig`] holds the tunables of the revision/publish engine. It is
//! persisted as TOML; every field has a default so partial files load.
//!
//! # Example
//!
//! ```ignore
//! use quill_core::config::QuillConfig;
//!
//! let config = QuillConfig::load_from("quill.toml")?;
//! let interval = config.autosave_interval();
//! ```

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{QuillError, Result};

/// Maximum permlink length accepted by the ledger.
pub const MAX_PERMLINK_LEN: usize = 255;

/// Shortest autosave interval the loop will run with.
pub const MIN_AUTOSAVE_INTERVAL: Duration = Duration::from_millis(1);

/// `QuillConfig` represents the parts of Quill that the user can configure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QuillConfig {
    /// SQLite database file holding posts and revisions.
    /// If not set, an in-memory store is used.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub database_path: Option<PathBuf>,

    /// Length of the random token used for empty slugs and collision prefixes
    pub random_token_len: usize,

    /// How many candidate permlinks to try before giving up
    pub permlink_attempts: u32,

    /// Interval between autosave ticks, in milliseconds
    pub autosave_interval_ms: u64,

    /// Maximum number of tags accepted by the default content policy
    pub max_tags: usize,

    /// Maximum title length accepted by the default content policy
    pub max_title_len: usize,
}

impl Default for QuillConfig {
    fn default() -> Self {
        Self {
            database_path: None,
            random_token_len: 6,
            permlink_attempts: 8,
            autosave_interval_ms: 10_000,
            max_tags: 5,
            max_title_len: 255,
        }
    }
}

impl QuillConfig {
    /// Create a config backed by the given database file
    pub fn with_database(path: impl Into<PathBuf>) -> Self {
        Self {
            database_path: Some(path.into()),
            ..Default::default()
        }
    }

    /// Interval between autosave ticks, never shorter than
    /// [`MIN_AUTOSAVE_INTERVAL`]
    pub fn autosave_interval(&self) -> Duration {
        Duration::from_millis(self.autosave_interval_ms).max(MIN_AUTOSAVE_INTERVAL)
    }

    /// Check values that parse but cannot be used.
    pub fn validate(&self) -> Result<()> {
        if self.autosave_interval_ms == 0 {
            return Err(QuillError::Validation(
                "autosave_interval_ms must be greater than zero".to_string(),
            ));
        }
        if self.permlink_attempts == 0 {
            return Err(QuillError::Validation(
                "permlink_attempts must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    /// Parse and validate a config from a TOML string
    pub fn from_toml_str(s: &str) -> Result<Self> {
        let config: Self = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    /// Load config from a TOML file
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|source| QuillError::FileRead {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&contents)
    }

    /// Save config to a TOML file, creating parent directories as needed
    pub fn save_to(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(|source| QuillError::FileWrite {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        let contents = toml::to_string_pretty(self)?;
        std::fs::write(path, contents).map_err(|source| QuillError::FileWrite {
            path: path.to_path_buf(),
            source,
        })
    }
}
