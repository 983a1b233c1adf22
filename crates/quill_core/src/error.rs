use std::path::PathBuf;

use serde::Serialize;
use thiserror::Error;

/// Unified error type for quill operations
#[derive(Debug, Error)]
pub enum QuillError {
    // IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to read file '{path}': {source}")]
    FileRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to write file '{path}': {source}")]
    FileWrite {
        path: PathBuf,
        source: std::io::Error,
    },

    // Config errors
    #[error("Config parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("Config serialize error: {0}")]
    ConfigSerialize(#[from] toml::ser::Error),

    // Storage errors
    #[cfg(feature = "sqlite")]
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    // Post errors
    #[error("{0}")]
    Validation(String),

    #[error("Post '{0}' is locked by another operation")]
    LockContention(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Post '{0}' is not a draft")]
    NotDraft(String),

    #[error("Could not find a free permlink for '{author}' after {attempts} attempts")]
    PermlinkExhausted { author: String, attempts: u32 },

    // Remote errors
    #[error("Remote ledger unavailable: {0}")]
    RemoteUnavailable(String),

    #[error("This post is archived and can no longer be edited ({0})")]
    Archived(String),

    #[error("Remote ledger rejected the transaction: {0}")]
    Submission(String),

    #[error("Patch error: {0}")]
    Patch(String),

    // Identity errors
    #[error("Cannot post as '{author}': {reason}")]
    Unauthorized { author: String, reason: String },

    #[error("Identity service error: {0}")]
    Identity(String),
}

/// Result type alias for quill operations
pub type Result<T> = std::result::Result<T, QuillError>;

impl QuillError {
    /// Whether repeating the same operation later may succeed.
    ///
    /// Submission failures leave the local draft persisted, so a retry
    /// resubmits exactly what was attempted.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            QuillError::RemoteUnavailable(_)
                | QuillError::Submission(_)
                | QuillError::LockContention(_)
                | QuillError::Identity(_)
        )
    }

    /// Convert to a serializable representation for IPC
    pub fn to_serializable(&self) -> SerializableError {
        SerializableError::from(self)
    }
}

/// A serializable representation of QuillError for IPC
#[derive(Debug, Clone, Serialize)]
pub struct SerializableError {
    /// Error kind/variant name
    pub kind: String,
    /// Human-readable error message
    pub message: String,
    /// Associated path (if applicable)
    pub path: Option<PathBuf>,
    /// Whether the caller may retry
    pub retryable: bool,
}

impl From<&QuillError> for SerializableError {
    fn from(err: &QuillError) -> Self {
        let kind = match err {
            QuillError::Io(_) => "Io",
            QuillError::FileRead { .. } => "FileRead",
            QuillError::FileWrite { .. } => "FileWrite",
            QuillError::ConfigParse(_) => "ConfigParse",
            QuillError::ConfigSerialize(_) => "ConfigSerialize",
            #[cfg(feature = "sqlite")]
            QuillError::Database(_) => "Database",
            QuillError::Storage(_) => "Storage",
            QuillError::Json(_) => "Json",
            QuillError::Validation(_) => "Validation",
            QuillError::LockContention(_) => "LockContention",
            QuillError::NotFound(_) => "NotFound",
            QuillError::NotDraft(_) => "NotDraft",
            QuillError::PermlinkExhausted { .. } => "PermlinkExhausted",
            QuillError::RemoteUnavailable(_) => "RemoteUnavailable",
            QuillError::Archived(_) => "Archived",
            QuillError::Submission(_) => "Submission",
            QuillError::Patch(_) => "Patch",
            QuillError::Unauthorized { .. } => "Unauthorized",
            QuillError::Identity(_) => "Identity",
        }
        .to_string();

        let path = match err {
            QuillError::FileRead { path, .. } => Some(path.clone()),
            QuillError::FileWrite { path, .. } => Some(path.clone()),
            _ => None,
        };

        Self {
            kind,
            message: err.to_string(),
            path,
            retryable: err.is_retryable(),
        }
    }
}

impl From<QuillError> for SerializableError {
    fn from(err: QuillError) -> Self {
        SerializableError::from(&err)
    }
}
