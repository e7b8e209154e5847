//! Error types for gitvault
//!
//! All modules use `VaultResult<T>` as their return type.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for gitvault operations
pub type VaultResult<T> = Result<T, VaultError>;

/// All errors that can occur in gitvault
#[derive(Error, Debug)]
pub enum VaultError {
    // Configuration errors
    #[error("Invalid configuration at {path}: {reason}")]
    ConfigInvalid { path: PathBuf, reason: String },

    #[error("Failed to create config directory {path}: {source}")]
    ConfigDirCreate {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Missing required setting: {name}")]
    MissingSetting { name: String, hint: &'static str },

    // Remote store errors
    #[error("{operation} {path} failed after {attempts} attempts: {last_error}")]
    RetriesExhausted {
        operation: &'static str,
        path: String,
        attempts: u32,
        last_error: String,
    },

    // Cache errors
    #[error("Path is not cached: {0}")]
    NotCached(String),

    #[error("Content at {path} is not valid UTF-8 text or JSON")]
    UndecodableContent { path: String },

    // Large object errors
    #[error("Large object {name} is missing chunk {index} of {total}")]
    MissingChunk { name: String, index: usize, total: usize },

    #[error("Large object {name} is corrupt: {reason}")]
    LargeObjectCorrupt { name: String, reason: String },

    #[error("Large object {name} was not stored: writing {failed_path} failed: {reason}")]
    PartialChunkWrite {
        name: String,
        failed_path: String,
        reason: String,
    },

    // IO errors
    #[error("IO error: {context}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    // Serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Base64 decode error: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    // General errors
    #[error("{0}")]
    User(String),
}

impl VaultError {
    /// Create an IO error with context
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// Create a missing setting error
    pub fn missing_setting(name: impl Into<String>, hint: &'static str) -> Self {
        Self::MissingSetting {
            name: name.into(),
            hint,
        }
    }

    /// Check if a later attempt at the same operation may succeed
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::RetriesExhausted { .. } | Self::PartialChunkWrite { .. }
        )
    }

    /// Get actionable hint for the error
    pub fn hint(&self) -> Option<&'static str> {
        match self {
            Self::MissingSetting { hint, .. } => Some(hint),
            Self::RetriesExhausted { .. } => {
                Some("The remote store is unreachable or throttled; dirty data is kept for the next flush")
            }
            Self::MissingChunk { .. } => Some("Re-upload the object with: gitvault large put"),
            Self::ConfigInvalid { .. } => Some("Run: gitvault config init --force"),
            _ => None,
        }
    }
}
