use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    // Configuration errors
    #[error("Config file not found at {path}. A template has been created - please edit it with your Spotify credentials and restart.")]
    ConfigNotFound { path: PathBuf },

    #[error("Invalid config: {message}")]
    ConfigInvalid { message: String },

    #[error("Missing required config field: {field}")]
    ConfigMissingField { field: String },

    #[error("Failed to parse config file: {0}")]
    ConfigParseError(#[from] toml::de::Error),

    // Preconditions on user actions
    #[error("No access token available. Please log in again.")]
    NoCredential,

    #[error("Please enter a search query")]
    EmptyQuery,

    #[error("No track selected. Please select a track first.")]
    EmptySelection,

    #[error("Cannot {action} while {state}")]
    InvalidState { action: &'static str, state: String },

    // Collaborator failures
    #[error("No lyrics found for this track: {reason}")]
    LyricsUnavailable { reason: String },

    #[error("Playback command failed: {reason}")]
    PlaybackCommandFailed { reason: String },

    #[error("{operation} failed: {reason}")]
    NetworkFailure {
        operation: &'static str,
        reason: String,
    },

    #[error("Result belongs to an earlier session and was discarded")]
    StaleCompletion,

    // Cache errors
    #[error("Cache database error: {0}")]
    CacheError(#[from] tokio_rusqlite::Error),

    #[error("SQLite error: {0}")]
    SqliteError(#[from] rusqlite::Error),

    // Network errors
    #[error("Network request failed: {0}")]
    NetworkError(#[from] reqwest::Error),

    #[error("Network request failed: {0}")]
    MiddlewareError(#[from] reqwest_middleware::Error),

    #[error("Invalid response payload: {0}")]
    JsonError(#[from] serde_json::Error),

    // IO errors
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl CoreError {
    /// Shorthand for a [`CoreError::NetworkFailure`] on the named operation.
    pub fn network(operation: &'static str, reason: impl Into<String>) -> Self {
        Self::NetworkFailure {
            operation,
            reason: reason.into(),
        }
    }

    /// Whether the error originated from an external collaborator rather than
    /// from a rejected user action.
    #[must_use]
    pub const fn is_collaborator_failure(&self) -> bool {
        matches!(
            self,
            Self::LyricsUnavailable { .. }
                | Self::PlaybackCommandFailed { .. }
                | Self::NetworkFailure { .. }
                | Self::NetworkError(_)
                | Self::MiddlewareError(_)
                | Self::JsonError(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, CoreError>;
