use thiserror::Error;
use typify_core::CoreError;

/// Errors raised by the Spotify collaborator.
///
/// Everything the game loop sees goes through [`SpotifyError::into_core`],
/// so the engine only ever deals with [`CoreError`] kinds.
#[derive(Debug, Error)]
pub enum SpotifyError {
    /// Authentication failed during OAuth flow or token exchange.
    #[error("Spotify authentication failed: {reason}")]
    AuthFailed { reason: String },

    /// No token has been obtained yet.
    #[error("Not signed in to Spotify")]
    NoCredential,

    /// Token was rejected and could not be refreshed.
    #[error("Spotify token expired and refresh failed")]
    TokenExpired,

    #[error("No active Spotify devices found. Please open Spotify on a device and try again.")]
    NoDevice,

    #[error("Playback failed. Please ensure you have an active Spotify Premium account.")]
    PremiumRequired,

    #[error("Invalid Spotify track URI: {uri}")]
    InvalidTrackUri { uri: String },

    /// Error from the Spotify API client.
    #[error("Spotify API error: {0}")]
    Api(#[from] rspotify::ClientError),

    /// Failed to read the token cache file or perform I/O.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Failed to parse or serialize JSON data.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl SpotifyError {
    /// HTTP status of a failed Web API call, if the error carries one.
    #[must_use]
    pub fn status_code(&self) -> Option<u16> {
        let Self::Api(rspotify::ClientError::Http(http)) = self else {
            return None;
        };
        if let rspotify::http::HttpError::StatusCode(response) = http.as_ref() {
            Some(response.status().as_u16())
        } else {
            None
        }
    }

    /// Whether the Web API rejected the access token.
    #[must_use]
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, Self::TokenExpired) || self.status_code() == Some(401)
    }

    /// Map a failed search or history lookup into the engine's error kinds.
    #[must_use]
    pub fn into_core(self, operation: &'static str) -> CoreError {
        match self {
            Self::NoCredential | Self::TokenExpired => CoreError::NoCredential,
            other => CoreError::network(operation, other.to_string()),
        }
    }

    /// Map a failed playback command into the engine's error kinds.
    #[must_use]
    pub fn into_playback_error(self) -> CoreError {
        match self {
            Self::NoCredential => CoreError::NoCredential,
            other => CoreError::PlaybackCommandFailed {
                reason: other.to_string(),
            },
        }
    }
}

/// Convenience type alias for Results with `SpotifyError`.
pub type Result<T> = std::result::Result<T, SpotifyError>;
