//! Contracts for the external services the game depends on.
//!
//! The game never talks to a network directly. Track search, lyrics fetching
//! and playback control are supplied by implementations of these traits, so
//! the engine stays testable with in-memory fakes.

use crate::error::Result;
use crate::lyrics::LyricLineStore;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// A playable track. The game only consumes `id` and `uri`; the rest is
/// display metadata passed through to the host.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Track {
    /// Provider track ID (used to fetch lyrics)
    pub id: String,
    /// Provider URI (used to start playback)
    pub uri: String,
    pub name: String,
    pub artists: Vec<String>,
    pub album: Option<String>,
    pub album_image_url: Option<String>,
    pub duration_ms: Option<u64>,
}

impl Track {
    pub fn new(id: impl Into<String>, uri: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            uri: uri.into(),
            name: name.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_artist(mut self, artist: impl Into<String>) -> Self {
        self.artists.push(artist.into());
        self
    }

    /// Artist names joined for display
    #[must_use]
    pub fn artist_names(&self) -> String {
        self.artists.join(", ")
    }

    /// A track is selectable when it can be both looked up and played.
    #[must_use]
    pub fn is_selectable(&self) -> bool {
        !self.id.trim().is_empty() && !self.uri.trim().is_empty()
    }
}

impl std::fmt::Display for Track {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.artists.is_empty() {
            f.write_str(&self.name)
        } else {
            write!(f, "{} - {}", self.artist_names(), self.name)
        }
    }
}

/// Opaque bearer credential handed over by the auth layer.
///
/// The engine does not refresh, expire or persist it.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential(String);

impl Credential {
    pub fn new(token: impl Into<String>) -> Option<Self> {
        let token = token.into();
        if token.trim().is_empty() {
            None
        } else {
            Some(Self(token))
        }
    }

    /// The raw bearer value, for use in an `Authorization` header.
    #[must_use]
    pub fn bearer(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Credential(..)")
    }
}

/// Track search and selection lists.
#[async_trait]
pub trait TrackSearch: Send + Sync {
    fn name(&self) -> &'static str;

    /// Search the catalogue.
    ///
    /// # Errors
    ///
    /// `EmptyQuery` for a blank query, `NoCredential` when not logged in,
    /// otherwise a network failure.
    async fn search(&self, query: &str) -> Result<Vec<Track>>;

    /// The user's recently played tracks, most recent first.
    ///
    /// # Errors
    ///
    /// `NoCredential` when not logged in, otherwise a network failure.
    async fn recent(&self) -> Result<Vec<Track>>;
}

/// Source of time-synced lyrics.
#[async_trait]
pub trait LyricsSource: Send + Sync {
    fn name(&self) -> &'static str;

    /// Fetch the lyric lines for a track.
    ///
    /// # Errors
    ///
    /// `LyricsUnavailable` when the service has no usable synced lines,
    /// otherwise a network failure.
    async fn fetch(&self, track: &Track) -> Result<LyricLineStore>;
}

/// Audio playback control. Calls are fire-and-forget from the game's point
/// of view: a failure is reported but never blocks the game clock.
#[async_trait]
pub trait PlaybackTrigger: Send + Sync {
    fn name(&self) -> &'static str;

    /// # Errors
    ///
    /// `PlaybackCommandFailed` when the track could not be started.
    async fn play(&self, track_uri: &str) -> Result<()>;

    /// # Errors
    ///
    /// `PlaybackCommandFailed` when playback could not be paused.
    async fn pause(&self) -> Result<()>;

    /// # Errors
    ///
    /// `PlaybackCommandFailed` when playback could not be resumed.
    async fn resume(&self) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_track_display() {
        let track = Track::new("1", "spotify:track:1", "Song")
            .with_artist("A")
            .with_artist("B");
        assert_eq!(track.to_string(), "A, B - Song");
        assert_eq!(Track::new("1", "u", "Solo").to_string(), "Solo");
    }

    #[test]
    fn test_track_selectable() {
        assert!(Track::new("1", "spotify:track:1", "x").is_selectable());
        assert!(!Track::new("", "spotify:track:1", "x").is_selectable());
        assert!(!Track::new("1", " ", "x").is_selectable());
    }

    #[test]
    fn test_credential_rejects_blank() {
        assert!(Credential::new("  ").is_none());
        let credential = Credential::new("abc").unwrap();
        assert_eq!(credential.bearer(), "abc");
        assert_eq!(format!("{credential:?}"), "Credential(..)");
    }
}
