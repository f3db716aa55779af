//! Web API calls the game needs: track search, listening history and
//! playback control on the user's active device.

use crate::config::SpotifyProviderConfig;
use crate::error::{Result, SpotifyError};
use crate::oauth::SpotifyOAuth;
use async_trait::async_trait;
use rspotify::model::{FullTrack, PlayableId, SearchResult, SearchType, TrackId};
use rspotify::prelude::*;
use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, info, warn};
use typify_core::{CoreError, PlaybackTrigger, Track, TrackSearch};

const LOG_TARGET: &str = "typify::spotify";

pub const PROVIDER_NAME: &str = "spotify";

/// Spotify search, history and playback bound to one signed-in account.
pub struct SpotifyClient {
    oauth: Arc<SpotifyOAuth>,
    search_limit: u32,
    recent_limit: u32,
}

impl SpotifyClient {
    #[must_use]
    pub const fn new(oauth: Arc<SpotifyOAuth>, config: &SpotifyProviderConfig) -> Self {
        Self {
            oauth,
            search_limit: config.search_limit,
            recent_limit: config.recent_limit,
        }
    }

    /// Run a Web API call, refreshing the token and retrying exactly once if
    /// the first attempt is rejected as unauthorized.
    async fn authorized<T, F, Fut>(&self, operation: &str, call: F) -> Result<T>
    where
        F: Fn() -> Fut + Send,
        Fut: Future<Output = Result<T>> + Send,
        T: Send,
    {
        self.oauth.ensure_token_fresh().await?;

        match call().await {
            Err(e) if e.is_unauthorized() => {
                info!(target: LOG_TARGET, "{} unauthorized, refreshing token and retrying", operation);
                self.oauth.refresh_token().await?;
                call().await
            }
            other => other,
        }
    }

    /// Search tracks by free text.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails after the single token retry.
    pub async fn search_tracks(&self, query: &str) -> Result<Vec<Track>> {
        let client = self.oauth.client();
        let limit = self.search_limit;

        let result = self
            .authorized("search", || async move {
                client
                    .search(query, SearchType::Track, None, None, Some(limit), None)
                    .await
                    .map_err(SpotifyError::from)
            })
            .await?;

        let tracks = match result {
            SearchResult::Tracks(page) => page.items.iter().filter_map(convert_track).collect(),
            _ => Vec::new(),
        };
        debug!(target: LOG_TARGET, "Search '{}' returned {} tracks", query, tracks.len());
        Ok(tracks)
    }

    /// Recently played tracks, newest first, without repeats.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails after the single token retry.
    pub async fn recently_played(&self) -> Result<Vec<Track>> {
        let client = self.oauth.client();
        let limit = self.recent_limit;

        let page = self
            .authorized("recently played", || async move {
                client
                    .current_user_recently_played(Some(limit), None)
                    .await
                    .map_err(SpotifyError::from)
            })
            .await?;

        Ok(dedup_tracks(
            page.items
                .iter()
                .filter_map(|entry| convert_track(&entry.track)),
        ))
    }

    /// Start `track_uri` on the active device, or the first available one.
    ///
    /// # Errors
    ///
    /// `NoDevice` when no device is available, `PremiumRequired` when Spotify
    /// refuses playback for the account.
    pub async fn play_uri(&self, track_uri: &str) -> Result<()> {
        let client = self.oauth.client();
        let track_id = TrackId::from_uri(track_uri).map_err(|_| SpotifyError::InvalidTrackUri {
            uri: track_uri.to_string(),
        })?;

        let devices = self
            .authorized("list devices", || async move {
                client.device().await.map_err(SpotifyError::from)
            })
            .await?;

        let device_id = choose_device(
            devices
                .iter()
                .map(|device| (device.id.as_deref(), device.is_active)),
        )
        .ok_or(SpotifyError::NoDevice)?
        .to_string();
        debug!(target: LOG_TARGET, "Playing {} on device {}", track_uri, device_id);

        let device = device_id.as_str();
        let track_id = &track_id;
        self.authorized("play", || async move {
            client
                .start_uris_playback(
                    [PlayableId::Track(track_id.as_ref())],
                    Some(device),
                    None,
                    None,
                )
                .await
                .map_err(SpotifyError::from)
        })
        .await
        .map_err(playback_failure)
    }

    /// Pause the active device.
    ///
    /// # Errors
    ///
    /// Returns an error if Spotify rejects the command.
    pub async fn pause_playback(&self) -> Result<()> {
        let client = self.oauth.client();
        self.authorized("pause", || async move {
            client.pause_playback(None).await.map_err(SpotifyError::from)
        })
        .await
        .map_err(playback_failure)
    }

    /// Resume the active device.
    ///
    /// # Errors
    ///
    /// Returns an error if Spotify rejects the command.
    pub async fn resume_playback(&self) -> Result<()> {
        let client = self.oauth.client();
        self.authorized("resume", || async move {
            client
                .resume_playback(None, None)
                .await
                .map_err(SpotifyError::from)
        })
        .await
        .map_err(playback_failure)
    }
}

fn playback_failure(error: SpotifyError) -> SpotifyError {
    match error.status_code() {
        Some(403 | 404) => SpotifyError::PremiumRequired,
        _ => error,
    }
}

/// Prefer the active device, otherwise the first one that has an ID.
fn choose_device<'a>(devices: impl IntoIterator<Item = (Option<&'a str>, bool)>) -> Option<&'a str> {
    let mut first = None;
    for (id, active) in devices {
        let Some(id) = id else { continue };
        if active {
            return Some(id);
        }
        first = first.or(Some(id));
    }
    first
}

/// Keep the first occurrence of each track ID.
fn dedup_tracks(tracks: impl IntoIterator<Item = Track>) -> Vec<Track> {
    let mut seen = HashSet::new();
    tracks
        .into_iter()
        .filter(|track| seen.insert(track.id.clone()))
        .collect()
}

/// Local files and tracks without an ID cannot be played by URI.
fn convert_track(track: &FullTrack) -> Option<Track> {
    let id = track.id.as_ref()?;
    Some(Track {
        id: id.id().to_string(),
        uri: id.uri(),
        name: track.name.clone(),
        artists: track
            .artists
            .iter()
            .map(|artist| artist.name.clone())
            .collect(),
        album: Some(track.album.name.clone()).filter(|name| !name.is_empty()),
        album_image_url: track.album.images.first().map(|image| image.url.clone()),
        duration_ms: u64::try_from(track.duration.num_milliseconds()).ok(),
    })
}

#[async_trait]
impl TrackSearch for SpotifyClient {
    fn name(&self) -> &'static str {
        PROVIDER_NAME
    }

    async fn search(&self, query: &str) -> typify_core::Result<Vec<Track>> {
        let query = query.trim();
        if query.is_empty() {
            return Err(CoreError::EmptyQuery);
        }
        self.search_tracks(query)
            .await
            .map_err(|e| e.into_core("search"))
    }

    async fn recent(&self) -> typify_core::Result<Vec<Track>> {
        self.recently_played()
            .await
            .map_err(|e| e.into_core("recently played"))
    }
}

#[async_trait]
impl PlaybackTrigger for SpotifyClient {
    fn name(&self) -> &'static str {
        PROVIDER_NAME
    }

    async fn play(&self, track_uri: &str) -> typify_core::Result<()> {
        self.play_uri(track_uri).await.map_err(|e| {
            warn!(target: LOG_TARGET, "Play failed: {}", e);
            e.into_playback_error()
        })
    }

    async fn pause(&self) -> typify_core::Result<()> {
        self.pause_playback()
            .await
            .map_err(SpotifyError::into_playback_error)
    }

    async fn resume(&self) -> typify_core::Result<()> {
        self.resume_playback()
            .await
            .map_err(SpotifyError::into_playback_error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_choose_active_device() {
        let devices = [(Some("phone"), false), (Some("desktop"), true)];
        assert_eq!(choose_device(devices), Some("desktop"));
    }

    #[test]
    fn test_choose_first_device_when_none_active() {
        let devices = [(None, true), (Some("speaker"), false), (Some("tv"), false)];
        assert_eq!(choose_device(devices), Some("speaker"));
    }

    #[test]
    fn test_no_devices() {
        assert_eq!(choose_device(std::iter::empty()), None);
        assert_eq!(choose_device([(None, false)]), None);
    }

    #[test]
    fn test_dedup_keeps_first_play() {
        let tracks = vec![
            Track::new("a", "spotify:track:a", "First"),
            Track::new("b", "spotify:track:b", "Second"),
            Track::new("a", "spotify:track:a", "First again"),
        ];
        let unique = dedup_tracks(tracks);
        assert_eq!(unique.len(), 2);
        assert_eq!(unique[0].name, "First");
        assert_eq!(unique[1].id, "b");
    }

    #[test]
    fn test_non_status_errors_pass_through() {
        assert!(matches!(
            playback_failure(SpotifyError::NoDevice),
            SpotifyError::NoDevice
        ));
    }
}
