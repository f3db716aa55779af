//! Client for the synced-lyrics HTTP endpoint.
//!
//! The endpoint answers `GET <endpoint>?trackid=<spotify track id>` with
//! `{"lyrics": {"syncType": ..., "lines": [...]}}` on success and
//! `{"error": true, "message": ...}` otherwise.

use async_trait::async_trait;
use reqwest::StatusCode;
use reqwest_middleware::{ClientBuilder, ClientWithMiddleware};
use reqwest_retry::{policies::ExponentialBackoff, RetryTransientMiddleware};
use std::time::Duration;
use tracing::{debug, info, warn};
use typify_core::{CoreError, LyricLineStore, LyricsConfig, LyricsPayload, LyricsSource, Track};

const LOG_TARGET: &str = "typify::lyrics_api";

/// Default timeout for HTTP requests (10 seconds)
const DEFAULT_TIMEOUT_SECS: u64 = 10;
/// Default number of retry attempts
const DEFAULT_MAX_RETRIES: u32 = 3;

pub const PROVIDER_NAME: &str = "lyrics_api";

/// Synced lyrics endpoint client
pub struct LyricsApiClient {
    client: ClientWithMiddleware,
    endpoint: String,
}

impl LyricsApiClient {
    /// Create a client for `config.endpoint` with a 10-second timeout and
    /// 3 retries on transient failures.
    ///
    /// # Errors
    ///
    /// Returns an error if the endpoint is not a valid URL or the HTTP client
    /// cannot be created.
    pub fn new(config: &LyricsConfig) -> Result<Self, CoreError> {
        let endpoint = config.endpoint.trim().to_string();
        url::Url::parse(&endpoint).map_err(|e| CoreError::ConfigInvalid {
            message: format!("lyrics.endpoint '{endpoint}' is not a valid URL: {e}"),
        })?;

        let base_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
            .connect_timeout(Duration::from_secs(5))
            .user_agent(concat!("Typify/", env!("CARGO_PKG_VERSION")))
            .build()?;

        let retry_policy =
            ExponentialBackoff::builder().build_with_max_retries(DEFAULT_MAX_RETRIES);
        let client = ClientBuilder::new(base_client)
            .with(RetryTransientMiddleware::new_with_policy(retry_policy))
            .build();

        Ok(Self { client, endpoint })
    }

    /// Request URL for a track.
    #[must_use]
    pub fn lyrics_url(&self, track_id: &str) -> String {
        let separator = if self.endpoint.contains('?') { '&' } else { '?' };
        format!(
            "{}{}trackid={}",
            self.endpoint,
            separator,
            urlencoding::encode(track_id)
        )
    }

    /// Fetch lyrics by track ID, Spotify URI or `open.spotify.com` link.
    ///
    /// # Errors
    ///
    /// `LyricsUnavailable` when the service has no synced lines for the track,
    /// `NetworkFailure` for any other failed request.
    pub async fn fetch_by_id(&self, track: &str) -> Result<LyricLineStore, CoreError> {
        let Some(track_id) = extract_track_id(track) else {
            return Err(CoreError::EmptySelection);
        };
        let url = self.lyrics_url(&track_id);
        info!(target: LOG_TARGET, "Lyrics GET: {}", url);

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| CoreError::network("lyrics fetch", e.to_string()))?;
        let status = response.status();
        debug!(target: LOG_TARGET, "Lyrics response status: {}", status);

        let body = response
            .text()
            .await
            .map_err(|e| CoreError::network("lyrics fetch", e.to_string()))?;

        parse_response(status, &body)
    }
}

/// Turn an endpoint response into a line store.
///
/// # Errors
///
/// See [`LyricsApiClient::fetch_by_id`].
pub fn parse_response(status: StatusCode, body: &str) -> Result<LyricLineStore, CoreError> {
    let payload = serde_json::from_str::<LyricsPayload>(body);

    if status == StatusCode::NOT_FOUND {
        let reason = match payload {
            Ok(LyricsPayload::Error { message: Some(message) }) => message,
            _ => "lyrics for this track are not available".to_string(),
        };
        return Err(CoreError::LyricsUnavailable { reason });
    }

    if !status.is_success() {
        let reason = match payload {
            Ok(LyricsPayload::Error { message: Some(message) }) => {
                format!("{status}: {message}")
            }
            _ => format!("endpoint returned status {status}"),
        };
        warn!(target: LOG_TARGET, "Lyrics endpoint failed: {}", reason);
        return Err(CoreError::network("lyrics fetch", reason));
    }

    LyricLineStore::from_payload(payload?)
}

/// Pull a Spotify track ID out of a bare ID, a `spotify:track:` URI or an
/// `open.spotify.com/track/` link.
#[must_use]
pub fn extract_track_id(input: &str) -> Option<String> {
    let input = input.trim();

    let candidate = if let Some(id) = input.strip_prefix("spotify:track:") {
        id.to_string()
    } else if let Ok(url) = url::Url::parse(input) {
        let mut segments = url.path_segments()?;
        segments.find(|segment| *segment == "track")?;
        segments.next()?.to_string()
    } else {
        input.to_string()
    };

    if !candidate.is_empty() && candidate.chars().all(|c| c.is_ascii_alphanumeric()) {
        Some(candidate)
    } else {
        None
    }
}

#[async_trait]
impl LyricsSource for LyricsApiClient {
    fn name(&self) -> &'static str {
        PROVIDER_NAME
    }

    async fn fetch(&self, track: &Track) -> Result<LyricLineStore, CoreError> {
        info!(target: LOG_TARGET, "Fetching lyrics for: {}", track);
        let store = self.fetch_by_id(&track.id).await?;
        info!(target: LOG_TARGET, "Found {} synced lines", store.len());
        Ok(store)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client(endpoint: &str) -> LyricsApiClient {
        LyricsApiClient::new(&LyricsConfig {
            endpoint: endpoint.into(),
            ..LyricsConfig::default()
        })
        .unwrap()
    }

    #[test]
    fn test_lyrics_url() {
        assert_eq!(
            client("http://localhost:8000").lyrics_url("abc123"),
            "http://localhost:8000?trackid=abc123"
        );
        assert_eq!(
            client("https://lyrics.example/api/?format=id").lyrics_url("abc"),
            "https://lyrics.example/api/?format=id&trackid=abc"
        );
    }

    #[test]
    fn test_invalid_endpoint_rejected() {
        let result = LyricsApiClient::new(&LyricsConfig {
            endpoint: "not a url".into(),
            ..LyricsConfig::default()
        });
        assert!(matches!(result, Err(CoreError::ConfigInvalid { .. })));
    }

    #[test]
    fn test_extract_track_id() {
        assert_eq!(
            extract_track_id("5f8eCNwTlr0RJopE9vQ6mB").as_deref(),
            Some("5f8eCNwTlr0RJopE9vQ6mB")
        );
        assert_eq!(
            extract_track_id("spotify:track:5f8eCNwTlr0RJopE9vQ6mB").as_deref(),
            Some("5f8eCNwTlr0RJopE9vQ6mB")
        );
        assert_eq!(
            extract_track_id("https://open.spotify.com/track/5f8eCNwTlr0RJopE9vQ6mB?si=x1").as_deref(),
            Some("5f8eCNwTlr0RJopE9vQ6mB")
        );
        assert_eq!(extract_track_id("https://open.spotify.com/album/xyz"), None);
        assert_eq!(extract_track_id(""), None);
        assert_eq!(extract_track_id("not/an id"), None);
    }

    #[test]
    fn test_parse_not_found() {
        let body = r#"{"error":true,"message":"lyrics for this track is not available on spotify!"}"#;
        let result = parse_response(StatusCode::NOT_FOUND, body);
        assert!(matches!(
            result,
            Err(CoreError::LyricsUnavailable { ref reason }) if reason.contains("not available on spotify")
        ));
    }

    #[test]
    fn test_parse_server_error() {
        let body = r#"{"error":true,"message":"SP_DC expired"}"#;
        let result = parse_response(StatusCode::INTERNAL_SERVER_ERROR, body);
        assert!(matches!(
            result,
            Err(CoreError::NetworkFailure { ref reason, .. }) if reason.contains("SP_DC expired")
        ));

        let result = parse_response(StatusCode::BAD_GATEWAY, "<html>");
        assert!(matches!(result, Err(CoreError::NetworkFailure { .. })));
    }

    #[test]
    fn test_parse_error_body_with_ok_status() {
        let body = r#"{"error":true,"message":"url or trackid parameter is required!"}"#;
        let result = parse_response(StatusCode::OK, body);
        assert!(matches!(result, Err(CoreError::LyricsUnavailable { .. })));
    }
}
