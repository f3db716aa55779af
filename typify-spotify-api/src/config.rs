//! Spotify provider configuration.

use const_format::concatcp;
use serde::{Deserialize, Serialize};
use typify_core::{CoreError, ProvidersConfig};

/// Provider name used in config file
pub const PROVIDER_NAME: &str = "spotify";

pub const DEFAULT_REDIRECT_URI: &str = "http://127.0.0.1:8888/callback";

/// Results per search request
pub const DEFAULT_SEARCH_LIMIT: u32 = 10;

/// Entries fetched from the listening history
pub const DEFAULT_RECENT_LIMIT: u32 = 50;

/// Maximum page size the Web API accepts
const MAX_PAGE_LIMIT: u32 = 50;

/// Spotify-specific configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpotifyProviderConfig {
    /// Spotify OAuth client ID
    pub client_id: String,
    /// Spotify OAuth client secret
    pub client_secret: String,
    /// OAuth redirect URI
    #[serde(default = "default_redirect_uri")]
    pub oauth_redirect_uri: String,
    #[serde(default = "default_search_limit")]
    pub search_limit: u32,
    #[serde(default = "default_recent_limit")]
    pub recent_limit: u32,
}

fn default_redirect_uri() -> String {
    DEFAULT_REDIRECT_URI.into()
}

const fn default_search_limit() -> u32 {
    DEFAULT_SEARCH_LIMIT
}

const fn default_recent_limit() -> u32 {
    DEFAULT_RECENT_LIMIT
}

impl SpotifyProviderConfig {
    /// Extract Spotify config from the dynamic providers config.
    ///
    /// # Errors
    ///
    /// Returns an error if the config cannot be parsed.
    pub fn from_providers(providers: &ProvidersConfig) -> Result<Option<Self>, CoreError> {
        providers.get(PROVIDER_NAME)
    }

    /// Validate that required fields are present and limits are in range.
    ///
    /// # Errors
    ///
    /// Returns an error if required fields are missing or empty.
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.client_id.trim().is_empty() {
            return Err(CoreError::ConfigMissingField {
                field: "providers.spotify.client_id".into(),
            });
        }
        if self.client_secret.trim().is_empty() {
            return Err(CoreError::ConfigMissingField {
                field: "providers.spotify.client_secret".into(),
            });
        }
        for (field, value) in [
            ("search_limit", self.search_limit),
            ("recent_limit", self.recent_limit),
        ] {
            if value == 0 || value > MAX_PAGE_LIMIT {
                return Err(CoreError::ConfigInvalid {
                    message: format!(
                        "providers.spotify.{field} must be between 1 and {MAX_PAGE_LIMIT}, got {value}"
                    ),
                });
            }
        }
        Ok(())
    }
}

/// Config template for Spotify provider.
/// This is appended to the base config template when creating a new config file.
pub const CONFIG_TEMPLATE: &str = concatcp!(
    r#"[providers.spotify]
# Get these from https://developer.spotify.com/dashboard
# Add the redirect URI below to your app's allowed redirect URIs.
client_id = ""
client_secret = ""
oauth_redirect_uri = ""#,
    DEFAULT_REDIRECT_URI,
    "\"\nsearch_limit = ",
    DEFAULT_SEARCH_LIMIT,
    "\nrecent_limit = ",
    DEFAULT_RECENT_LIMIT,
    "\n\n"
);

#[cfg(test)]
mod tests {
    use super::*;
    use typify_core::TypifyConfig;

    #[test]
    fn test_template_parses_with_defaults() {
        let config = TypifyConfig::parse(CONFIG_TEMPLATE).unwrap();
        let spotify = SpotifyProviderConfig::from_providers(&config.providers)
            .unwrap()
            .unwrap();
        assert_eq!(spotify.oauth_redirect_uri, DEFAULT_REDIRECT_URI);
        assert_eq!(spotify.search_limit, 10);
        assert_eq!(spotify.recent_limit, 50);
    }

    #[test]
    fn test_template_requires_credentials() {
        let config = TypifyConfig::parse(CONFIG_TEMPLATE).unwrap();
        let spotify = SpotifyProviderConfig::from_providers(&config.providers)
            .unwrap()
            .unwrap();
        assert!(matches!(
            spotify.validate(),
            Err(CoreError::ConfigMissingField { ref field }) if field == "providers.spotify.client_id"
        ));
    }

    #[test]
    fn test_limits_validated() {
        let config = SpotifyProviderConfig {
            client_id: "id".into(),
            client_secret: "secret".into(),
            oauth_redirect_uri: DEFAULT_REDIRECT_URI.into(),
            search_limit: 0,
            recent_limit: 50,
        };
        assert!(matches!(
            config.validate(),
            Err(CoreError::ConfigInvalid { .. })
        ));

        let config = SpotifyProviderConfig {
            search_limit: 10,
            ..config
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_missing_section() {
        let config = TypifyConfig::parse("").unwrap();
        assert!(SpotifyProviderConfig::from_providers(&config.providers)
            .unwrap()
            .is_none());
    }
}
