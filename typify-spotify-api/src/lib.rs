pub mod client;
pub mod config;
pub mod error;
pub mod oauth;
pub mod paths;

pub use client::SpotifyClient;
pub use config::{SpotifyProviderConfig, CONFIG_TEMPLATE as SPOTIFY_CONFIG_TEMPLATE};
pub use error::SpotifyError;
pub use oauth::SpotifyOAuth;
pub use paths::{spotify_token_cache_path, SPOTIFY_TOKEN_CACHE_FILE_NAME};
