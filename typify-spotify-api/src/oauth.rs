//! Spotify sign-in: cached token handling plus the browser authorization-code flow.

use crate::config::SpotifyProviderConfig;
use crate::error::{Result, SpotifyError};
use axum::{extract::Query, response::Html, routing::get, Router};
use rspotify::{prelude::*, scopes, AuthCodeSpotify, Credentials, OAuth, Token};
use serde::{Deserialize, Serialize};
use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{oneshot, Mutex};
use tracing::{debug, info, warn};
use typify_core::Credential;

const LOG_TARGET: &str = "typify::spotify";

/// How long the callback server waits for the browser redirect
const OAUTH_CALLBACK_TIMEOUT_SECS: u64 = 600;

/// Tokens expiring within this window are refreshed before use
const PROACTIVE_REFRESH_THRESHOLD_SECS: i64 = 60;

type CodeSender = Arc<Mutex<Option<oneshot::Sender<std::result::Result<String, String>>>>>;

/// On-disk form of an access token
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct StoredToken {
    access_token: String,
    refresh_token: Option<String>,
    /// Unix timestamp
    expires_at: Option<i64>,
    scopes: Vec<String>,
}

impl From<&Token> for StoredToken {
    fn from(token: &Token) -> Self {
        let mut scopes: Vec<String> = token.scopes.iter().cloned().collect();
        scopes.sort();
        Self {
            access_token: token.access_token.clone(),
            refresh_token: token.refresh_token.clone(),
            expires_at: token.expires_at.map(|at| at.timestamp()),
            scopes,
        }
    }
}

impl From<StoredToken> for Token {
    fn from(stored: StoredToken) -> Self {
        Self {
            access_token: stored.access_token,
            refresh_token: stored.refresh_token,
            expires_at: stored
                .expires_at
                .and_then(|ts| chrono::DateTime::from_timestamp(ts, 0)),
            expires_in: chrono::TimeDelta::zero(),
            scopes: stored.scopes.into_iter().collect(),
        }
    }
}

/// Owns the rspotify client and its persisted token.
pub struct SpotifyOAuth {
    client: AuthCodeSpotify,
    token_path: PathBuf,
}

impl SpotifyOAuth {
    /// Create a sign-in manager that persists its token at the default cache path.
    #[must_use]
    pub fn new(config: &SpotifyProviderConfig) -> Self {
        Self::with_token_path(config, crate::paths::spotify_token_cache_path())
    }

    /// Create a sign-in manager with an explicit token cache location.
    #[must_use]
    pub fn with_token_path(config: &SpotifyProviderConfig, token_path: PathBuf) -> Self {
        let creds = Credentials::new(&config.client_id, &config.client_secret);
        let oauth = OAuth {
            redirect_uri: config.oauth_redirect_uri.clone(),
            scopes: scopes!(
                "user-read-email",
                "user-read-private",
                "user-read-playback-state",
                "user-modify-playback-state",
                "user-read-recently-played"
            ),
            ..Default::default()
        };

        Self {
            client: AuthCodeSpotify::new(creds, oauth),
            token_path,
        }
    }

    #[must_use]
    pub fn token_path(&self) -> &Path {
        &self.token_path
    }

    /// The underlying Web API client.
    #[must_use]
    pub const fn client(&self) -> &AuthCodeSpotify {
        &self.client
    }

    async fn lock_token(&self) -> Result<futures::lock::MutexGuard<'_, Option<Token>>> {
        self.client
            .token
            .lock()
            .await
            .map_err(|_| SpotifyError::AuthFailed {
                reason: "Failed to acquire token lock".to_string(),
            })
    }

    /// The bearer token for the signed-in account.
    ///
    /// # Errors
    ///
    /// Returns `NoCredential` when nobody has signed in yet.
    pub async fn credential(&self) -> Result<Credential> {
        let guard = self.lock_token().await?;
        guard
            .as_ref()
            .and_then(|token| Credential::new(token.access_token.clone()))
            .ok_or(SpotifyError::NoCredential)
    }

    /// Whether a token is currently held in memory.
    ///
    /// # Errors
    ///
    /// Returns an error if the token lock cannot be acquired.
    pub async fn is_signed_in(&self) -> Result<bool> {
        Ok(self.lock_token().await?.is_some())
    }

    /// Load the persisted token, refreshing it if it has expired.
    ///
    /// Returns `false` when there is nothing usable on disk.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed, or the refresh fails.
    pub async fn load_cached_token(&self) -> Result<bool> {
        if !self.token_path.exists() {
            info!(target: LOG_TARGET, "No cached token at {:?}", self.token_path);
            return Ok(false);
        }

        let content = fs::read_to_string(&self.token_path)?;
        let stored: StoredToken = serde_json::from_str(&content)?;
        let token = Token::from(stored);

        if !token.is_expired() {
            *self.lock_token().await? = Some(token);
            info!(target: LOG_TARGET, "Loaded cached Spotify token");
            return Ok(true);
        }

        if token.refresh_token.is_none() {
            info!(target: LOG_TARGET, "Cached token expired without refresh token");
            return Ok(false);
        }

        info!(target: LOG_TARGET, "Cached token expired, refreshing");
        *self.lock_token().await? = Some(token);
        self.refresh_token().await?;
        Ok(true)
    }

    async fn save_token(&self) -> Result<()> {
        let stored = {
            let guard = self.lock_token().await?;
            match guard.as_ref() {
                Some(token) => StoredToken::from(token),
                None => return Ok(()),
            }
        };

        if let Some(parent) = self.token_path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&self.token_path, serde_json::to_string_pretty(&stored)?)?;
        debug!(target: LOG_TARGET, "Saved Spotify token to {:?}", self.token_path);
        Ok(())
    }

    /// Exchange the refresh token for a new access token and persist it.
    ///
    /// # Errors
    ///
    /// Returns `TokenExpired` if the refresh is rejected, or an I/O error if
    /// the new token cannot be written.
    pub async fn refresh_token(&self) -> Result<()> {
        info!(target: LOG_TARGET, "Refreshing Spotify access token");

        self.client.refresh_token().await.map_err(|e| {
            warn!(target: LOG_TARGET, "Token refresh failed: {}", e);
            SpotifyError::TokenExpired
        })?;

        self.save_token().await
    }

    /// Refresh ahead of a request when the token is about to expire.
    ///
    /// # Errors
    ///
    /// Returns `NoCredential` when signed out, or the refresh error.
    pub async fn ensure_token_fresh(&self) -> Result<()> {
        let needs_refresh = {
            let guard = self.lock_token().await?;
            let Some(token) = guard.as_ref() else {
                return Err(SpotifyError::NoCredential);
            };
            expires_within(token, PROACTIVE_REFRESH_THRESHOLD_SECS)
        };

        if needs_refresh {
            self.refresh_token().await?;
        }
        Ok(())
    }

    /// Use the cached token if possible, otherwise run the browser flow.
    ///
    /// # Errors
    ///
    /// Returns an error if both the cached token and the interactive flow fail.
    pub async fn ensure_authenticated(&self) -> Result<()> {
        match self.load_cached_token().await {
            Ok(true) => return Ok(()),
            Ok(false) => {}
            Err(e) => warn!(target: LOG_TARGET, "Ignoring unusable token cache: {}", e),
        }

        info!(target: LOG_TARGET, "Starting interactive Spotify sign-in");
        self.authenticate_interactive().await
    }

    /// Forget the token in memory and on disk.
    ///
    /// # Errors
    ///
    /// Returns an error if the cache file exists but cannot be removed.
    pub async fn sign_out(&self) -> Result<()> {
        *self.lock_token().await? = None;
        if self.token_path.exists() {
            fs::remove_file(&self.token_path)?;
        }
        info!(target: LOG_TARGET, "Signed out of Spotify");
        Ok(())
    }

    /// Authorization page URL for the configured scopes.
    ///
    /// # Errors
    ///
    /// Returns an error if the URL cannot be built from the client settings.
    pub fn authorize_url(&self) -> Result<String> {
        self.client
            .get_authorize_url(false)
            .map_err(|e| SpotifyError::AuthFailed {
                reason: format!("Failed to generate auth URL: {e}"),
            })
    }

    /// Trade an authorization code for a token and persist it.
    ///
    /// # Errors
    ///
    /// Returns an error if the exchange or the save fails.
    pub async fn exchange_code(&self, code: &str) -> Result<()> {
        self.client
            .request_token(code)
            .await
            .map_err(|e| SpotifyError::AuthFailed {
                reason: format!("Token exchange failed: {e}"),
            })?;

        self.save_token().await?;
        info!(target: LOG_TARGET, "Signed in to Spotify");
        Ok(())
    }

    /// Open the browser on the authorization page and wait for the redirect
    /// on a local callback server.
    ///
    /// # Errors
    ///
    /// Returns an error if the server cannot bind, the user denies access,
    /// the wait times out, or the code exchange fails.
    pub async fn authenticate_interactive(&self) -> Result<()> {
        let callback = CallbackAddress::parse(&self.client.oauth.redirect_uri)?;

        let (tx, rx) = oneshot::channel();
        let app = callback_router(&callback.path, Arc::new(Mutex::new(Some(tx))));

        let listener = tokio::net::TcpListener::bind(callback.addr)
            .await
            .map_err(|e| SpotifyError::AuthFailed {
                reason: format!("Failed to bind to {}: {e}", callback.addr),
            })?;
        info!(
            target: LOG_TARGET,
            "Waiting for Spotify redirect on http://{}{}", callback.addr, callback.path
        );

        let auth_url = self.authorize_url()?;
        if let Err(e) = open::that(&auth_url) {
            warn!(target: LOG_TARGET, "Could not open browser: {}", e);
            info!(target: LOG_TARGET, "Open this URL to sign in: {}", auth_url);
        }

        let code = tokio::select! {
            result = rx => match result {
                Ok(Ok(code)) => code,
                Ok(Err(reason)) => return Err(SpotifyError::AuthFailed { reason }),
                Err(_) => return Err(SpotifyError::AuthFailed {
                    reason: "Callback channel closed unexpectedly".into(),
                }),
            },
            _ = axum::serve(listener, app) => {
                return Err(SpotifyError::AuthFailed {
                    reason: "Callback server stopped unexpectedly".into(),
                });
            }
            () = tokio::time::sleep(Duration::from_secs(OAUTH_CALLBACK_TIMEOUT_SECS)) => {
                return Err(SpotifyError::AuthFailed {
                    reason: format!(
                        "Sign-in timed out after {} minutes",
                        OAUTH_CALLBACK_TIMEOUT_SECS / 60
                    ),
                });
            }
        };

        self.exchange_code(&code).await
    }
}

fn expires_within(token: &Token, threshold_secs: i64) -> bool {
    token.expires_at.is_some_and(|expires_at| {
        let remaining = (expires_at - chrono::Utc::now()).num_seconds();
        if remaining <= threshold_secs {
            debug!(target: LOG_TARGET, "Token expires in {}s, refreshing", remaining);
            true
        } else {
            false
        }
    })
}

/// Where the local callback server listens, derived from the redirect URI.
#[derive(Debug, Clone, PartialEq, Eq)]
struct CallbackAddress {
    addr: SocketAddr,
    path: String,
}

impl CallbackAddress {
    fn parse(redirect_uri: &str) -> Result<Self> {
        let url = url::Url::parse(redirect_uri).map_err(|e| SpotifyError::AuthFailed {
            reason: format!("Invalid redirect URI '{redirect_uri}': {e}"),
        })?;

        let host = match url.host_str() {
            None | Some("localhost") => "127.0.0.1",
            Some(host) => host,
        };
        let port = url.port().unwrap_or(8888);
        let addr = format!("{host}:{port}")
            .parse()
            .map_err(|e| SpotifyError::AuthFailed {
                reason: format!("Invalid callback address {host}:{port}: {e}"),
            })?;

        Ok(Self {
            addr,
            path: url.path().to_string(),
        })
    }
}

#[derive(Debug, Deserialize)]
struct CallbackParams {
    code: Option<String>,
    error: Option<String>,
}

fn callback_router(path: &str, tx: CodeSender) -> Router {
    Router::new().route(
        path,
        get(move |Query(params): Query<CallbackParams>| {
            let tx = tx.clone();
            async move {
                let (outcome, page) = match (params.code, params.error) {
                    (Some(code), _) => (
                        Ok(code),
                        callback_page(
                            "Signed in",
                            "Typify is connected to Spotify. You can close this window.",
                        ),
                    ),
                    (None, Some(error)) => (
                        Err(format!("Authorization denied: {error}")),
                        callback_page("Sign-in failed", &format!("Spotify reported: {error}")),
                    ),
                    (None, None) => (
                        Err("No authorization code received".to_string()),
                        callback_page("Sign-in failed", "No authorization code received."),
                    ),
                };
                if let Some(sender) = tx.lock().await.take() {
                    let _ = sender.send(outcome);
                }
                Html(page)
            }
        }),
    )
}

fn callback_page(title: &str, message: &str) -> String {
    format!(
        r#"<!DOCTYPE html>
<html>
<head><title>Typify - {title}</title></head>
<body style="font-family: sans-serif; text-align: center; padding: 50px; background: #191414; color: #fff;">
    <h1>{title}</h1>
    <p>{message}</p>
</body>
</html>"#
    )
}
