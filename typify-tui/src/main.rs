mod app;
mod ui;

use crate::app::{Action, App};
use crossterm::{
    event::{Event, EventStream},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
    tty::IsTty,
};
use futures::StreamExt;
use ratatui::{backend::CrosstermBackend, Terminal};
use std::fs::File;
use std::io::{self, Stdout};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::broadcast::error::RecvError;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use tracing_subscriber::{
    filter::LevelFilter, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer,
};
use typify_core::{
    CachedLyricsSource, Collaborators, CoreError, GameCommand, GameDriver, GameHandle,
    GameSnapshot, LyricsCache, LyricsConfig, LyricsSource, MonotonicTimeSource, TypifyConfig,
};
use typify_lyrics_api::LyricsApiClient;
use typify_spotify_api::{
    SpotifyClient, SpotifyError, SpotifyOAuth, SpotifyProviderConfig, SPOTIFY_CONFIG_TEMPLATE,
};

#[derive(Debug, Error)]
enum AppError {
    #[error(transparent)]
    Core(#[from] CoreError),

    #[error(transparent)]
    Spotify(#[from] SpotifyError),

    #[error("Terminal error: {0}")]
    Terminal(#[from] io::Error),
}

/// How the terminal loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Exit {
    Quit,
    SignOut,
}

fn main() {
    let file_logging_enabled = check_file_logging_enabled();
    init_tracing(file_logging_enabled);

    if !io::stdin().is_tty() {
        eprintln!("typify needs an interactive terminal");
        std::process::exit(1);
    }

    let provider_templates: &[&str] = &[SPOTIFY_CONFIG_TEMPLATE];
    let config = match TypifyConfig::load_or_create(Some(provider_templates)) {
        Ok(config) => config,
        Err(CoreError::ConfigNotFound { path }) => {
            eprintln!(
                "Created a new config file at {}.\nAdd your Spotify client_id and client_secret, then run typify again.",
                path.display()
            );
            std::process::exit(0);
        }
        Err(e) => {
            error!("{e}");
            eprintln!("Could not load {}: {e}", TypifyConfig::config_path().display());
            std::process::exit(1);
        }
    };

    let spotify_config = match spotify_config(&config) {
        Ok(spotify_config) => spotify_config,
        Err(e) => {
            error!("{e}");
            eprintln!("{e}");
            std::process::exit(1);
        }
    };

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            error!("Failed to create tokio runtime: {e}");
            std::process::exit(1);
        }
    };

    let cancel_token = CancellationToken::new();

    // Raw mode delivers Ctrl+C as a key press; this covers SIGTERM and the
    // sign-in phase before the terminal UI starts.
    let ctrlc_token = cancel_token.clone();
    if let Err(e) = ctrlc::set_handler(move || {
        info!("Received termination signal, shutting down...");
        ctrlc_token.cancel();
    }) {
        error!("Failed to set Ctrl+C handler: {}", e);
    }

    if let Err(e) = runtime.block_on(run(config, spotify_config, cancel_token)) {
        error!("{e}");
        eprintln!("{e}");
        std::process::exit(1);
    }
}

fn spotify_config(config: &TypifyConfig) -> Result<SpotifyProviderConfig, CoreError> {
    let spotify = SpotifyProviderConfig::from_providers(&config.providers)?.ok_or_else(|| {
        CoreError::ConfigMissingField {
            field: "providers.spotify".into(),
        }
    })?;
    spotify.validate()?;
    Ok(spotify)
}

async fn run(
    config: TypifyConfig,
    spotify_config: SpotifyProviderConfig,
    cancel_token: CancellationToken,
) -> Result<(), AppError> {
    let oauth = Arc::new(SpotifyOAuth::new(&spotify_config));
    tokio::select! {
        result = oauth.ensure_authenticated() => result?,
        () = cancel_token.cancelled() => return Ok(()),
    }
    let credential = oauth.credential().await?;
    debug!("Spotify credential ready: {:?}", credential);

    let spotify = Arc::new(SpotifyClient::new(Arc::clone(&oauth), &spotify_config));
    let cache = open_cache(&config.lyrics).await;
    let lyrics = lyrics_source(&config.lyrics, cache.clone())?;

    let collaborators = Collaborators {
        search: spotify.clone(),
        lyrics,
        playback: spotify,
    };
    let (driver, handle) = GameDriver::new(
        &config.game,
        collaborators,
        Arc::new(MonotonicTimeSource::new()),
        cancel_token.clone(),
    );
    let driver_task = tokio::spawn(driver.run());

    let exit = run_terminal(&handle, &cancel_token).await;

    handle.shutdown();
    if let Err(e) = driver_task.await {
        warn!("Game driver task failed: {}", e);
    }
    if let Some(cache) = cache {
        if let Err(e) = cache.checkpoint().await {
            warn!("Failed to checkpoint lyrics cache: {}", e);
        }
    }

    if exit? == Exit::SignOut {
        oauth.sign_out().await?;
        eprintln!("Signed out of Spotify. The next run will ask you to sign in again.");
    }
    Ok(())
}

/// Open the lyrics cache and drop expired entries. A cache that fails to
/// open only costs repeated fetches, so the game runs without it.
async fn open_cache(config: &LyricsConfig) -> Option<Arc<LyricsCache>> {
    if !config.cache_enabled {
        info!("Lyrics cache disabled");
        return None;
    }

    let cache = match LyricsCache::new().await {
        Ok(cache) => Arc::new(cache),
        Err(e) => {
            warn!("Lyrics cache unavailable: {}", e);
            return None;
        }
    };

    match cache.cleanup(config.cache_ttl_days).await {
        Ok(removed) if removed > 0 => info!("Removed {} expired lyrics entries", removed),
        Ok(_) => {}
        Err(e) => warn!("Lyrics cache cleanup failed: {}", e),
    }
    Some(cache)
}

fn lyrics_source(
    config: &LyricsConfig,
    cache: Option<Arc<LyricsCache>>,
) -> Result<Arc<dyn LyricsSource>, CoreError> {
    let client: Arc<dyn LyricsSource> = Arc::new(LyricsApiClient::new(config)?);
    Ok(match cache {
        Some(cache) => Arc::new(CachedLyricsSource::new(client, cache)),
        None => client,
    })
}

/// Raw-mode terminal on the alternate screen, restored on drop.
struct TerminalGuard {
    terminal: Terminal<CrosstermBackend<Stdout>>,
}

impl TerminalGuard {
    fn enter() -> io::Result<Self> {
        enable_raw_mode()?;
        let mut stdout = io::stdout();
        execute!(stdout, EnterAlternateScreen)?;
        let terminal = Terminal::new(CrosstermBackend::new(stdout))?;
        Ok(Self { terminal })
    }

    fn draw(&mut self, app: &App, snapshot: &GameSnapshot) -> io::Result<()> {
        self.terminal
            .draw(|frame| ui::draw(frame, app, snapshot))
            .map(|_| ())
    }
}

impl Drop for TerminalGuard {
    fn drop(&mut self) {
        let _ = disable_raw_mode();
        let _ = execute!(self.terminal.backend_mut(), LeaveAlternateScreen);
        let _ = self.terminal.show_cursor();
    }
}

async fn run_terminal(
    handle: &GameHandle,
    cancel_token: &CancellationToken,
) -> Result<Exit, AppError> {
    let mut terminal = TerminalGuard::enter()?;
    let mut app = App::new();
    let mut snapshots = handle.watch();
    let mut events = handle.subscribe();
    let mut input = EventStream::new();

    loop {
        let snapshot = snapshots.borrow_and_update().clone();
        terminal.draw(&app, &snapshot)?;

        tokio::select! {
            () = cancel_token.cancelled() => break,
            changed = snapshots.changed() => {
                if changed.is_err() {
                    break;
                }
            }
            event = events.recv() => match event {
                Ok(event) => app.on_event(event),
                Err(RecvError::Lagged(skipped)) => {
                    warn!("UI fell behind, skipped {} game events", skipped);
                }
                Err(RecvError::Closed) => break,
            },
            terminal_event = input.next() => match terminal_event {
                Some(Ok(Event::Key(key))) => match app.on_key(key, &snapshot) {
                    Action::Send(command) => {
                        if !handle.send(command).await {
                            break;
                        }
                    }
                    Action::Quit => {
                        let _ = handle.send(GameCommand::Quit).await;
                        break;
                    }
                    Action::SignOut => {
                        let _ = handle.send(GameCommand::Quit).await;
                        return Ok(Exit::SignOut);
                    }
                    Action::None => {}
                },
                Some(Ok(_)) => {}
                Some(Err(e)) => return Err(e.into()),
                None => break,
            },
        }
    }

    Ok(Exit::Quit)
}

/// Read just the logging flag, before the config is fully loaded.
fn check_file_logging_enabled() -> bool {
    #[derive(serde::Deserialize)]
    struct PartialConfig {
        #[serde(default)]
        logging: PartialLoggingConfig,
    }
    #[derive(serde::Deserialize, Default)]
    struct PartialLoggingConfig {
        #[serde(default)]
        enabled: bool,
    }

    let Ok(content) = std::fs::read_to_string(TypifyConfig::config_path()) else {
        return false;
    };

    toml::from_str::<PartialConfig>(&content)
        .map(|c| c.logging.enabled)
        .unwrap_or(false)
}

/// Console output is limited to warnings on stderr while the terminal UI
/// owns stdout. The log file gets everything the filter allows.
fn init_tracing(file_logging_enabled: bool) {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,rspotify_http=warn"));

    let console_layer = tracing_subscriber::fmt::layer()
        .with_writer(io::stderr)
        .with_filter(LevelFilter::WARN);

    if file_logging_enabled {
        let log_path = typify_core::log_file_path();
        if let Some(parent) = log_path.parent() {
            let _ = std::fs::create_dir_all(parent);
        }

        match File::create(&log_path) {
            Ok(file) => {
                let file_layer = tracing_subscriber::fmt::layer()
                    .with_writer(Arc::new(file))
                    .with_ansi(false);

                tracing_subscriber::registry()
                    .with(env_filter)
                    .with(console_layer)
                    .with(file_layer)
                    .init();
                return;
            }
            Err(e) => {
                eprintln!("Failed to create log file at {}: {e}", log_path.display());
            }
        }
    }

    tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer)
        .init();
}
