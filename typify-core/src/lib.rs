pub mod cache;
pub mod clock;
pub mod config;
pub mod driver;
pub mod error;
pub mod lyrics;
pub mod normalize;
pub mod paths;
pub mod provider;
pub mod resolver;
pub mod session;
pub mod time;
pub mod typing;

pub use cache::{CachedLyricsSource, LyricsCache};
pub use clock::PlaybackClock;
pub use config::{
    build_config_template, GameConfig, LoggingConfig, LyricsConfig, MarkerAdvance,
    ProvidersConfig, TypifyConfig,
};

/// Re-export toml error type for config parsing error handling
pub use toml::de::Error as TomlParseError;
pub use driver::{
    Collaborators, GameCommand, GameDriver, GameEvent, GameHandle, GameSnapshot, VisibleLine,
};
pub use error::{CoreError, Result};
pub use lyrics::{LyricLine, LyricLineStore, LyricsPayload};
pub use normalize::{normalize, NormalizedLine, MUSICAL_NOTE};
pub use paths::{
    config_dir, log_file_path, lyrics_cache_db_path, CONFIG_DIR_NAME, CONFIG_FILE_NAME,
    LOG_FILE_NAME, LYRICS_CACHE_DB_FILE_NAME,
};
pub use provider::{Credential, LyricsSource, PlaybackTrigger, Track, TrackSearch};
pub use resolver::resolve_current_line;
pub use session::{GameSession, GameState, GameSummary, PlaybackCommand, SessionEvent};
pub use time::{DurationExt, ManualTimeSource, MonotonicTimeSource, TimeSource};
pub use typing::{accuracy_percent, Keystroke, KeystrokeOutcome, TypingProgress};
